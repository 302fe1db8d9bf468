use crate::infra::{
    notification_hooks, InMemoryEnrollmentStore, InMemoryLeadRepository, NotificationOutbox,
};
use academy_leads::config::LeadsConfig;
use academy_leads::error::AppError;
use academy_leads::workflows::leads::{
    is_qualified, ConvertLead, LeadCapture, LeadCsvImporter, LeadLifecycleService, LeadSource,
    LeadStatus, ManualTransition, ScoreResult, TenantId, UtmParameters,
};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

type DemoService = LeadLifecycleService<InMemoryLeadRepository, InMemoryEnrollmentStore>;

#[derive(Args, Debug)]
pub(crate) struct ScoreArgs {
    /// Lead capture CSV export to score
    pub(crate) csv: PathBuf,
    /// Tenant the imported leads belong to
    #[arg(long, default_value = "demo-academy")]
    pub(crate) tenant: String,
    /// Minimum score for a lead to be reported as sales-ready
    #[arg(long)]
    pub(crate) threshold: Option<u8>,
    /// Print the per-rule breakdown for every lead
    #[arg(long)]
    pub(crate) breakdown: bool,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Tenant used for the walkthrough
    #[arg(long, default_value = "demo-academy")]
    pub(crate) tenant: String,
    /// Course run the demo lead is converted into
    #[arg(long, default_value = "data-science-2025-autumn")]
    pub(crate) course_run: String,
}

fn in_memory_service(config: &LeadsConfig, outbox: NotificationOutbox) -> DemoService {
    LeadLifecycleService::new(
        Arc::new(InMemoryLeadRepository::default()),
        Arc::new(InMemoryEnrollmentStore::default()),
        notification_hooks(outbox),
        config,
    )
}

pub(crate) fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let ScoreArgs {
        csv,
        tenant,
        threshold,
        breakdown,
    } = args;

    let mut config = LeadsConfig::default();
    if let Some(threshold) = threshold {
        config.qualification_threshold = threshold.min(100);
    }

    let captures = LeadCsvImporter::from_path(&csv)?;
    let service = in_memory_service(&config, NotificationOutbox::default());
    let tenant = TenantId(tenant);

    println!("Lead scores for {}", csv.display());
    println!("{:<32} {:>5} {:>5}  sales-ready", "email", "score", "grade");

    let mut ready = 0usize;
    let mut skipped = 0usize;
    for capture in captures {
        let email = capture.email.clone();
        let lead = match service.capture(&tenant, capture) {
            Ok(lead) => lead,
            Err(err) => {
                skipped += 1;
                println!("{email:<32} skipped: {err}");
                continue;
            }
        };

        let result = service.rescore(&tenant, &lead.id)?;
        let sales_ready = result.total_score >= config.qualification_threshold;
        if sales_ready {
            ready += 1;
        }
        println!(
            "{:<32} {:>5} {:>5}  {}",
            lead.email,
            result.total_score,
            result.grade.label(),
            if sales_ready { "yes" } else { "no" }
        );
        if breakdown {
            render_breakdown(&result);
        }
    }

    println!(
        "\n{ready} sales-ready at threshold {}, {skipped} rows skipped",
        config.qualification_threshold
    );
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { tenant, course_run } = args;
    let tenant = TenantId(tenant);
    let config = LeadsConfig::default();
    let outbox = NotificationOutbox::default();
    let service = in_memory_service(&config, outbox.clone());

    println!("Academy lead lifecycle demo ({tenant})");

    let lead = service.capture(&tenant, sample_capture(&course_run))?;
    let result = service.rescore(&tenant, &lead.id)?;
    println!(
        "\nCaptured {} as {} with score {} (grade {})",
        lead.email,
        lead.id,
        result.total_score,
        result.grade.label()
    );
    render_breakdown(&result);
    println!("Recommendation: {}", result.recommendation);
    println!(
        "Sales-ready at default threshold: {}",
        is_qualified(&lead, None)
    );

    let preview = service.preview_conversion(&tenant, &lead.id)?;
    println!("\nConversion blocked while {}:", lead.status);
    for reason in &preview.reasons {
        println!("  - {reason}");
    }

    for status in [LeadStatus::Contacted, LeadStatus::Qualified] {
        let transition = service.transition(
            &tenant,
            &lead.id,
            ManualTransition {
                to: status,
                user_id: "demo-advisor".to_string(),
                reason: None,
                notes: Some(format!("demo moved lead to {status}")),
            },
        )?;
        println!("Moved {} -> {}", transition.from_status, transition.to_status);
    }

    let outcome = service
        .convert(
            &tenant,
            &lead.id,
            ConvertLead {
                course_run_id: course_run.clone(),
                user_id: "demo-advisor".to_string(),
                enrollment_data: None,
            },
        )
        .await?;
    match (outcome.success, outcome.enrollment_id.as_ref()) {
        (true, Some(enrollment)) => println!("\nConverted into enrollment {enrollment}"),
        _ => println!("\nConversion failed: {}", outcome.errors.join("; ")),
    }

    let retry = service
        .convert(
            &tenant,
            &lead.id,
            ConvertLead {
                course_run_id: course_run,
                user_id: "demo-advisor".to_string(),
                enrollment_data: None,
            },
        )
        .await?;
    println!("Second conversion attempt: {}", retry.errors.join("; "));

    println!("\nTransition history");
    for transition in service.history(&tenant, &lead.id)? {
        println!(
            "  {} {} -> {} by {}",
            transition.timestamp.format("%H:%M:%S"),
            transition.from_status,
            transition.to_status,
            transition.user_id
        );
    }

    println!("\nQueued notifications");
    for notification in outbox.drain() {
        println!(
            "  {:?} for {}: {}",
            notification.kind, notification.lead_id, notification.detail
        );
    }

    Ok(())
}

fn render_breakdown(result: &ScoreResult) {
    for entry in result.breakdown.iter().filter(|entry| entry.matched) {
        println!(
            "    {:>+4}  {} ({})",
            entry.points,
            entry.name,
            entry.category.label()
        );
    }
}

fn sample_capture(course_run: &str) -> LeadCapture {
    LeadCapture {
        email: "grace.hopper@example.com".to_string(),
        name: Some("Grace Hopper".to_string()),
        phone: Some("+1 555 0142".to_string()),
        source: Some(LeadSource::Referral),
        course_run_id: Some(course_run.to_string()),
        gdpr_consent: true,
        marketing_consent: true,
        tags: vec!["priority".to_string()],
        utm: UtmParameters {
            source: Some("alumni-newsletter".to_string()),
            ..UtmParameters::default()
        },
        ..LeadCapture::default()
    }
}
