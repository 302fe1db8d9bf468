use academy_leads::workflows::leads::{
    quick_score, Lead, LeadCsvImporter, LeadGrade, LeadSource, ScoringEngine,
};

fn lead_from_capture(capture: academy_leads::workflows::leads::LeadCapture) -> Lead {
    Lead {
        email: capture.email,
        name: capture.name,
        phone: capture.phone,
        source: capture.source.unwrap_or_default(),
        course_run_id: capture.course_run_id,
        campaign_id: capture.campaign_id,
        gdpr_consent: capture.gdpr_consent,
        marketing_consent: capture.marketing_consent,
        tags: capture.tags.into_iter().collect(),
        utm: capture.utm,
        ..Lead::default()
    }
}

#[test]
fn imported_exports_score_like_captured_leads() {
    let csv = "Email,Name,Phone,Source,Course Run,Campaign,GDPR Consent,Marketing Consent,Tags,UTM Source,UTM Medium,UTM Campaign\n\
ada@example.com,Ada Lovelace,+44 20 7946 0000,referral,run-1,spring,yes,yes,priority,newsletter,email,spring\n\
bob@example.com,,,website,,,no,no,,,,\n\
eve@example.com,Eve,,ads,,,yes,,cold;archive,,,\n";

    let captures = LeadCsvImporter::from_reader(csv.as_bytes()).expect("import succeeds");
    assert_eq!(captures.len(), 3);
    assert_eq!(captures[2].source, Some(LeadSource::Advertising));
    assert_eq!(captures[2].tags, vec!["cold", "archive"]);

    let engine = ScoringEngine::new();
    let grades: Vec<LeadGrade> = captures
        .into_iter()
        .map(lead_from_capture)
        .map(|lead| engine.score(&lead).grade)
        .collect();

    assert_eq!(grades, vec![LeadGrade::A, LeadGrade::F, LeadGrade::F]);
}

#[test]
fn quick_score_matches_engine_for_imported_rows() {
    let csv = "Email,Name,Phone,Source,Course Run,Campaign,GDPR Consent,Marketing Consent,Tags,UTM Source,UTM Medium,UTM Campaign\n\
grace@example.com,Grace,+1 555 0100,event,run-2,,yes,yes,,,,\n";

    let capture = LeadCsvImporter::from_reader(csv.as_bytes())
        .expect("import succeeds")
        .pop()
        .expect("one row");
    let lead = lead_from_capture(capture);

    assert_eq!(
        quick_score(&lead),
        ScoringEngine::new().score(&lead).total_score
    );
    assert_eq!(quick_score(&lead), 60);
}
