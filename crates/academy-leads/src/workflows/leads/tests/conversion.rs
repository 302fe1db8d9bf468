use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::FutureExt;

use super::common::*;
use crate::workflows::leads::conversion::{
    ConversionHooks, ConversionOrchestrator, ConversionRequest, HookError, MarkLostRequest,
    PostConvertFailurePolicy, ReactivateRequest,
};
use crate::workflows::leads::domain::{LeadId, LeadStatus, TenantId};
use crate::workflows::leads::transitions::TransitionError;

fn orchestrator(
    log: &CallLog,
    failing: Option<&'static str>,
    enrollments: MemoryEnrollments,
) -> (ConversionOrchestrator<MemoryEnrollments>, Arc<MemoryEnrollments>) {
    let enrollments = Arc::new(enrollments);
    let orchestrator =
        ConversionOrchestrator::new(enrollments.clone(), recording_hooks(log, failing));
    (orchestrator, enrollments)
}

fn lost_request(from_status: LeadStatus) -> MarkLostRequest {
    MarkLostRequest {
        lead_id: LeadId("L1".to_string()),
        tenant_id: TenantId("T1".to_string()),
        user_id: "U1".to_string(),
        from_status,
        reason: "chose another academy".to_string(),
        notes: Some("follow up next term".to_string()),
    }
}

fn reactivate_request(from_status: LeadStatus) -> ReactivateRequest {
    ReactivateRequest {
        lead_id: LeadId("L1".to_string()),
        tenant_id: TenantId("T1".to_string()),
        user_id: "U1".to_string(),
        from_status,
        notes: None,
    }
}

#[tokio::test]
async fn missing_fields_skip_pre_convert() {
    let log = CallLog::default();
    let (orchestrator, enrollments) =
        orchestrator(&log, None, MemoryEnrollments::with_log(&log));

    let outcome = orchestrator.convert(request("", "", "", "")).await;

    assert!(!outcome.success);
    assert_eq!(outcome.errors.len(), 4);
    assert!(outcome.enrollment_id.is_none());
    assert_eq!(log.count("pre_convert"), 0);
    assert_eq!(log.count("conversion_failed"), 1);
    assert_eq!(log.failures(), vec![outcome.errors.clone()]);
    assert!(enrollments.active().is_empty());
}

#[tokio::test]
async fn validation_names_each_missing_field() {
    let log = CallLog::default();
    let (orchestrator, _) = orchestrator(&log, None, MemoryEnrollments::default());

    let outcome = orchestrator.convert(request("L1", "T1", " ", "")).await;

    assert_eq!(
        outcome.errors,
        vec![
            "course_run_id is required".to_string(),
            "user_id is required".to_string()
        ]
    );
}

#[tokio::test]
async fn successful_conversion_runs_hooks_once_in_order() {
    let log = CallLog::default();
    let (orchestrator, enrollments) =
        orchestrator(&log, None, MemoryEnrollments::with_log(&log));

    let outcome = orchestrator.convert(request("L1", "T1", "C1", "U1")).await;

    assert!(outcome.success);
    assert!(outcome.enrollment_id.is_some());
    assert_eq!(outcome.user_id.as_deref(), Some("U1"));
    assert!(outcome.errors.is_empty());
    assert_eq!(
        log.events(),
        vec!["pre_convert", "create_enrollment", "post_convert"]
    );

    let transition = outcome.transition.expect("transition recorded");
    assert_eq!(transition.from_status, LeadStatus::Qualified);
    assert_eq!(transition.to_status, LeadStatus::Converted);

    let active = enrollments.active();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].1.course_run_id, "C1");
}

#[tokio::test]
async fn conversion_without_hooks_still_enrolls() {
    let enrollments = Arc::new(MemoryEnrollments::default());
    let orchestrator = ConversionOrchestrator::new(enrollments.clone(), ConversionHooks::default());

    let outcome = orchestrator.convert(request("L1", "T1", "C1", "U1")).await;

    assert!(outcome.success);
    assert_eq!(enrollments.active().len(), 1);
}

#[tokio::test]
async fn pre_convert_failure_stops_before_enrollment() {
    let log = CallLog::default();
    let (orchestrator, enrollments) =
        orchestrator(&log, Some("pre_convert"), MemoryEnrollments::with_log(&log));

    let outcome = orchestrator.convert(request("L1", "T1", "C1", "U1")).await;

    assert!(!outcome.success);
    assert_eq!(log.events(), vec!["pre_convert", "conversion_failed"]);
    assert!(outcome.errors[0].contains("pre_convert hook unavailable"));
    assert!(enrollments.active().is_empty());
}

#[tokio::test]
async fn enrollment_failure_is_reported_not_raised() {
    let log = CallLog::default();
    let (orchestrator, _) = orchestrator(
        &log,
        None,
        MemoryEnrollments::with_log(&log).failing_create(),
    );

    let outcome = orchestrator.convert(request("L1", "T1", "C1", "U1")).await;

    assert!(!outcome.success);
    assert_eq!(
        log.events(),
        vec!["pre_convert", "create_enrollment", "conversion_failed"]
    );
    assert!(outcome.errors[0].contains("registrar offline"));
}

#[tokio::test]
async fn post_convert_failure_discards_enrollment_by_default() {
    let log = CallLog::default();
    let (orchestrator, enrollments) =
        orchestrator(&log, Some("post_convert"), MemoryEnrollments::with_log(&log));
    assert_eq!(
        orchestrator.failure_policy(),
        PostConvertFailurePolicy::Compensate
    );

    let outcome = orchestrator.convert(request("L1", "T1", "C1", "U1")).await;

    assert!(!outcome.success);
    assert!(outcome.orphaned_enrollment.is_none());
    assert!(outcome.transition.is_none());
    assert_eq!(
        log.events(),
        vec![
            "pre_convert",
            "create_enrollment",
            "post_convert",
            "discard_enrollment",
            "conversion_failed"
        ]
    );
    assert!(enrollments.active().is_empty());
}

#[tokio::test]
async fn post_convert_failure_can_retain_and_flag() {
    let log = CallLog::default();
    let (orchestrator, enrollments) =
        orchestrator(&log, Some("post_convert"), MemoryEnrollments::with_log(&log));
    let orchestrator = orchestrator.with_failure_policy(PostConvertFailurePolicy::RetainAndFlag);

    let outcome = orchestrator.convert(request("L1", "T1", "C1", "U1")).await;

    assert!(!outcome.success);
    let active = enrollments.active();
    assert_eq!(active.len(), 1);
    assert_eq!(outcome.orphaned_enrollment, Some(active[0].0.clone()));
    assert_eq!(log.count("discard_enrollment"), 0);
    assert_eq!(log.count("conversion_failed"), 1);
}

#[tokio::test]
async fn failed_compensation_is_flagged_as_orphaned() {
    let log = CallLog::default();
    let (orchestrator, enrollments) = orchestrator(
        &log,
        Some("post_convert"),
        MemoryEnrollments::with_log(&log).failing_discard(),
    );

    let outcome = orchestrator.convert(request("L1", "T1", "C1", "U1")).await;

    assert!(!outcome.success);
    assert_eq!(outcome.errors.len(), 2);
    assert!(outcome.errors[1].contains("could not be discarded"));
    assert_eq!(
        outcome.orphaned_enrollment,
        enrollments.active().first().map(|(id, _)| id.clone())
    );
}

#[tokio::test]
async fn failing_failure_hook_does_not_change_outcome() {
    let log = CallLog::default();
    let (orchestrator, _) = orchestrator(
        &log,
        Some("conversion_failed"),
        MemoryEnrollments::default().failing_create(),
    );

    let outcome = orchestrator.convert(request("L1", "T1", "C1", "U1")).await;

    assert!(!outcome.success);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(log.count("conversion_failed"), 1);
}

fn exploding_hook() -> Result<(), HookError> {
    panic!("pre_convert hook exploded")
}

#[tokio::test]
async fn panicking_hook_reaches_failure_hook_before_unwinding() {
    let observed: Arc<Mutex<Vec<Vec<String>>>> = Arc::default();
    let failed_observed = observed.clone();
    let hooks = ConversionHooks::new()
        .on_pre_convert(|_request: ConversionRequest| async move { exploding_hook() })
        .on_conversion_failed(move |_request: ConversionRequest, errors: Vec<String>| {
            let observed = failed_observed.clone();
            async move {
                observed.lock().expect("observed mutex poisoned").push(errors);
                Ok(())
            }
        });
    let enrollments = Arc::new(MemoryEnrollments::default());
    let orchestrator = ConversionOrchestrator::new(enrollments.clone(), hooks);

    let result = AssertUnwindSafe(orchestrator.convert(request("L1", "T1", "C1", "U1")))
        .catch_unwind()
        .await;

    assert!(result.is_err(), "the panic still propagates");
    let observed = observed.lock().expect("observed mutex poisoned").clone();
    assert_eq!(observed.len(), 1);
    assert!(observed[0][0].contains("pre_convert hook exploded"));
    assert!(enrollments.active().is_empty());
}

#[test]
fn mark_as_lost_is_legal_from_every_open_status() {
    let log = CallLog::default();
    let (orchestrator, _) = orchestrator(&log, None, MemoryEnrollments::default());

    for status in [
        LeadStatus::New,
        LeadStatus::Contacted,
        LeadStatus::Qualified,
    ] {
        let transition = orchestrator
            .mark_as_lost(lost_request(status))
            .expect("open leads can be lost");
        assert_eq!(transition.from_status, status);
        assert_eq!(transition.to_status, LeadStatus::Lost);
        assert_eq!(transition.reason.as_deref(), Some("chose another academy"));
    }
    assert!(log.events().is_empty(), "loss does not run conversion hooks");
}

#[test]
fn mark_as_lost_rejects_terminal_and_lost_leads() {
    let log = CallLog::default();
    let (orchestrator, _) = orchestrator(&log, None, MemoryEnrollments::default());

    for status in [LeadStatus::Converted, LeadStatus::Lost] {
        match orchestrator.mark_as_lost(lost_request(status)) {
            Err(TransitionError::Illegal { from, to }) => {
                assert_eq!(from, status);
                assert_eq!(to, LeadStatus::Lost);
            }
            other => panic!("expected illegal transition, got {other:?}"),
        }
    }
}

#[test]
fn reactivate_only_accepts_lost_leads() {
    let log = CallLog::default();
    let (orchestrator, _) = orchestrator(&log, None, MemoryEnrollments::default());

    for status in [
        LeadStatus::New,
        LeadStatus::Contacted,
        LeadStatus::Qualified,
        LeadStatus::Converted,
    ] {
        assert!(orchestrator.reactivate(reactivate_request(status)).is_err());
    }
}

#[test]
fn lost_then_reactivated_lands_on_new() {
    let log = CallLog::default();
    let (orchestrator, _) = orchestrator(&log, None, MemoryEnrollments::default());

    let lost = orchestrator
        .mark_as_lost(lost_request(LeadStatus::Qualified))
        .expect("qualified lead can be lost");
    let reactivated = orchestrator
        .reactivate(reactivate_request(lost.to_status))
        .expect("lost lead can be reactivated");

    assert_eq!(reactivated.from_status, LeadStatus::Lost);
    assert_eq!(reactivated.to_status, LeadStatus::New);
    assert_ne!(reactivated.to_status, lost.from_status);
}
