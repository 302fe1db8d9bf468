//! Lead -> enrollment conversion.
//!
//! The orchestrator validates the request, runs the injected hooks strictly in
//! order around the enrollment write, and reports every expected failure as a
//! [`ConversionOutcome`] instead of an error. Loss and reactivation live here
//! too because they are the other transitions the orchestrator records.

mod hooks;

pub use hooks::{ConversionHooks, HookError, HookFuture};

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::domain::{EnrollmentId, Lead, LeadId, LeadStatus, LeadTransition, TenantId};
use super::eligibility::check_eligibility;
use super::repository::{EnrollmentDraft, EnrollmentError, EnrollmentWriter};
use super::transitions::{ensure_transition, TransitionError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub lead_id: LeadId,
    pub tenant_id: TenantId,
    pub course_run_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment_data: Option<serde_json::Value>,
}

impl ConversionRequest {
    fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("lead_id", self.lead_id.0.as_str()),
            ("tenant_id", self.tenant_id.0.as_str()),
            ("course_run_id", self.course_run_id.as_str()),
            ("user_id", self.user_id.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect()
    }

    fn draft(&self) -> EnrollmentDraft {
        EnrollmentDraft {
            lead_id: self.lead_id.clone(),
            tenant_id: self.tenant_id.clone(),
            course_run_id: self.course_run_id.clone(),
            user_id: self.user_id.clone(),
            enrollment_data: self.enrollment_data.clone(),
        }
    }
}

/// Structured result of a conversion attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment_id: Option<EnrollmentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<LeadTransition>,
    /// Enrollment left in storage after a failed post-convert hook.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orphaned_enrollment: Option<EnrollmentId>,
}

impl ConversionOutcome {
    fn succeeded(
        enrollment_id: EnrollmentId,
        user_id: String,
        transition: LeadTransition,
    ) -> Self {
        Self {
            success: true,
            enrollment_id: Some(enrollment_id),
            user_id: Some(user_id),
            errors: Vec::new(),
            transition: Some(transition),
            orphaned_enrollment: None,
        }
    }

    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            success: false,
            enrollment_id: None,
            user_id: None,
            errors,
            transition: None,
            orphaned_enrollment: None,
        }
    }
}

/// Non-throwing conversion preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionPreview {
    pub can_convert: bool,
    pub reasons: Vec<String>,
}

/// What to do with an enrollment that was written before `on_post_convert`
/// failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostConvertFailurePolicy {
    /// Ask the enrollment writer to discard the enrollment.
    #[default]
    Compensate,
    /// Keep the enrollment and report it as orphaned.
    RetainAndFlag,
}

impl PostConvertFailurePolicy {
    pub fn from_label(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compensate" | "discard" => Some(Self::Compensate),
            "retain" | "retain_and_flag" | "flag" => Some(Self::RetainAndFlag),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkLostRequest {
    pub lead_id: LeadId,
    pub tenant_id: TenantId,
    pub user_id: String,
    pub from_status: LeadStatus,
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactivateRequest {
    pub lead_id: LeadId,
    pub tenant_id: TenantId,
    pub user_id: String,
    pub from_status: LeadStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum ConversionStepError {
    #[error("pre-convert hook failed: {0}")]
    PreConvert(HookError),
    #[error("enrollment could not be created: {0}")]
    Enrollment(#[from] EnrollmentError),
    #[error("post-convert hook failed: {source}")]
    PostConvert {
        source: HookError,
        orphaned: Option<EnrollmentId>,
        compensation: Option<EnrollmentError>,
    },
}

impl ConversionStepError {
    fn into_outcome(self) -> ConversionOutcome {
        let mut errors = vec![self.to_string()];
        let mut outcome = ConversionOutcome::failed(Vec::new());
        if let ConversionStepError::PostConvert {
            orphaned,
            compensation,
            ..
        } = self
        {
            if let Some(err) = compensation {
                errors.push(format!("enrollment could not be discarded: {err}"));
            }
            outcome.orphaned_enrollment = orphaned;
        }
        outcome.errors = errors;
        outcome
    }
}

/// Performs the terminal `qualified -> converted` transition and its side
/// effects.
pub struct ConversionOrchestrator<E> {
    enrollments: Arc<E>,
    hooks: ConversionHooks,
    failure_policy: PostConvertFailurePolicy,
}

impl<E> ConversionOrchestrator<E>
where
    E: EnrollmentWriter + 'static,
{
    pub fn new(enrollments: Arc<E>, hooks: ConversionHooks) -> Self {
        Self {
            enrollments,
            hooks,
            failure_policy: PostConvertFailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, policy: PostConvertFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn failure_policy(&self) -> PostConvertFailurePolicy {
        self.failure_policy
    }

    pub async fn convert(&self, request: ConversionRequest) -> ConversionOutcome {
        let missing = request.missing_fields();
        if !missing.is_empty() {
            let errors: Vec<String> = missing
                .iter()
                .map(|field| format!("{field} is required"))
                .collect();
            warn!(lead_id = %request.lead_id, ?missing, "conversion request rejected");
            self.report_failure(&request, &errors).await;
            return ConversionOutcome::failed(errors);
        }

        let attempt = AssertUnwindSafe(self.run(&request)).catch_unwind().await;
        match attempt {
            Ok(Ok(outcome)) => {
                info!(
                    lead_id = %request.lead_id,
                    tenant_id = %request.tenant_id,
                    course_run_id = %request.course_run_id,
                    "lead converted"
                );
                outcome
            }
            Ok(Err(err)) => {
                warn!(lead_id = %request.lead_id, error = %err, "lead conversion failed");
                let outcome = err.into_outcome();
                self.report_failure(&request, &outcome.errors).await;
                outcome
            }
            Err(payload) => {
                // The failure hook observes the panic before it resumes.
                let errors = vec![format!(
                    "conversion aborted: {}",
                    panic_message(payload.as_ref())
                )];
                error!(lead_id = %request.lead_id, ?errors, "conversion panicked");
                self.report_failure(&request, &errors).await;
                panic::resume_unwind(payload)
            }
        }
    }

    async fn run(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConversionOutcome, ConversionStepError> {
        self.hooks
            .pre_convert(request)
            .await
            .map_err(ConversionStepError::PreConvert)?;

        let enrollment_id = self.enrollments.create_enrollment(&request.draft())?;

        let transition = LeadTransition::record(
            request.lead_id.clone(),
            request.tenant_id.clone(),
            LeadStatus::Qualified,
            LeadStatus::Converted,
            request.user_id.clone(),
            None,
            None,
        );
        let outcome =
            ConversionOutcome::succeeded(enrollment_id.clone(), request.user_id.clone(), transition);

        if let Err(source) = self.hooks.post_convert(request, &outcome).await {
            let (orphaned, compensation) = self.resolve_orphan(&enrollment_id);
            return Err(ConversionStepError::PostConvert {
                source,
                orphaned,
                compensation,
            });
        }

        Ok(outcome)
    }

    fn resolve_orphan(
        &self,
        enrollment_id: &EnrollmentId,
    ) -> (Option<EnrollmentId>, Option<EnrollmentError>) {
        match self.failure_policy {
            PostConvertFailurePolicy::Compensate => {
                match self.enrollments.discard_enrollment(enrollment_id) {
                    Ok(()) => (None, None),
                    Err(err) => {
                        error!(%enrollment_id, error = %err, "failed to discard enrollment");
                        (Some(enrollment_id.clone()), Some(err))
                    }
                }
            }
            PostConvertFailurePolicy::RetainAndFlag => {
                warn!(%enrollment_id, "enrollment retained after post-convert failure");
                (Some(enrollment_id.clone()), None)
            }
        }
    }

    /// Back out a successful conversion the caller could not record. The
    /// enrollment is handled by the failure policy and the failure hook sees
    /// `reason`.
    pub async fn abandon(
        &self,
        request: &ConversionRequest,
        enrollment_id: &EnrollmentId,
        reason: String,
    ) -> ConversionOutcome {
        let (orphaned, compensation) = self.resolve_orphan(enrollment_id);
        let mut errors = vec![reason];
        if let Some(err) = compensation {
            errors.push(format!("enrollment could not be discarded: {err}"));
        }
        warn!(lead_id = %request.lead_id, %enrollment_id, ?errors, "conversion abandoned");
        self.report_failure(request, &errors).await;

        let mut outcome = ConversionOutcome::failed(errors);
        outcome.orphaned_enrollment = orphaned;
        outcome
    }

    async fn report_failure(&self, request: &ConversionRequest, errors: &[String]) {
        if let Err(err) = self.hooks.conversion_failed(request, errors).await {
            warn!(lead_id = %request.lead_id, error = %err, "conversion failure hook errored");
        }
    }

    pub fn can_convert(&self, lead: &Lead) -> ConversionPreview {
        can_convert(lead)
    }

    pub fn mark_as_lost(
        &self,
        request: MarkLostRequest,
    ) -> Result<LeadTransition, TransitionError> {
        ensure_transition(request.from_status, LeadStatus::Lost)?;

        Ok(LeadTransition::record(
            request.lead_id,
            request.tenant_id,
            request.from_status,
            LeadStatus::Lost,
            request.user_id,
            Some(request.reason),
            request.notes,
        ))
    }

    /// Return a lost lead to `new`; the pre-loss status is not restored.
    pub fn reactivate(
        &self,
        request: ReactivateRequest,
    ) -> Result<LeadTransition, TransitionError> {
        ensure_transition(request.from_status, LeadStatus::New)?;

        Ok(LeadTransition::record(
            request.lead_id,
            request.tenant_id,
            request.from_status,
            LeadStatus::New,
            request.user_id,
            None,
            request.notes,
        ))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

pub fn can_convert(lead: &Lead) -> ConversionPreview {
    let report = check_eligibility(lead);
    ConversionPreview {
        can_convert: report.eligible,
        reasons: report
            .failed_checks
            .into_iter()
            .map(|check| check.message)
            .collect(),
    }
}
