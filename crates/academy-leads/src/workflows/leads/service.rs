use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::conversion::{
    ConversionHooks, ConversionOrchestrator, ConversionOutcome, ConversionPreview,
    ConversionRequest, MarkLostRequest, ReactivateRequest,
};
use super::domain::{Lead, LeadCapture, LeadId, LeadStatus, LeadTransition, TenantId};
use super::eligibility::{check_eligibility, EligibilityReport};
use super::repository::{EnrollmentWriter, LeadRepository, RepositoryError};
use super::scoring::{ScoreResult, ScoringEngine};
use super::transitions::{ensure_transition, TransitionError};
use crate::config::LeadsConfig;

/// Manual status change requested by admissions staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualTransition {
    pub to: LeadStatus,
    pub user_id: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertLead {
    pub course_run_id: String,
    pub user_id: String,
    #[serde(default)]
    pub enrollment_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoseLead {
    pub user_id: String,
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactivateLead {
    pub user_id: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Service composing the lead repository, scoring engine and conversion
/// orchestrator for one embedding application.
pub struct LeadLifecycleService<R, E> {
    repository: Arc<R>,
    scoring: ScoringEngine,
    orchestrator: ConversionOrchestrator<E>,
    qualification_threshold: u8,
}

static LEAD_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_lead_id() -> LeadId {
    let id = LEAD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    LeadId(format!("lead-{id:06}"))
}

impl<R, E> LeadLifecycleService<R, E>
where
    R: LeadRepository + 'static,
    E: EnrollmentWriter + 'static,
{
    pub fn new(
        repository: Arc<R>,
        enrollments: Arc<E>,
        hooks: ConversionHooks,
        config: &LeadsConfig,
    ) -> Self {
        let orchestrator = ConversionOrchestrator::new(enrollments, hooks)
            .with_failure_policy(config.post_convert_failure_policy);

        Self {
            repository,
            scoring: ScoringEngine::new(),
            orchestrator,
            qualification_threshold: config.qualification_threshold,
        }
    }

    /// Replace the default rule set, e.g. with tenant specific weights.
    pub fn with_scoring_engine(mut self, scoring: ScoringEngine) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn scoring(&self) -> &ScoringEngine {
        &self.scoring
    }

    /// Persist a capture-form submission as a scored lead at status `new`.
    pub fn capture(
        &self,
        tenant_id: &TenantId,
        capture: LeadCapture,
    ) -> Result<Lead, LeadServiceError> {
        let email = capture.email.trim().to_string();
        if email.is_empty() || !email.contains('@') {
            return Err(LeadServiceError::InvalidCapture(
                "a valid email address is required".to_string(),
            ));
        }
        if tenant_id.0.trim().is_empty() {
            return Err(LeadServiceError::InvalidCapture(
                "tenant id is required".to_string(),
            ));
        }

        let now = Utc::now();
        let mut lead = Lead {
            id: next_lead_id(),
            tenant_id: tenant_id.clone(),
            email,
            name: capture.name,
            phone: capture.phone,
            source: capture.source.unwrap_or_default(),
            course_run_id: capture.course_run_id,
            campaign_id: capture.campaign_id,
            metadata: capture.metadata,
            utm: capture.utm,
            status: LeadStatus::New,
            gdpr_consent: capture.gdpr_consent,
            gdpr_consent_at: capture.gdpr_consent.then_some(now),
            marketing_consent: capture.marketing_consent,
            marketing_consent_at: capture.marketing_consent.then_some(now),
            score: 0,
            tags: capture
                .tags
                .into_iter()
                .map(|tag| tag.trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect(),
            notes: capture.notes,
        };
        lead.score = self.scoring.score(&lead).total_score;

        let stored = self.repository.insert(lead)?;
        info!(
            lead_id = %stored.id,
            tenant_id = %stored.tenant_id,
            score = stored.score,
            "lead captured"
        );
        Ok(stored)
    }

    pub fn get(&self, tenant_id: &TenantId, lead_id: &LeadId) -> Result<Lead, LeadServiceError> {
        let lead = self
            .repository
            .fetch(tenant_id, lead_id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(lead)
    }

    pub fn history(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<Vec<LeadTransition>, LeadServiceError> {
        self.get(tenant_id, lead_id)?;
        Ok(self.repository.transitions(tenant_id, lead_id)?)
    }

    /// Recompute and store the lead's score.
    pub fn rescore(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<ScoreResult, LeadServiceError> {
        let mut lead = self.get(tenant_id, lead_id)?;
        let result = self.scoring.score(&lead);
        if lead.score != result.total_score {
            lead.score = result.total_score;
            self.repository.update(lead)?;
        }
        Ok(result)
    }

    pub fn is_sales_ready(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<bool, LeadServiceError> {
        let lead = self.get(tenant_id, lead_id)?;
        Ok(self.scoring.score(&lead).total_score >= self.qualification_threshold)
    }

    pub fn eligibility(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<EligibilityReport, LeadServiceError> {
        let lead = self.get(tenant_id, lead_id)?;
        Ok(check_eligibility(&lead))
    }

    pub fn preview_conversion(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<ConversionPreview, LeadServiceError> {
        let lead = self.get(tenant_id, lead_id)?;
        Ok(self.orchestrator.can_convert(&lead))
    }

    /// Apply an ordinary status change. Loss and reactivation are routed
    /// through the orchestrator; conversion has its own entry point.
    pub fn transition(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        request: ManualTransition,
    ) -> Result<LeadTransition, LeadServiceError> {
        let lead = self.get(tenant_id, lead_id)?;

        let transition = match (lead.status, request.to) {
            (_, LeadStatus::Converted) => return Err(LeadServiceError::ConversionRequired),
            (from, LeadStatus::Lost) => self.orchestrator.mark_as_lost(MarkLostRequest {
                lead_id: lead.id.clone(),
                tenant_id: lead.tenant_id.clone(),
                user_id: request.user_id,
                from_status: from,
                reason: request.reason.unwrap_or_else(|| "unspecified".to_string()),
                notes: request.notes,
            })?,
            (LeadStatus::Lost, LeadStatus::New) => {
                self.orchestrator.reactivate(ReactivateRequest {
                    lead_id: lead.id.clone(),
                    tenant_id: lead.tenant_id.clone(),
                    user_id: request.user_id,
                    from_status: LeadStatus::Lost,
                    notes: request.notes,
                })?
            }
            (from, to) => {
                ensure_transition(from, to)?;
                LeadTransition::record(
                    lead.id.clone(),
                    lead.tenant_id.clone(),
                    from,
                    to,
                    request.user_id,
                    request.reason,
                    request.notes,
                )
            }
        };

        self.apply(lead, transition, None)
    }

    pub fn mark_as_lost(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        request: LoseLead,
    ) -> Result<LeadTransition, LeadServiceError> {
        let lead = self.get(tenant_id, lead_id)?;
        let transition = self.orchestrator.mark_as_lost(MarkLostRequest {
            lead_id: lead.id.clone(),
            tenant_id: lead.tenant_id.clone(),
            user_id: request.user_id,
            from_status: lead.status,
            reason: request.reason,
            notes: request.notes,
        })?;
        self.apply(lead, transition, None)
    }

    pub fn reactivate(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        request: ReactivateLead,
    ) -> Result<LeadTransition, LeadServiceError> {
        let lead = self.get(tenant_id, lead_id)?;
        let transition = self.orchestrator.reactivate(ReactivateRequest {
            lead_id: lead.id.clone(),
            tenant_id: lead.tenant_id.clone(),
            user_id: request.user_id,
            from_status: lead.status,
            notes: request.notes,
        })?;
        self.apply(lead, transition, None)
    }

    /// Convert an eligible lead. Ineligible leads come back as a failed
    /// outcome carrying the eligibility messages; the hooks are not invoked.
    pub async fn convert(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        request: ConvertLead,
    ) -> Result<ConversionOutcome, LeadServiceError> {
        let lead = self.get(tenant_id, lead_id)?;

        let preview = self.orchestrator.can_convert(&lead);
        if !preview.can_convert {
            info!(
                lead_id = %lead.id,
                reasons = ?preview.reasons,
                "lead not eligible for conversion"
            );
            return Ok(ConversionOutcome::failed(preview.reasons));
        }
        ensure_transition(lead.status, LeadStatus::Converted)?;

        let conversion = ConversionRequest {
            lead_id: lead.id.clone(),
            tenant_id: lead.tenant_id.clone(),
            course_run_id: request.course_run_id.clone(),
            user_id: request.user_id,
            enrollment_data: request.enrollment_data,
        };
        let outcome = self.orchestrator.convert(conversion.clone()).await;

        let (Some(transition), Some(enrollment_id)) =
            (outcome.transition.clone(), outcome.enrollment_id.clone())
        else {
            return Ok(outcome);
        };
        if !outcome.success {
            return Ok(outcome);
        }

        match self.record_conversion(tenant_id, lead_id, request.course_run_id, transition) {
            Ok(_) => Ok(outcome),
            Err(err) => {
                warn!(lead_id = %lead_id, error = %err, "converted lead could not be recorded");
                Ok(self
                    .orchestrator
                    .abandon(
                        &conversion,
                        &enrollment_id,
                        format!("conversion could not be recorded: {err}"),
                    )
                    .await)
            }
        }
    }

    /// Re-read the lead after the hooks ran so a status change made meanwhile
    /// (for example a concurrent loss) is not overwritten.
    fn record_conversion(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        course_run_id: String,
        transition: LeadTransition,
    ) -> Result<LeadTransition, LeadServiceError> {
        let current = self.get(tenant_id, lead_id)?;
        ensure_transition(current.status, LeadStatus::Converted)?;
        self.apply(current, transition, Some(course_run_id))
    }

    /// Store the new status, then the audit record. A failed append restores
    /// `lead` so no status change exists without its transition.
    fn apply(
        &self,
        lead: Lead,
        transition: LeadTransition,
        course_run_id: Option<String>,
    ) -> Result<LeadTransition, LeadServiceError> {
        let mut updated = lead.clone();
        updated.status = transition.to_status;
        if course_run_id.is_some() {
            updated.course_run_id = course_run_id;
        }
        self.repository.update(updated)?;

        if let Err(err) = self.repository.append_transition(transition.clone()) {
            if let Err(rollback) = self.repository.update(lead) {
                error!(
                    lead_id = %transition.lead_id,
                    error = %rollback,
                    "failed to roll back lead status"
                );
            }
            return Err(err.into());
        }

        info!(
            lead_id = %transition.lead_id,
            from = %transition.from_status,
            to = %transition.to_status,
            "lead status changed"
        );
        Ok(transition)
    }
}

/// Error raised by the lead lifecycle service.
#[derive(Debug, thiserror::Error)]
pub enum LeadServiceError {
    #[error("invalid lead capture: {0}")]
    InvalidCapture(String),
    #[error("conversion must go through the convert endpoint")]
    ConversionRequired,
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
