use serde::{Deserialize, Serialize};

use super::domain::{EnrollmentId, Lead, LeadId, LeadTransition, TenantId};
use super::scoring::LeadGrade;
use super::transitions::get_next_statuses;

/// Storage abstraction for leads and their transition history.
///
/// Implementations must key records by tenant so one academy never reads or
/// rewrites another academy's leads.
pub trait LeadRepository: Send + Sync {
    fn insert(&self, lead: Lead) -> Result<Lead, RepositoryError>;
    fn update(&self, lead: Lead) -> Result<(), RepositoryError>;
    fn fetch(&self, tenant_id: &TenantId, id: &LeadId) -> Result<Option<Lead>, RepositoryError>;
    fn append_transition(&self, transition: LeadTransition) -> Result<(), RepositoryError>;
    fn transitions(
        &self,
        tenant_id: &TenantId,
        id: &LeadId,
    ) -> Result<Vec<LeadTransition>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Everything the storage collaborator needs to enroll a converted lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentDraft {
    pub lead_id: LeadId,
    pub tenant_id: TenantId,
    pub course_run_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment_data: Option<serde_json::Value>,
}

/// Storage seam used by conversion to create (and, when compensating,
/// discard) course enrollments.
pub trait EnrollmentWriter: Send + Sync {
    fn create_enrollment(&self, draft: &EnrollmentDraft) -> Result<EnrollmentId, EnrollmentError>;
    fn discard_enrollment(&self, id: &EnrollmentId) -> Result<(), EnrollmentError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EnrollmentError {
    #[error("learner already enrolled in course run {0}")]
    AlreadyEnrolled(String),
    #[error("enrollment {0} not found")]
    NotFound(EnrollmentId),
    #[error("enrollment store unavailable: {0}")]
    Unavailable(String),
}

/// Sanitized lead summary returned by the HTTP layer.
#[derive(Debug, Clone, Serialize)]
pub struct LeadStatusView {
    pub lead_id: LeadId,
    pub tenant_id: TenantId,
    pub status: &'static str,
    pub score: u8,
    pub grade: LeadGrade,
    pub next_statuses: Vec<&'static str>,
}

impl LeadStatusView {
    pub fn from_lead(lead: &Lead) -> Self {
        Self {
            lead_id: lead.id.clone(),
            tenant_id: lead.tenant_id.clone(),
            status: lead.status.label(),
            score: lead.score,
            grade: LeadGrade::from_score(lead.score),
            next_statuses: get_next_statuses(lead.status)
                .into_iter()
                .map(|status| status.label())
                .collect(),
        }
    }
}
