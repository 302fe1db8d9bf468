//! Lead capture, scoring and conversion for multi-tenant course academies.
//!
//! Leads move through `new -> contacted -> qualified -> converted` with `lost`
//! reachable from every open status. Scoring is a pure function of the lead
//! and the engine's rule set; conversion into an enrollment runs through
//! injected hooks so storage and notifications stay outside this module.

pub mod conversion;
pub mod domain;
pub mod eligibility;
pub mod import;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;
pub mod transitions;

#[cfg(test)]
mod tests;

pub use conversion::{
    can_convert, ConversionHooks, ConversionOrchestrator, ConversionOutcome, ConversionPreview,
    ConversionRequest, HookError, HookFuture, MarkLostRequest, PostConvertFailurePolicy,
    ReactivateRequest,
};
pub use domain::{
    EnrollmentId, FieldValue, Lead, LeadCapture, LeadField, LeadId, LeadSource, LeadStatus,
    LeadTransition, TenantId, UtmParameters,
};
pub use eligibility::{check_eligibility, EligibilityReport, FailedCheck};
pub use import::{LeadCsvImporter, LeadImportError};
pub use repository::{
    EnrollmentDraft, EnrollmentError, EnrollmentWriter, LeadRepository, LeadStatusView,
    RepositoryError,
};
pub use router::lead_router;
pub use scoring::{
    default_rules, is_qualified, quick_score, recommendation, ConditionOperator, ConditionValue,
    LeadGrade, RuleCategory, RuleCondition, RuleOutcome, RuleRegistry, ScoreResult,
    ScoringEngine, ScoringRule, DEFAULT_QUALIFICATION_THRESHOLD,
};
pub use service::{
    ConvertLead, LeadLifecycleService, LeadServiceError, LoseLead, ManualTransition,
    ReactivateLead,
};
pub use transitions::{
    ensure_transition, get_next_statuses, is_terminal, is_valid_status_transition,
    TransitionError, TransitionTable,
};
