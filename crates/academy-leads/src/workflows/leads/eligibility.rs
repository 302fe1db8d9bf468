use serde::{Deserialize, Serialize};

use super::domain::{Lead, LeadStatus};

pub const HAS_EMAIL: &str = "has_email";
pub const HAS_GDPR_CONSENT: &str = "has_gdpr_consent";
pub const IS_QUALIFIED: &str = "is_qualified";
pub const NOT_ALREADY_CONVERTED: &str = "not_already_converted";

/// Named precondition a lead must satisfy before conversion.
struct EligibilityCheck {
    id: &'static str,
    message: &'static str,
    passes: fn(&Lead) -> bool,
}

// Callers key localized copy off these ids; keep the order and ids stable.
const CONVERSION_CHECKS: [EligibilityCheck; 4] = [
    EligibilityCheck {
        id: HAS_EMAIL,
        message: "lead has no email address",
        passes: |lead| !lead.email.trim().is_empty(),
    },
    EligibilityCheck {
        id: HAS_GDPR_CONSENT,
        message: "lead has not given GDPR consent",
        passes: |lead| lead.gdpr_consent,
    },
    EligibilityCheck {
        id: IS_QUALIFIED,
        message: "lead must be qualified before conversion",
        passes: |lead| lead.status == LeadStatus::Qualified,
    },
    EligibilityCheck {
        id: NOT_ALREADY_CONVERTED,
        message: "lead has already been converted",
        passes: |lead| lead.status != LeadStatus::Converted,
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedCheck {
    pub id: String,
    pub message: String,
}

/// Result of running every conversion check against a lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityReport {
    pub eligible: bool,
    pub failed_checks: Vec<FailedCheck>,
}

impl EligibilityReport {
    pub fn failed(&self, check_id: &str) -> bool {
        self.failed_checks.iter().any(|check| check.id == check_id)
    }
}

/// Evaluate all checks without short-circuiting so every blocker is reported.
pub fn check_eligibility(lead: &Lead) -> EligibilityReport {
    let failed_checks: Vec<FailedCheck> = CONVERSION_CHECKS
        .iter()
        .filter(|check| !(check.passes)(lead))
        .map(|check| FailedCheck {
            id: check.id.to_string(),
            message: check.message.to_string(),
        })
        .collect();

    EligibilityReport {
        eligible: failed_checks.is_empty(),
        failed_checks,
    }
}
