use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for captured leads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeadId(pub String);

/// Academy (tenant) owning a lead. Never rewritten once a lead is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(pub String);

/// Identifier handed back by the storage collaborator for a created enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnrollmentId(pub String);

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for EnrollmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a lead.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Qualified,
    Converted,
    Lost,
}

impl LeadStatus {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::New,
            Self::Contacted,
            Self::Qualified,
            Self::Converted,
            Self::Lost,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Qualified => "qualified",
            Self::Converted => "converted",
            Self::Lost => "lost",
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Acquisition channel recorded by the capture form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    #[default]
    Website,
    Referral,
    Social,
    Event,
    Advertising,
    Other,
}

impl LeadSource {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Website => "website",
            Self::Referral => "referral",
            Self::Social => "social",
            Self::Event => "event",
            Self::Advertising => "advertising",
            Self::Other => "other",
        }
    }

    /// Lenient parse used by imports; unknown channels collapse to `Other`.
    pub fn from_label(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "website" | "web" => Self::Website,
            "referral" => Self::Referral,
            "social" => Self::Social,
            "event" => Self::Event,
            "advertising" | "ads" => Self::Advertising,
            _ => Self::Other,
        }
    }
}

/// Campaign tracking parameters captured alongside the form submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UtmParameters {
    pub source: Option<String>,
    pub medium: Option<String>,
    pub campaign: Option<String>,
    pub term: Option<String>,
    pub content: Option<String>,
}

/// Prospective-student record.
///
/// `Lead::default()` doubles as the partial record used by scoring and
/// eligibility previews: absent contact data is `None` and an empty `email`
/// means no address was provided.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lead {
    pub id: LeadId,
    pub tenant_id: TenantId,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub source: LeadSource,
    pub course_run_id: Option<String>,
    pub campaign_id: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub utm: UtmParameters,
    pub status: LeadStatus,
    pub gdpr_consent: bool,
    pub gdpr_consent_at: Option<DateTime<Utc>>,
    pub marketing_consent: bool,
    pub marketing_consent_at: Option<DateTime<Utc>>,
    pub score: u8,
    pub tags: BTreeSet<String>,
    pub notes: Option<String>,
}

impl Lead {
    pub fn field_value(&self, field: &LeadField) -> FieldValue<'_> {
        fn text(value: &Option<String>) -> FieldValue<'_> {
            match value {
                Some(value) => FieldValue::Text(value.as_str()),
                None => FieldValue::Missing,
            }
        }

        match field {
            LeadField::Email => FieldValue::Text(self.email.as_str()),
            LeadField::Name => text(&self.name),
            LeadField::Phone => text(&self.phone),
            LeadField::Source => FieldValue::Text(self.source.label()),
            LeadField::CourseRunId => text(&self.course_run_id),
            LeadField::CampaignId => text(&self.campaign_id),
            LeadField::Status => FieldValue::Text(self.status.label()),
            LeadField::GdprConsent => FieldValue::Flag(self.gdpr_consent),
            LeadField::MarketingConsent => FieldValue::Flag(self.marketing_consent),
            LeadField::Tags => FieldValue::Collection(&self.tags),
            LeadField::Notes => text(&self.notes),
            LeadField::UtmSource => text(&self.utm.source),
            LeadField::UtmMedium => text(&self.utm.medium),
            LeadField::UtmCampaign => text(&self.utm.campaign),
            LeadField::Metadata(key) => match self.metadata.get(key) {
                Some(value) => FieldValue::Text(value.as_str()),
                None => FieldValue::Missing,
            },
        }
    }
}

pub(crate) fn clamp_score(total: i32) -> u8 {
    total.clamp(0, 100) as u8
}

/// Lead attributes addressable from scoring conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadField {
    Email,
    Name,
    Phone,
    Source,
    CourseRunId,
    CampaignId,
    Status,
    GdprConsent,
    MarketingConsent,
    Tags,
    Notes,
    UtmSource,
    UtmMedium,
    UtmCampaign,
    Metadata(String),
}

/// Borrowed view of a single lead attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Missing,
    Text(&'a str),
    Flag(bool),
    Collection(&'a BTreeSet<String>),
}

/// Capture-form payload used to create a lead at status `new`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadCapture {
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub source: Option<LeadSource>,
    pub course_run_id: Option<String>,
    pub campaign_id: Option<String>,
    pub gdpr_consent: bool,
    pub marketing_consent: bool,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub utm: UtmParameters,
    pub metadata: BTreeMap<String, String>,
}

/// Append-only audit record of one status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadTransition {
    pub lead_id: LeadId,
    pub tenant_id: TenantId,
    pub from_status: LeadStatus,
    pub to_status: LeadStatus,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl LeadTransition {
    pub(crate) fn record(
        lead_id: LeadId,
        tenant_id: TenantId,
        from_status: LeadStatus,
        to_status: LeadStatus,
        user_id: String,
        reason: Option<String>,
        notes: Option<String>,
    ) -> Self {
        Self {
            lead_id,
            tenant_id,
            from_status,
            to_status,
            user_id,
            reason,
            notes,
            timestamp: Utc::now(),
        }
    }
}
