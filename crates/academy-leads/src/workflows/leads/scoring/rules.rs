use serde::{Deserialize, Serialize};

use super::super::domain::{LeadField, LeadSource};
use super::condition::RuleCondition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Demographic,
    Behavioral,
    Attribution,
    Consent,
}

impl RuleCategory {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Demographic => "demographic",
            Self::Behavioral => "behavioral",
            Self::Attribution => "attribution",
            Self::Consent => "consent",
        }
    }
}

/// Weighted predicate contributing to a lead's quality score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRule {
    pub id: String,
    pub name: String,
    pub description: String,
    pub condition: RuleCondition,
    pub points: i32,
    pub category: RuleCategory,
}

impl ScoringRule {
    pub fn new(
        id: &str,
        name: &str,
        description: &str,
        condition: RuleCondition,
        points: i32,
        category: RuleCategory,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            condition,
            points,
            category,
        }
    }
}

/// Rules seeded into every new engine. Referral must outweigh every other
/// acquisition signal.
pub fn default_rules() -> Vec<ScoringRule> {
    vec![
        ScoringRule::new(
            "has_phone",
            "Phone number provided",
            "Lead left a phone number and can be called back",
            RuleCondition::exists(LeadField::Phone),
            15,
            RuleCategory::Demographic,
        ),
        ScoringRule::new(
            "has_name",
            "Name provided",
            "Lead introduced themselves by name",
            RuleCondition::exists(LeadField::Name),
            10,
            RuleCategory::Demographic,
        ),
        ScoringRule::new(
            "course_interest",
            "Course interest",
            "Lead asked about a specific course run",
            RuleCondition::exists(LeadField::CourseRunId),
            20,
            RuleCategory::Behavioral,
        ),
        ScoringRule::new(
            "priority_tag",
            "Flagged as priority",
            "Admissions staff tagged the lead as priority",
            RuleCondition::contains(LeadField::Tags, "priority"),
            10,
            RuleCategory::Behavioral,
        ),
        ScoringRule::new(
            "campaign_attribution",
            "Campaign attribution",
            "Lead arrived through a tracked campaign",
            RuleCondition::exists(LeadField::CampaignId),
            10,
            RuleCategory::Attribution,
        ),
        ScoringRule::new(
            "source_referral",
            "Referral",
            "Lead was referred by a student, alumnus or partner",
            RuleCondition::equals(LeadField::Source, LeadSource::Referral.label()),
            25,
            RuleCategory::Attribution,
        ),
        ScoringRule::new(
            "source_website",
            "Website enquiry",
            "Lead used the public capture form",
            RuleCondition::equals(LeadField::Source, LeadSource::Website.label()),
            5,
            RuleCategory::Attribution,
        ),
        ScoringRule::new(
            "utm_tracked",
            "UTM tracked",
            "Capture carried a utm_source parameter",
            RuleCondition::exists(LeadField::UtmSource),
            5,
            RuleCategory::Attribution,
        ),
        ScoringRule::new(
            "marketing_consent",
            "Marketing consent",
            "Lead opted in to marketing communication",
            RuleCondition::equals(LeadField::MarketingConsent, true),
            10,
            RuleCategory::Consent,
        ),
        ScoringRule::new(
            "gdpr_consent",
            "GDPR consent",
            "Lead accepted data processing",
            RuleCondition::equals(LeadField::GdprConsent, true),
            5,
            RuleCategory::Consent,
        ),
    ]
}

/// Ordered, per-engine rule collection. Ids are unique within a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleRegistry {
    rules: Vec<ScoringRule>,
}

impl RuleRegistry {
    pub fn new(rules: Vec<ScoringRule>) -> Self {
        let mut registry = Self::default();
        for rule in rules {
            registry.add(rule);
        }
        registry
    }

    /// Insert a rule, replacing and returning any rule already using its id.
    pub fn add(&mut self, rule: ScoringRule) -> Option<ScoringRule> {
        match self.rules.iter_mut().find(|existing| existing.id == rule.id) {
            Some(existing) => Some(std::mem::replace(existing, rule)),
            None => {
                self.rules.push(rule);
                None
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|rule| rule.id != id);
        self.rules.len() != before
    }

    pub fn get(&self, id: &str) -> Option<&ScoringRule> {
        self.rules.iter().find(|rule| rule.id == id)
    }

    pub fn all(&self) -> &[ScoringRule] {
        &self.rules
    }

    pub fn by_category(&self, category: RuleCategory) -> Vec<&ScoringRule> {
        self.rules
            .iter()
            .filter(|rule| rule.category == category)
            .collect()
    }
}
