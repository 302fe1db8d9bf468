mod condition;
mod grade;
mod rules;

pub use condition::{ConditionOperator, ConditionValue, RuleCondition};
pub use grade::{recommendation, LeadGrade};
pub use rules::{default_rules, RuleCategory, RuleRegistry, ScoringRule};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{clamp_score, Lead};

/// Score at or above which a lead counts as sales-ready.
pub const DEFAULT_QUALIFICATION_THRESHOLD: u8 = 60;

/// Rule-based scorer owning its own registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringEngine {
    registry: RuleRegistry,
}

impl ScoringEngine {
    pub fn new() -> Self {
        Self::with_rules(default_rules())
    }

    pub fn with_rules(rules: Vec<ScoringRule>) -> Self {
        Self {
            registry: RuleRegistry::new(rules),
        }
    }

    pub fn score(&self, lead: &Lead) -> ScoreResult {
        let mut raw_total: i32 = 0;
        let breakdown: Vec<RuleOutcome> = self
            .registry
            .all()
            .iter()
            .map(|rule| {
                let matched = rule.condition.matches(lead);
                let points = if matched { rule.points } else { 0 };
                raw_total = raw_total.saturating_add(points);
                RuleOutcome {
                    rule_id: rule.id.clone(),
                    name: rule.name.clone(),
                    category: rule.category,
                    matched,
                    points,
                }
            })
            .collect();

        let total_score = clamp_score(raw_total);
        let grade = LeadGrade::from_score(total_score);

        ScoreResult {
            total_score,
            breakdown,
            grade,
            recommendation: grade.recommendation().to_string(),
        }
    }

    pub fn add_rule(&mut self, rule: ScoringRule) -> Option<ScoringRule> {
        self.registry.add(rule)
    }

    pub fn remove_rule(&mut self, id: &str) -> bool {
        self.registry.remove(id)
    }

    pub fn rules(&self) -> &[ScoringRule] {
        self.registry.all()
    }

    pub fn rules_by_category(&self, category: RuleCategory) -> Vec<&ScoringRule> {
        self.registry.by_category(category)
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Auditable entry for one evaluated rule; `points` is 0 when unmatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule_id: String,
    pub name: String,
    pub category: RuleCategory,
    pub matched: bool,
    pub points: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub total_score: u8,
    pub breakdown: Vec<RuleOutcome>,
    pub grade: LeadGrade,
    pub recommendation: String,
}

impl ScoreResult {
    pub fn outcome(&self, rule_id: &str) -> Option<&RuleOutcome> {
        self.breakdown.iter().find(|entry| entry.rule_id == rule_id)
    }

    /// Matched points per category, before clamping.
    pub fn category_totals(&self) -> BTreeMap<RuleCategory, i32> {
        let mut totals = BTreeMap::new();
        for entry in self.breakdown.iter().filter(|entry| entry.matched) {
            let total = totals.entry(entry.category).or_insert(0i32);
            *total = total.saturating_add(entry.points);
        }
        totals
    }
}

pub fn quick_score(lead: &Lead) -> u8 {
    ScoringEngine::new().score(lead).total_score
}

pub fn is_qualified(lead: &Lead, threshold: Option<u8>) -> bool {
    quick_score(lead) >= threshold.unwrap_or(DEFAULT_QUALIFICATION_THRESHOLD)
}
