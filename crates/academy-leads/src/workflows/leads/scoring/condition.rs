use serde::{Deserialize, Serialize};

use super::super::domain::{FieldValue, Lead, LeadField};

/// Comparison applied by a rule condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    Exists,
    Contains,
}

type Matcher = fn(FieldValue<'_>, Option<&ConditionValue>) -> bool;

impl ConditionOperator {
    fn matcher(self) -> Matcher {
        match self {
            Self::Equals => matches_equals,
            Self::Exists => matches_exists,
            Self::Contains => matches_contains,
        }
    }
}

/// Literal a condition compares against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Flag(bool),
    Text(String),
}

impl From<bool> for ConditionValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<&str> for ConditionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// `{field, operator, value}` predicate evaluated against a lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCondition {
    pub field: LeadField,
    pub operator: ConditionOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ConditionValue>,
}

impl RuleCondition {
    pub fn equals(field: LeadField, value: impl Into<ConditionValue>) -> Self {
        Self {
            field,
            operator: ConditionOperator::Equals,
            value: Some(value.into()),
        }
    }

    pub fn exists(field: LeadField) -> Self {
        Self {
            field,
            operator: ConditionOperator::Exists,
            value: None,
        }
    }

    pub fn contains(field: LeadField, value: impl Into<ConditionValue>) -> Self {
        Self {
            field,
            operator: ConditionOperator::Contains,
            value: Some(value.into()),
        }
    }

    pub fn matches(&self, lead: &Lead) -> bool {
        let matcher = self.operator.matcher();
        matcher(lead.field_value(&self.field), self.value.as_ref())
    }
}

fn matches_equals(field: FieldValue<'_>, expected: Option<&ConditionValue>) -> bool {
    match (field, expected) {
        (FieldValue::Text(actual), Some(ConditionValue::Text(expected))) => {
            actual == expected.as_str()
        }
        (FieldValue::Flag(actual), Some(ConditionValue::Flag(expected))) => actual == *expected,
        _ => false,
    }
}

fn matches_exists(field: FieldValue<'_>, _expected: Option<&ConditionValue>) -> bool {
    match field {
        FieldValue::Missing => false,
        FieldValue::Text(value) => !value.trim().is_empty(),
        FieldValue::Flag(_) => true,
        FieldValue::Collection(values) => !values.is_empty(),
    }
}

fn matches_contains(field: FieldValue<'_>, expected: Option<&ConditionValue>) -> bool {
    let Some(ConditionValue::Text(needle)) = expected else {
        return false;
    };

    match field {
        FieldValue::Collection(values) => values.contains(needle),
        FieldValue::Text(haystack) => haystack.contains(needle.as_str()),
        FieldValue::Missing | FieldValue::Flag(_) => false,
    }
}
