use serde::{Deserialize, Deserializer};
use std::io::Read;

use crate::workflows::leads::domain::{LeadCapture, LeadSource, UtmParameters};

pub(crate) fn parse_captures<R: Read>(reader: R) -> Result<Vec<LeadCapture>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut captures = Vec::new();

    for record in csv_reader.deserialize::<LeadRow>() {
        let row = record?;
        captures.push(row.into_capture());
    }

    Ok(captures)
}

#[derive(Debug, Deserialize)]
struct LeadRow {
    #[serde(rename = "Email")]
    email: String,
    #[serde(rename = "Name", default, deserialize_with = "empty_string_as_none")]
    name: Option<String>,
    #[serde(rename = "Phone", default, deserialize_with = "empty_string_as_none")]
    phone: Option<String>,
    #[serde(rename = "Source", default, deserialize_with = "empty_string_as_none")]
    source: Option<String>,
    #[serde(
        rename = "Course Run",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    course_run: Option<String>,
    #[serde(rename = "Campaign", default, deserialize_with = "empty_string_as_none")]
    campaign: Option<String>,
    #[serde(
        rename = "GDPR Consent",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    gdpr_consent: Option<String>,
    #[serde(
        rename = "Marketing Consent",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    marketing_consent: Option<String>,
    #[serde(rename = "Tags", default, deserialize_with = "empty_string_as_none")]
    tags: Option<String>,
    #[serde(
        rename = "UTM Source",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    utm_source: Option<String>,
    #[serde(
        rename = "UTM Medium",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    utm_medium: Option<String>,
    #[serde(
        rename = "UTM Campaign",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    utm_campaign: Option<String>,
}

impl LeadRow {
    fn into_capture(self) -> LeadCapture {
        LeadCapture {
            email: self.email,
            name: self.name,
            phone: self.phone,
            source: self.source.as_deref().map(LeadSource::from_label),
            course_run_id: self.course_run,
            campaign_id: self.campaign,
            gdpr_consent: self.gdpr_consent.as_deref().is_some_and(parse_flag),
            marketing_consent: self.marketing_consent.as_deref().is_some_and(parse_flag),
            tags: self.tags.as_deref().map(split_tags).unwrap_or_default(),
            utm: UtmParameters {
                source: self.utm_source,
                medium: self.utm_medium,
                campaign: self.utm_campaign,
                ..UtmParameters::default()
            },
            ..LeadCapture::default()
        }
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "y" | "1" | "x"
    )
}

fn split_tags(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
pub(crate) fn parse_flag_for_tests(value: &str) -> bool {
    parse_flag(value)
}
