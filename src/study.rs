//! Typed view of registry records and the summaries built from them.
//!
//! Only the modules the gateway reads are modelled. Every field is optional or defaulted, since
//! upstream omits modules freely.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

const NOT_SPECIFIED: &str = "Not specified";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Study {
    pub protocol_section: ProtocolSection,
    pub has_results: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProtocolSection {
    pub identification_module: IdentificationModule,
    pub status_module: StatusModule,
    pub design_module: DesignModule,
    pub sponsor_collaborators_module: SponsorModule,
    pub conditions_module: ConditionsModule,
    pub eligibility_module: EligibilityModule,
    pub contacts_locations_module: ContactsLocationsModule,
    pub arms_interventions_module: ArmsInterventionsModule,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentificationModule {
    pub nct_id: Option<String>,
    pub brief_title: Option<String>,
    pub official_title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusModule {
    pub overall_status: Option<String>,
    pub start_date_struct: Option<DateStruct>,
    pub primary_completion_date_struct: Option<DateStruct>,
    pub completion_date_struct: Option<DateStruct>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateStruct {
    pub date: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DesignModule {
    pub study_type: Option<String>,
    pub phases: Vec<String>,
    pub enrollment_info: Option<EnrollmentInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrollmentInfo {
    pub count: Option<u64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SponsorModule {
    pub lead_sponsor: Option<Sponsor>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sponsor {
    pub name: Option<String>,
    pub class: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionsModule {
    pub conditions: Vec<String>,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EligibilityModule {
    pub eligibility_criteria: Option<String>,
    pub healthy_volunteers: Option<bool>,
    pub sex: Option<String>,
    pub minimum_age: Option<String>,
    pub maximum_age: Option<String>,
    pub std_ages: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactsLocationsModule {
    pub locations: Vec<Location>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmsInterventionsModule {
    pub interventions: Vec<Intervention>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Intervention {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub name: Option<String>,
}

impl Study {
    pub fn nct_id(&self) -> Option<&str> {
        self.protocol_section.identification_module.nct_id.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.protocol_section.identification_module.brief_title.as_deref()
    }

    pub fn overall_status(&self) -> Option<&str> {
        self.protocol_section.status_module.overall_status.as_deref()
    }

    pub fn study_type(&self) -> Option<&str> {
        self.protocol_section.design_module.study_type.as_deref()
    }

    pub fn phases(&self) -> &[String] {
        &self.protocol_section.design_module.phases
    }

    pub fn conditions(&self) -> &[String] {
        &self.protocol_section.conditions_module.conditions
    }

    pub fn intervention_names(&self) -> Vec<&str> {
        self.protocol_section
            .arms_interventions_module
            .interventions
            .iter()
            .filter_map(|i| i.name.as_deref())
            .collect()
    }

    pub fn lead_sponsor(&self) -> Option<&Sponsor> {
        self.protocol_section.sponsor_collaborators_module.lead_sponsor.as_ref()
    }

    pub fn lead_sponsor_name(&self) -> Option<&str> {
        self.lead_sponsor().and_then(|s| s.name.as_deref())
    }

    pub fn enrollment(&self) -> Option<u64> {
        self.protocol_section.design_module.enrollment_info.as_ref().and_then(|e| e.count)
    }

    pub fn start_date(&self) -> Option<&str> {
        date_of(&self.protocol_section.status_module.start_date_struct)
    }

    pub fn primary_completion_date(&self) -> Option<&str> {
        date_of(&self.protocol_section.status_module.primary_completion_date_struct)
    }

    pub fn locations(&self) -> &[Location] {
        &self.protocol_section.contacts_locations_module.locations
    }

    pub fn eligibility_text(&self) -> &str {
        self.protocol_section.eligibility_module.eligibility_criteria.as_deref().unwrap_or("")
    }

    /// Distinct countries across all sites, sorted.
    pub fn countries(&self) -> Vec<String> {
        self.locations()
            .iter()
            .filter_map(|l| l.country.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Compact listing entry; operations add decorations on top.
    pub fn summary(&self) -> StudySummary {
        let phase = if self.phases().is_empty() {
            vec![NOT_SPECIFIED.to_string()]
        } else {
            self.phases().to_vec()
        };
        StudySummary {
            nct_id: self.nct_id().map(str::to_string),
            title: self.title().map(str::to_string),
            status: self.overall_status().map(str::to_string),
            phase,
            study_type: self.study_type().unwrap_or("Unknown").to_string(),
            sponsor: self.lead_sponsor_name().unwrap_or(NOT_SPECIFIED).to_string(),
            conditions: self.conditions().iter().take(3).cloned().collect(),
            start_date: self.start_date().unwrap_or(NOT_SPECIFIED).to_string(),
            ..StudySummary::default()
        }
    }

    pub fn eligibility_summary(&self, with_criteria: bool) -> EligibilitySummary {
        let module = &self.protocol_section.eligibility_module;
        let criteria_preview = with_criteria.then(|| {
            let text = self.eligibility_text();
            if text.is_empty() {
                "Not available".to_string()
            } else {
                preview(text, 200)
            }
        });
        EligibilitySummary {
            sex: module.sex.clone().unwrap_or_else(|| "Unknown".to_string()),
            minimum_age: module.minimum_age.clone().unwrap_or_else(|| NOT_SPECIFIED.to_string()),
            maximum_age: module.maximum_age.clone().unwrap_or_else(|| NOT_SPECIFIED.to_string()),
            healthy_volunteers: module.healthy_volunteers.unwrap_or(false),
            criteria_preview,
        }
    }

    /// Timeline milestones; `days_from_start` is measured to `today` and is negative for
    /// studies that have not started.
    pub fn timeline(&self, today: NaiveDate) -> Timeline {
        let days_from_start = self.start_date().and_then(parse_registry_date).map(|start| (today - start).num_days());
        Timeline {
            start_date: self.start_date().map(str::to_string),
            primary_completion_date: self.primary_completion_date().map(str::to_string),
            status: self.overall_status().map(str::to_string),
            days_from_start,
        }
    }

    pub fn international_details(&self) -> InternationalDetails {
        let countries = self.countries();
        InternationalDetails {
            total_countries: countries.len(),
            countries,
            total_locations: self.locations().len(),
            sample_locations: self.locations().iter().take(3).cloned().collect(),
        }
    }

    /// Full record view for `get_study_details`.
    pub fn detail(&self) -> StudyDetail {
        let p = &self.protocol_section;
        StudyDetail {
            identification: p.identification_module.clone(),
            status: StatusDetail {
                overall_status: self.overall_status().map(str::to_string),
                start_date: self.start_date().map(str::to_string),
                primary_completion_date: self.primary_completion_date().map(str::to_string),
            },
            design: DesignDetail {
                study_type: self.study_type().map(str::to_string),
                phases: self.phases().to_vec(),
                enrollment: self.enrollment(),
            },
            sponsor: self.lead_sponsor().cloned(),
            conditions: self.conditions().to_vec(),
            eligibility: p.eligibility_module.clone(),
            interventions: p.arms_interventions_module.interventions.clone(),
            locations: self.locations().iter().take(10).cloned().collect(),
            has_results: self.has_results,
        }
    }
}

fn date_of(date: &Option<DateStruct>) -> Option<&str> {
    date.as_ref().and_then(|d| d.date.as_deref())
}

/// Registry dates come as `YYYY-MM-DD` or `YYYY-MM`.
pub fn parse_registry_date(raw: &str) -> Option<NaiveDate> {
    crate::query::dates::parse_date(raw).ok()
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// One page of a `/studies` listing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpstreamPage {
    pub studies: Vec<Study>,
    pub total_count: Option<u64>,
    pub next_page_token: Option<String>,
}

/// A decoded upstream response.
#[derive(Debug, Clone, PartialEq)]
pub enum Upstream {
    Page(UpstreamPage),
    Study(Box<Study>),
    /// Catalog and statistics endpoints, passed through as-is.
    Document(Value),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySummary {
    pub nct_id: Option<String>,
    pub title: Option<String>,
    pub status: Option<String>,
    pub phase: Vec<String>,
    pub study_type: String,
    pub sponsor: String,
    pub conditions: Vec<String>,
    pub start_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eligibility: Option<EligibilitySummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<Location>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dates: Option<DateSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeline: Option<Timeline>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sponsor_details: Option<Sponsor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_results: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub international_details: Option<InternationalDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilitySummary {
    pub sex: String,
    pub minimum_age: String,
    pub maximum_age: String,
    pub healthy_volunteers: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub criteria_preview: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateSummary {
    pub start_date: Option<String>,
    pub primary_completion_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub start_date: Option<String>,
    pub primary_completion_date: Option<String>,
    pub status: Option<String>,
    pub days_from_start: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternationalDetails {
    pub total_countries: usize,
    pub countries: Vec<String>,
    pub total_locations: usize,
    pub sample_locations: Vec<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyDetail {
    pub identification: IdentificationModule,
    pub status: StatusDetail,
    pub design: DesignDetail,
    pub sponsor: Option<Sponsor>,
    pub conditions: Vec<String>,
    pub eligibility: EligibilityModule,
    pub interventions: Vec<Intervention>,
    pub locations: Vec<Location>,
    pub has_results: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDetail {
    pub overall_status: Option<String>,
    pub start_date: Option<String>,
    pub primary_completion_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignDetail {
    pub study_type: Option<String>,
    pub phases: Vec<String>,
    pub enrollment: Option<u64>,
}
