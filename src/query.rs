//! Canonical query model.
//!
//! A [`QuerySpec`] is everything the dispatcher needs to issue one upstream request (or, for
//! aggregations, one request per page): the endpoint, the populated filters keyed by
//! [`FilterKey`], paging state and the result shape. It also carries the local refinements the
//! assembler applies after the fact, and the normalized arguments echoed back as search criteria.

use crate::{GatewayError, Operation};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub mod args;
pub mod builder;
pub mod dates;
mod plan;

pub use args::ToolArgs;
pub use builder::{similar_search, QueryBuilder};

/// Upstream filter and query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterKey {
    Term,
    Condition,
    Intervention,
    Location,
    Sponsor,
    Outcome,
    Eligibility,
    OverallStatus,
    Phase,
    Sex,
    StdAge,
    MinimumAge,
    MaximumAge,
    HealthyVolunteers,
    LeadSponsorClass,
    InterventionType,
    Distance,
    StartDateFrom,
    StartDateTo,
    CompletionDateFrom,
    CompletionDateTo,
    HasResults,
    Ids,
    FieldTypes,
}

impl FilterKey {
    /// Upstream query-string parameter.
    pub fn param(self) -> &'static str {
        match self {
            FilterKey::Term => "query.term",
            FilterKey::Condition => "query.cond",
            FilterKey::Intervention => "query.intr",
            FilterKey::Location => "query.locn",
            FilterKey::Sponsor => "query.spons",
            FilterKey::Outcome => "query.outc",
            FilterKey::Eligibility => "query.eligibility",
            FilterKey::OverallStatus => "filter.overallStatus",
            FilterKey::Phase => "filter.phase",
            FilterKey::Sex => "filter.sex",
            FilterKey::StdAge => "filter.stdAge",
            FilterKey::MinimumAge => "filter.minimumAge",
            FilterKey::MaximumAge => "filter.maximumAge",
            FilterKey::HealthyVolunteers => "filter.healthyVolunteers",
            FilterKey::LeadSponsorClass => "filter.leadSponsorClass",
            FilterKey::InterventionType => "filter.interventionType",
            FilterKey::Distance => "filter.distance",
            FilterKey::StartDateFrom => "filter.studyStartDateFrom",
            FilterKey::StartDateTo => "filter.studyStartDateTo",
            FilterKey::CompletionDateFrom => "filter.primaryCompletionDateFrom",
            FilterKey::CompletionDateTo => "filter.primaryCompletionDateTo",
            FilterKey::HasResults => "filter.hasResults",
            FilterKey::Ids => "filter.ids",
            FilterKey::FieldTypes => "types",
        }
    }
}

/// Upstream endpoint addressed by a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Studies,
    Study(NctId),
    Enums,
    SearchAreas,
    FieldValues,
    FieldSizes,
    Version,
}

impl Target {
    /// Path relative to the API base url.
    pub fn path(&self) -> String {
        match self {
            Target::Studies => "/studies".to_string(),
            Target::Study(id) => format!("/studies/{}", id),
            Target::Enums => "/studies/enums".to_string(),
            Target::SearchAreas => "/studies/search-areas".to_string(),
            Target::FieldValues => "/stats/field/values".to_string(),
            Target::FieldSizes => "/stats/field/sizes".to_string(),
            Target::Version => "/version".to_string(),
        }
    }

    fn is_listing(&self) -> bool {
        matches!(self, Target::Studies)
    }
}

/// Which parts of each record upstream should return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultShape {
    /// Whole record.
    Full,
    /// Protocol section only.
    Summary,
    /// Explicit field list.
    Fields(Vec<String>),
}

impl ResultShape {
    fn fields_param(&self) -> Option<String> {
        match self {
            ResultShape::Full => None,
            ResultShape::Summary => Some("protocolSection".to_string()),
            ResultShape::Fields(fields) => Some(fields.join(",")),
        }
    }
}

/// Paging cursor for list requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub size: u32,
    pub token: Option<String>,
}

/// Grouping for trial statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GroupBy {
    Status,
    Phase,
    StudyType,
    Condition,
    Sponsor,
}

impl GroupBy {
    pub const NAMES: &'static [&'static str] = &["status", "phase", "studyType", "condition", "sponsor"];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "status" => Some(GroupBy::Status),
            "phase" => Some(GroupBy::Phase),
            "studyType" => Some(GroupBy::StudyType),
            "condition" => Some(GroupBy::Condition),
            "sponsor" => Some(GroupBy::Sponsor),
            _ => None,
        }
    }
}

/// What "similar" means for `get_similar_studies`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Similarity {
    #[default]
    Condition,
    Intervention,
    Sponsor,
    Phase,
}

impl Similarity {
    pub const NAMES: &'static [&'static str] = &["CONDITION", "INTERVENTION", "SPONSOR", "PHASE"];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "CONDITION" => Some(Similarity::Condition),
            "INTERVENTION" => Some(Similarity::Intervention),
            "SPONSOR" => Some(Similarity::Sponsor),
            "PHASE" => Some(Similarity::Phase),
            _ => None,
        }
    }
}

/// Post-filters and groupings applied locally to upstream results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Refinements {
    /// Lower-cased words; a study whose eligibility text contains any of them is dropped.
    pub exclusion_keywords: Vec<String>,
    pub min_countries: Option<usize>,
    pub exclude_country: Option<String>,
    pub group_by: Option<GroupBy>,
    pub similarity: Option<Similarity>,
}

/// Canonical, validated description of an upstream query.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub operation: Operation,
    pub target: Target,
    pub filters: BTreeMap<FilterKey, String>,
    pub page: PageRequest,
    pub shape: ResultShape,
    pub refinements: Refinements,
    /// Normalized arguments echoed back to the caller.
    pub criteria: Map<String, Value>,
    /// Record cap for aggregation walks.
    pub record_limit: Option<usize>,
}

impl QuerySpec {
    pub fn filter(&self, key: FilterKey) -> Option<&str> {
        self.filters.get(&key).map(String::as_str)
    }

    /// Query-string parameters, in a stable order.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        match &self.target {
            Target::Studies => params.push(("format".to_string(), "json".to_string())),
            Target::Study(_) => params.push(("format".to_string(), "json".to_string())),
            _ => {}
        }
        for (key, value) in &self.filters {
            params.push((key.param().to_string(), value.clone()));
        }
        if self.target.is_listing() {
            params.push(("countTotal".to_string(), "true".to_string()));
            params.push(("pageSize".to_string(), self.page.size.to_string()));
            if let Some(token) = &self.page.token {
                params.push(("pageToken".to_string(), token.clone()));
            }
        }
        let takes_fields =
            matches!(self.target, Target::Studies | Target::Study(_) | Target::FieldValues | Target::FieldSizes);
        if takes_fields {
            if let Some(fields) = self.shape.fields_param() {
                params.push(("fields".to_string(), fields));
            }
        }
        params
    }

    /// Same query resumed at `token`, asking for at most `size` records.
    pub fn next_page(&self, token: Option<String>, size: u32) -> QuerySpec {
        let mut next = self.clone();
        next.page = PageRequest { size, token };
        next
    }
}

/// Registry study identifier: `NCT` followed by eight digits.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NctId(String);

impl NctId {
    /// Accepts any case and surrounding whitespace.
    pub fn parse(raw: &str) -> Option<NctId> {
        let id = raw.trim().to_ascii_uppercase();
        let digits = id.strip_prefix("NCT")?;
        if digits.len() == 8 && digits.bytes().all(|b| b.is_ascii_digit()) {
            Some(NctId(id))
        } else {
            None
        }
    }

    pub(crate) fn parse_arg(operation: Operation, field: &str, raw: &str) -> Result<NctId, GatewayError> {
        NctId::parse(raw).ok_or_else(|| {
            GatewayError::invalid(
                operation,
                field,
                format!("`{}` is not an NCT ID (expected NCT followed by 8 digits)", raw.trim()),
            )
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NctId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> QuerySpec {
        QuerySpec {
            operation: Operation::SearchByCondition,
            target: Target::Studies,
            filters: BTreeMap::from([
                (FilterKey::Phase, "PHASE3".to_string()),
                (FilterKey::Condition, "asthma".to_string()),
            ]),
            page: PageRequest { size: 50, token: Some("abc".into()) },
            shape: ResultShape::Summary,
            refinements: Refinements::default(),
            criteria: Map::new(),
            record_limit: None,
        }
    }

    #[test]
    fn listing_params_are_ordered_and_complete() {
        let params = listing().to_params();
        let keys: Vec<&str> = params.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec!["format", "query.cond", "filter.phase", "countTotal", "pageSize", "pageToken", "fields"]
        );
        assert!(params.contains(&("pageSize".to_string(), "50".to_string())));
    }

    #[test]
    fn catalog_targets_send_nothing() {
        let mut spec = listing();
        spec.target = Target::Version;
        spec.filters.clear();
        assert!(spec.to_params().is_empty());
    }

    #[test]
    fn study_lookup_has_no_paging() {
        let mut spec = listing();
        spec.target = Target::Study(NctId::parse("NCT01234567").unwrap());
        spec.filters.clear();
        spec.shape = ResultShape::Full;
        assert_eq!(spec.to_params(), vec![("format".to_string(), "json".to_string())]);
        assert_eq!(spec.target.path(), "/studies/NCT01234567");
    }

    #[test]
    fn nct_id_validation() {
        assert_eq!(NctId::parse(" nct01234567 ").unwrap().as_str(), "NCT01234567");
        assert!(NctId::parse("NCT0123456").is_none());
        assert!(NctId::parse("NCT0123456X").is_none());
        assert!(NctId::parse("01234567").is_none());
    }

    #[test]
    fn next_page_keeps_filters() {
        let next = listing().next_page(Some("tok2".into()), 20);
        assert_eq!(next.page, PageRequest { size: 20, token: Some("tok2".into()) });
        assert_eq!(next.filter(FilterKey::Condition), Some("asthma"));
    }
}
