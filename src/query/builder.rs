//! Operation + arguments -> [`QuerySpec`].
//!
//! Every operation maps to one of five query shapes (see `plan`). Filtered operations share a
//! single path: plain bindings first, then fixed filters, then the plan's composite hook, then
//! the cross-field checks (date order, NCT-ID exclusivity) and finally unknown-argument
//! rejection. Nothing here touches the network or the request window.

use super::args::{ArgReader, ToolArgs};
use super::dates::format_date;
use super::plan::{self, ArgKind, Binding, Composite, FilteredPlan, QueryShape};
use super::{
    FilterKey, GroupBy, NctId, PageRequest, QuerySpec, Refinements, ResultShape, Similarity,
    Target,
};
use crate::config::PagingConfig;
use crate::study::Study;
use crate::{GatewayError, Operation};
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const DATE_PAIRS: [(FilterKey, FilterKey); 2] = [
    (FilterKey::StartDateFrom, FilterKey::StartDateTo),
    (FilterKey::CompletionDateFrom, FilterKey::CompletionDateTo),
];

/// Builds validated [`QuerySpec`]s.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    paging: PagingConfig,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new(PagingConfig::default())
    }
}

/// Filters and echo accumulated while reading arguments.
#[derive(Debug, Default)]
struct Draft {
    filters: BTreeMap<FilterKey, String>,
    /// Which argument populated each filter, for error reporting.
    sources: BTreeMap<FilterKey, String>,
    criteria: Map<String, Value>,
    refinements: Refinements,
    /// Parsed bounds behind the date filters.
    dates: BTreeMap<FilterKey, NaiveDate>,
}

impl Draft {
    fn set(&mut self, key: FilterKey, source: &str, value: String) {
        self.filters.insert(key, value);
        self.sources.insert(key, source.to_string());
    }

    fn echo(&mut self, name: &str, value: impl Into<Value>) {
        self.criteria.insert(name.to_string(), value.into());
    }
}

impl QueryBuilder {
    pub fn new(paging: PagingConfig) -> Self {
        Self { paging }
    }

    /// Validate `args` for `operation` and produce the upstream query.
    pub fn build(&self, operation: Operation, args: &ToolArgs) -> Result<QuerySpec, GatewayError> {
        match plan::shape(operation) {
            QueryShape::Filtered(plan) => self.filtered(operation, plan, args),
            QueryShape::ById { similar } => self.by_id(operation, similar, args),
            QueryShape::ByIds => self.by_ids(operation, args),
            QueryShape::Catalog => self.catalog(operation, args),
            QueryShape::FieldStats { sizes } => self.field_stats(operation, sizes, args),
        }
    }

    fn filtered(
        &self,
        operation: Operation,
        plan: FilteredPlan,
        args: &ToolArgs,
    ) -> Result<QuerySpec, GatewayError> {
        let mut reader = ArgReader::new(operation, args);
        let mut draft = Draft::default();

        if plan.id_lookup {
            if let Some(raw) = reader.text("nctId")? {
                let id = NctId::parse_arg(operation, "nctId", &raw)?;
                draft.echo("nctId", id.as_str());
                draft.set(FilterKey::Ids, "nctId", id.to_string());
            }
        }
        for binding in plan.bindings {
            apply_binding(&mut reader, &mut draft, binding)?;
        }
        for (key, value) in plan.fixed {
            draft.filters.insert(*key, value.to_string());
            let label = key.param().rsplit('.').next().unwrap_or(key.param());
            let echoed = match *value {
                "true" => Value::Bool(true),
                other => Value::String(other.to_string()),
            };
            draft.criteria.insert(label.to_string(), echoed);
        }
        if let Some(composite) = plan.composite {
            apply_composite(&mut reader, &mut draft, composite)?;
        }

        check_date_order(operation, &draft)?;
        if draft.filters.contains_key(&FilterKey::Ids) {
            let conflict = draft.sources.iter().find(|(key, _)| **key != FilterKey::Ids);
            if let Some((_, source)) = conflict {
                return Err(GatewayError::invalid(operation, source.clone(), "cannot be combined with `nctId`"));
            }
        }

        let (page, record_limit) = if operation.is_aggregation() {
            let cap = self.paging.max_aggregate_records;
            let limit = match reader.count("pageSize")? {
                None => cap,
                Some(0) => return Err(reader.invalid("pageSize", "must be at least 1")),
                Some(n) => usize::try_from(n).unwrap_or(usize::MAX).min(cap),
            };
            (PageRequest { size: self.paging.aggregate_page_size, token: None }, Some(limit))
        } else {
            let size = reader.page_size(self.paging.default_page_size, self.paging.max_page_size)?;
            let token = reader.text("pageToken")?;
            (PageRequest { size, token }, None)
        };
        if reader.has("nctId") && !plan.id_lookup {
            return Err(reader.invalid("nctId", "not supported here; use get_study_details or search_by_nct_ids"));
        }
        reader.finish()?;

        Ok(QuerySpec {
            operation,
            target: Target::Studies,
            filters: draft.filters,
            page,
            shape: ResultShape::Summary,
            refinements: draft.refinements,
            criteria: draft.criteria,
            record_limit,
        })
    }

    fn by_id(&self, operation: Operation, similar: bool, args: &ToolArgs) -> Result<QuerySpec, GatewayError> {
        let mut reader = ArgReader::new(operation, args);
        let raw = reader.required_text("nctId")?;
        let id = NctId::parse_arg(operation, "nctId", &raw)?;

        let mut criteria = Map::new();
        criteria.insert("nctId".to_string(), Value::String(id.to_string()));
        let mut refinements = Refinements::default();
        let mut page = PageRequest { size: self.paging.default_page_size, token: None };
        if similar {
            let similarity = reader
                .choice("similarityType", Similarity::NAMES)?
                .and_then(Similarity::from_name)
                .unwrap_or_default();
            criteria.insert("similarityType".to_string(), serde_json::to_value(similarity).unwrap_or(Value::Null));
            refinements.similarity = Some(similarity);
            page.size = reader.page_size(self.paging.default_page_size, self.paging.max_page_size)?;
        }
        if let Some(extra) = reader.unread() {
            return Err(reader.invalid(&extra, "cannot be combined with `nctId`"));
        }

        Ok(QuerySpec {
            operation,
            target: Target::Study(id),
            filters: BTreeMap::new(),
            page,
            shape: ResultShape::Full,
            refinements,
            criteria,
            record_limit: None,
        })
    }

    fn by_ids(&self, operation: Operation, args: &ToolArgs) -> Result<QuerySpec, GatewayError> {
        let mut reader = ArgReader::new(operation, args);
        let raw = reader.list("nctIds")?.ok_or_else(|| reader.invalid("nctIds", "is required"))?;
        let mut ids: Vec<NctId> = Vec::with_capacity(raw.len());
        for entry in &raw {
            let id = NctId::parse_arg(operation, "nctIds", entry)?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        let max = self.paging.max_page_size as usize;
        if ids.len() > max {
            return Err(reader.invalid("nctIds", format!("at most {} IDs per call (got {})", max, ids.len())));
        }
        reader.finish()?;

        let joined = ids.iter().map(NctId::as_str).collect::<Vec<_>>().join(",");
        let mut criteria = Map::new();
        criteria.insert(
            "nctIds".to_string(),
            Value::Array(ids.iter().map(|id| Value::String(id.to_string())).collect()),
        );
        Ok(QuerySpec {
            operation,
            target: Target::Studies,
            filters: BTreeMap::from([(FilterKey::Ids, joined)]),
            page: PageRequest { size: ids.len() as u32, token: None },
            shape: ResultShape::Summary,
            refinements: Refinements::default(),
            criteria,
            record_limit: None,
        })
    }

    fn catalog(&self, operation: Operation, args: &ToolArgs) -> Result<QuerySpec, GatewayError> {
        ArgReader::new(operation, args).finish()?;
        let target = match operation {
            Operation::ListStudyEnums => Target::Enums,
            Operation::GetSearchAreas => Target::SearchAreas,
            _ => Target::Version,
        };
        Ok(self.document(operation, target, BTreeMap::new(), ResultShape::Full, Map::new()))
    }

    fn field_stats(&self, operation: Operation, sizes: bool, args: &ToolArgs) -> Result<QuerySpec, GatewayError> {
        let mut reader = ArgReader::new(operation, args);
        let mut criteria = Map::new();
        let fields = reader.list("fields")?;
        let mut filters = BTreeMap::new();
        if !sizes {
            if let Some(types) = reader.choices("types", plan::FIELD_TYPES)? {
                criteria.insert("types".to_string(), Value::String(types.clone()));
                filters.insert(FilterKey::FieldTypes, types);
            }
        }
        reader.finish()?;

        let shape = match fields {
            Some(fields) => {
                criteria.insert("fields".to_string(), Value::from(fields.clone()));
                ResultShape::Fields(fields)
            }
            None => ResultShape::Full,
        };
        let target = if sizes { Target::FieldSizes } else { Target::FieldValues };
        Ok(self.document(operation, target, filters, shape, criteria))
    }

    fn document(
        &self,
        operation: Operation,
        target: Target,
        filters: BTreeMap<FilterKey, String>,
        shape: ResultShape,
        criteria: Map<String, Value>,
    ) -> QuerySpec {
        QuerySpec {
            operation,
            target,
            filters,
            page: PageRequest { size: self.paging.default_page_size, token: None },
            shape,
            refinements: Refinements::default(),
            criteria,
            record_limit: None,
        }
    }
}

fn apply_binding(reader: &mut ArgReader<'_>, draft: &mut Draft, binding: &Binding) -> Result<(), GatewayError> {
    let value: Option<(String, Value)> = match binding.kind {
        ArgKind::Text => reader.text_aliased(binding.arg, binding.aliases)?.map(|t| (t.clone(), Value::String(t))),
        ArgKind::Choice(allowed) => {
            reader.choice(binding.arg, allowed)?.map(|c| (c.to_string(), Value::String(c.to_string())))
        }
        ArgKind::Choices(allowed) => reader.choices(binding.arg, allowed)?.map(|c| (c.clone(), Value::String(c))),
        ArgKind::Flag => reader.flag(binding.arg)?.map(|b| (b.to_string(), Value::Bool(b))),
        ArgKind::Date => reader.date(binding.arg, binding.aliases)?.map(|(_, d)| {
            draft.dates.insert(binding.key, d);
            let formatted = format_date(d);
            (formatted.clone(), Value::String(formatted))
        }),
    };
    match value {
        Some((param, echoed)) => {
            draft.set(binding.key, binding.arg, param);
            draft.echo(binding.arg, echoed);
            Ok(())
        }
        None if binding.required => Err(reader.invalid(binding.arg, "is required")),
        None => Ok(()),
    }
}

fn apply_composite(reader: &mut ArgReader<'_>, draft: &mut Draft, composite: Composite) -> Result<(), GatewayError> {
    match composite {
        Composite::Location => {
            let mut parts = Vec::new();
            let mut city = false;
            for name in ["country", "state", "city", "facilityName"] {
                if let Some(part) = reader.text(name)? {
                    city |= name == "city";
                    draft.echo(name, part.clone());
                    parts.push(part);
                }
            }
            if parts.is_empty() {
                return Err(reader.invalid("country", "at least one of country, state, city or facilityName is required"));
            }
            let location = parts.join(", ");
            draft.echo("locationQuery", location.clone());
            draft.set(FilterKey::Location, "country", location);
            match reader.count("distance")? {
                Some(_) if !city => return Err(reader.invalid("distance", "requires `city`")),
                Some(0) => return Err(reader.invalid("distance", "must be at least 1")),
                Some(miles) => {
                    draft.echo("distance", miles);
                    draft.set(FilterKey::Distance, "distance", miles.to_string());
                }
                None => {}
            }
        }
        Composite::DateRange => {
            let bounded = DATE_PAIRS.iter().any(|(from, to)| draft.filters.contains_key(from) || draft.filters.contains_key(to));
            if !bounded {
                return Err(reader.invalid(
                    "startDateFrom",
                    "at least one of startDateFrom, startDateTo, completionDateFrom or completionDateTo is required",
                ));
            }
        }
        Composite::RareDisease => {
            if let Some(condition) = draft.filters.get(&FilterKey::Condition).cloned() {
                draft.set(FilterKey::Term, "rareDisease", format!("{} OR orphan OR rare", condition));
                draft.echo("searchNote", "Includes orphan and rare disease designations");
            }
        }
        Composite::Pediatric => {
            draft.echo("targetPopulation", "PEDIATRIC");
            if let Some(range) = reader.choice("ageRange", plan::AGE_RANGES)? {
                if let Some((min, max)) = plan::age_bounds(range) {
                    draft.set(FilterKey::MinimumAge, "ageRange", min.to_string());
                    draft.set(FilterKey::MaximumAge, "ageRange", max.to_string());
                }
                draft.echo("ageRange", range);
            }
        }
        Composite::Timeline => {
            let kind = reader.choice("timelineType", plan::TIMELINE_TYPES)?.unwrap_or("CURRENT");
            if let Some(statuses) = plan::timeline_statuses(kind) {
                draft.filters.insert(FilterKey::OverallStatus, statuses.to_string());
            }
            draft.echo("timelineType", kind);
        }
        Composite::Eligibility => {
            if let Some(words) = reader.text("exclusionKeywords")? {
                draft.refinements.exclusion_keywords = words.to_lowercase().split_whitespace().map(str::to_string).collect();
                draft.echo("exclusionKeywords", words);
            }
        }
        Composite::International => {
            if let Some(country) = reader.text("excludeCountry")? {
                draft.echo("excludeCountry", country.clone());
                draft.refinements.exclude_country = Some(country);
            }
            let min = match reader.count("minCountries")? {
                None => 2,
                Some(0) => return Err(reader.invalid("minCountries", "must be at least 1")),
                Some(n) => usize::try_from(n).unwrap_or(usize::MAX),
            };
            draft.echo("minCountries", min);
            draft.refinements.min_countries = Some(min);
        }
        Composite::Statistics => {
            let group_by = reader.choice("groupBy", GroupBy::NAMES)?;
            draft.echo("groupBy", group_by.unwrap_or("none"));
            draft.refinements.group_by = group_by.and_then(GroupBy::from_name);
            apply_statistics_filters(reader, draft)?;
        }
    }
    Ok(())
}

/// `filters` for trial statistics: an object (or its JSON text) with `condition`, `phase` and
/// `status`.
fn apply_statistics_filters(reader: &mut ArgReader<'_>, draft: &mut Draft) -> Result<(), GatewayError> {
    let operation = reader.operation();
    let Some((field, raw)) = reader.raw("filters", &[])? else {
        draft.echo("filters", Map::new());
        return Ok(());
    };
    let map = match raw {
        Value::Object(map) => map.clone(),
        Value::String(text) if text.trim().is_empty() => Map::new(),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(reader.invalid(&field, "must be a JSON object")),
            Err(e) => return Err(reader.invalid(&field, format!("is not valid JSON: {}", e))),
        },
        _ => return Err(reader.invalid(&field, "must be a JSON object")),
    };

    let nested = ToolArgs::from(map);
    let mut inner = ArgReader::new(operation, &nested);
    let mut echo = Map::new();
    let read = (|| -> Result<(), GatewayError> {
        if let Some(condition) = inner.text("condition")? {
            echo.insert("condition".to_string(), Value::String(condition.clone()));
            draft.set(FilterKey::Condition, "filters.condition", condition);
        }
        if let Some(phase) = inner.choices("phase", plan::PHASES)? {
            echo.insert("phase".to_string(), Value::String(phase.clone()));
            draft.set(FilterKey::Phase, "filters.phase", phase);
        }
        if let Some(status) = inner.choices("status", plan::STATUSES)? {
            echo.insert("status".to_string(), Value::String(status.clone()));
            draft.set(FilterKey::OverallStatus, "filters.status", status);
        }
        inner.finish()
    })();
    read.map_err(|err| nest_field(err, &field))?;
    draft.echo("filters", echo);
    Ok(())
}

fn nest_field(err: GatewayError, parent: &str) -> GatewayError {
    match err {
        GatewayError::InvalidArgument { operation, field, reason } => {
            GatewayError::InvalidArgument { operation, field: format!("{}.{}", parent, field), reason }
        }
        other => other,
    }
}

fn check_date_order(operation: Operation, draft: &Draft) -> Result<(), GatewayError> {
    for (from_key, to_key) in DATE_PAIRS {
        if let (Some(from), Some(to)) = (draft.dates.get(&from_key), draft.dates.get(&to_key)) {
            if from > to {
                let to_field = draft.sources.get(&to_key).map(String::as_str).unwrap_or("end");
                let from_field = draft.sources.get(&from_key).map(String::as_str).unwrap_or("start");
                return Err(GatewayError::invalid(
                    operation,
                    to_field,
                    format!("{} is before {} ({})", format_date(*to), from_field, format_date(*from)),
                ));
            }
        }
    }
    Ok(())
}

/// Second stage of `get_similar_studies`: a listing driven by what the reference study is about.
///
/// Returns `None` when the reference carries nothing to match on.
pub fn similar_search(spec: &QuerySpec, reference: &Study) -> Option<QuerySpec> {
    let similarity = spec.refinements.similarity.unwrap_or_default();
    let (key, value) = match similarity {
        Similarity::Condition => (FilterKey::Condition, any_of(reference.conditions().iter().map(String::as_str))?),
        Similarity::Intervention => (FilterKey::Intervention, any_of(reference.intervention_names().into_iter())?),
        Similarity::Sponsor => (FilterKey::Sponsor, reference.lead_sponsor_name()?.to_string()),
        Similarity::Phase => {
            let phases = reference.phases();
            if phases.is_empty() {
                return None;
            }
            (FilterKey::Phase, phases.join(","))
        }
    };

    let mut criteria = spec.criteria.clone();
    criteria.insert("matchedOn".to_string(), Value::String(value.clone()));
    Some(QuerySpec {
        operation: spec.operation,
        target: Target::Studies,
        filters: BTreeMap::from([(key, value)]),
        page: PageRequest { size: spec.page.size, token: None },
        shape: ResultShape::Summary,
        refinements: Refinements { similarity: Some(similarity), ..Refinements::default() },
        criteria,
        record_limit: None,
    })
}

/// Up to three terms OR-ed together, quoting multi-word terms.
fn any_of<'a>(terms: impl Iterator<Item = &'a str>) -> Option<String> {
    let terms: Vec<String> = terms
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .take(3)
        .map(|t| if t.contains(char::is_whitespace) { format!("\"{}\"", t) } else { t.to_string() })
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}
