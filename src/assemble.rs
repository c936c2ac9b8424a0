//! Turns decoded upstream responses into [`AggregatedResult`]s.
//!
//! Single-request operations are assembled from one [`Upstream`] value; aggregations fold pages
//! through an [`Aggregation`] while [`walk_pages`] drives the continuation tokens. Local
//! post-filters (exclusion keywords, country constraints) run here, after upstream filtering.

pub mod pages;
pub mod stats;

pub use pages::{page_stream, walk_pages, FetchedPage, PageSource, PageWalk};
pub use stats::{group_key, Bucket, EnrollmentDistribution, SummaryCollector, TrialStatistics};

use crate::query::{QuerySpec, Refinements, Similarity};
use crate::study::{DateSummary, Study, StudyDetail, StudySummary, Upstream, UpstreamPage};
use crate::{GatewayError, Operation};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};

/// What an operation hands back to the tool layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedResult {
    pub operation: Operation,
    /// Upstream's match count for listings; records analysed for aggregations.
    pub total_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_total: Option<u64>,
    /// Entries in the payload after local filtering.
    pub results_shown: usize,
    /// An aggregation stopped at its record cap with more records upstream.
    pub truncated: bool,
    pub pages_fetched: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    pub search_criteria: Map<String, Value>,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum Payload {
    Studies(Vec<StudySummary>),
    Study(Box<StudyDetail>),
    Similar(SimilarStudies),
    Statistics(TrialStatistics),
    Distribution(EnrollmentDistribution),
    /// Catalog and field statistics documents, passed through.
    Document(Value),
}

impl Payload {
    fn shown(&self) -> usize {
        match self {
            Payload::Studies(studies) => studies.len(),
            Payload::Similar(similar) => similar.studies.len(),
            Payload::Statistics(stats) => stats.analyzed_studies,
            Payload::Distribution(dist) => dist.analyzed_studies,
            Payload::Study(_) | Payload::Document(_) => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarStudies {
    pub reference: ReferenceStudy,
    pub similarity: Similarity,
    /// The reference attribute the listing was searched on; absent when the reference had none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_on: Option<String>,
    pub studies: Vec<StudySummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceStudy {
    pub nct_id: Option<String>,
    pub title: Option<String>,
    pub conditions: Vec<String>,
    pub phases: Vec<String>,
    pub sponsor: Option<String>,
}

impl ReferenceStudy {
    fn of(study: &Study) -> Self {
        Self {
            nct_id: study.nct_id().map(str::to_string),
            title: study.title().map(str::to_string),
            conditions: study.conditions().to_vec(),
            phases: study.phases().to_vec(),
            sponsor: study.lead_sponsor_name().map(str::to_string),
        }
    }
}

/// Assemble a single-request operation.
pub fn assemble_single(spec: &QuerySpec, upstream: Upstream, today: NaiveDate) -> Result<AggregatedResult, GatewayError> {
    let (payload, total, upstream_total, next_page_token) = match upstream {
        Upstream::Page(page) => {
            let fetched = page.studies.len() as u64;
            let studies = page
                .studies
                .iter()
                .filter(|s| keep(s, &spec.refinements))
                .map(|s| decorate(spec.operation, s, today))
                .collect();
            (Payload::Studies(studies), page.total_count.unwrap_or(fetched), page.total_count, page.next_page_token)
        }
        Upstream::Study(study) => (Payload::Study(Box::new(study.detail())), 1, None, None),
        Upstream::Document(doc) => (Payload::Document(doc), 1, None, None),
    };
    Ok(envelope(spec, payload, total, upstream_total, 1, false, next_page_token, spec.criteria.clone()))
}

/// Assemble `get_similar_studies` from the reference record and, when the reference had
/// something to match on, the follow-up listing.
pub fn assemble_similar(
    spec: &QuerySpec,
    reference: &Study,
    listing: Option<(&QuerySpec, UpstreamPage)>,
) -> AggregatedResult {
    let similarity = spec.refinements.similarity.unwrap_or_default();
    let reference_id = reference.nct_id();
    let (studies, matched_on, criteria, total, pages) = match listing {
        Some((follow_up, page)) => {
            let studies: Vec<StudySummary> = page
                .studies
                .iter()
                .filter(|s| s.nct_id().is_none() || s.nct_id() != reference_id)
                .map(Study::summary)
                .collect();
            let matched_on = follow_up.criteria.get("matchedOn").and_then(Value::as_str).map(str::to_string);
            let total = page.total_count.unwrap_or(studies.len() as u64);
            (studies, matched_on, follow_up.criteria.clone(), total, 2)
        }
        None => (Vec::new(), None, spec.criteria.clone(), 0, 1),
    };
    let payload = Payload::Similar(SimilarStudies {
        reference: ReferenceStudy::of(reference),
        similarity,
        matched_on,
        studies,
    });
    envelope(spec, payload, total, None, pages, false, None, criteria)
}

#[derive(Debug)]
enum Fold {
    Statistics(TrialStatistics),
    Distribution(EnrollmentDistribution),
    Summaries(SummaryCollector),
}

/// Page-by-page state of an aggregation operation.
#[derive(Debug)]
pub struct Aggregation {
    operation: Operation,
    refinements: Refinements,
    today: NaiveDate,
    fold: Fold,
}

impl Aggregation {
    pub fn for_spec(spec: &QuerySpec, today: NaiveDate) -> Self {
        let fold = match spec.operation {
            Operation::GetTrialStatistics => Fold::Statistics(TrialStatistics::new(spec.refinements.group_by)),
            Operation::GetEnrollmentDistribution => Fold::Distribution(EnrollmentDistribution::new()),
            _ => Fold::Summaries(SummaryCollector::default()),
        };
        Self { operation: spec.operation, refinements: spec.refinements.clone(), today, fold }
    }

    pub fn add_page(&mut self, studies: &[Study]) {
        for study in studies.iter().filter(|s| keep(s, &self.refinements)) {
            match &mut self.fold {
                Fold::Statistics(stats) => stats.add(study),
                Fold::Distribution(dist) => dist.add(study),
                Fold::Summaries(collector) => collector.push(decorate(self.operation, study, self.today)),
            }
        }
    }

    pub fn finish(self, spec: &QuerySpec, walk: PageWalk) -> AggregatedResult {
        let payload = match self.fold {
            Fold::Statistics(stats) => Payload::Statistics(stats),
            Fold::Distribution(dist) => Payload::Distribution(dist.finish()),
            Fold::Summaries(collector) => Payload::Studies(collector.studies),
        };
        envelope(
            spec,
            payload,
            walk.records as u64,
            walk.upstream_total,
            walk.pages,
            walk.truncated,
            walk.next_page_token,
            spec.criteria.clone(),
        )
    }
}

#[allow(clippy::too_many_arguments)]
fn envelope(
    spec: &QuerySpec,
    payload: Payload,
    total_count: u64,
    upstream_total: Option<u64>,
    pages_fetched: usize,
    truncated: bool,
    next_page_token: Option<String>,
    search_criteria: Map<String, Value>,
) -> AggregatedResult {
    AggregatedResult {
        operation: spec.operation,
        total_count,
        upstream_total,
        results_shown: payload.shown(),
        truncated,
        pages_fetched,
        next_page_token,
        search_criteria,
        payload,
    }
}

/// Local post-filters; upstream cannot express these.
fn keep(study: &Study, refinements: &Refinements) -> bool {
    if !refinements.exclusion_keywords.is_empty() {
        let text = study.eligibility_text().to_lowercase();
        if refinements.exclusion_keywords.iter().any(|word| text.contains(word.as_str())) {
            return false;
        }
    }
    if refinements.min_countries.is_none() && refinements.exclude_country.is_none() {
        return true;
    }
    let countries = study.countries();
    if refinements.min_countries.is_some_and(|min| countries.len() < min) {
        return false;
    }
    match &refinements.exclude_country {
        Some(excluded) => !countries.iter().any(|c| c.eq_ignore_ascii_case(excluded)),
        None => true,
    }
}

/// Listing entry for `operation`: the base summary plus what that operation is about.
pub fn decorate(operation: Operation, study: &Study, today: NaiveDate) -> StudySummary {
    let mut summary = study.summary();
    match operation {
        Operation::SearchByCondition | Operation::SearchRareDiseases => {
            summary.conditions = study.conditions().to_vec();
            summary.eligibility = Some(study.eligibility_summary(false));
        }
        Operation::GetPediatricStudies => {
            summary.conditions = study.conditions().to_vec();
            summary.eligibility = Some(study.eligibility_summary(false));
            summary.locations = Some(study.locations().iter().take(2).cloned().collect());
        }
        Operation::GetRecruitingStudies => {
            summary.eligibility = Some(study.eligibility_summary(false));
            summary.locations = Some(study.locations().iter().take(2).cloned().collect());
        }
        Operation::SearchByLocation => {
            summary.locations = Some(study.locations().iter().take(3).cloned().collect());
        }
        Operation::SearchByDateRange => {
            summary.dates = Some(DateSummary {
                start_date: study.start_date().map(str::to_string),
                primary_completion_date: study.primary_completion_date().map(str::to_string),
            });
        }
        Operation::GetStudyTimeline => summary.timeline = Some(study.timeline(today)),
        Operation::SearchBySponsor => summary.sponsor_details = study.lead_sponsor().cloned(),
        Operation::GetStudiesWithResults => {
            summary.completion_date = Some(study.primary_completion_date().unwrap_or("Not specified").to_string());
            summary.has_results = Some(study.has_results);
        }
        Operation::SearchByEligibilityCriteria => summary.eligibility = Some(study.eligibility_summary(true)),
        Operation::SearchInternationalStudies => summary.international_details = Some(study.international_details()),
        _ => {}
    }
    summary
}
