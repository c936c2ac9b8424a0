//! Accumulators for the aggregation operations.
//!
//! Each accumulator folds pages as they arrive so a walk never holds more than one page of raw
//! records. [`EnrollmentDistribution`] also keeps one count per analysed study for the exact
//! median, which the aggregation record cap bounds.

use crate::query::GroupBy;
use crate::study::{Study, StudySummary};
use serde::Serialize;
use std::collections::BTreeMap;

const UNKNOWN: &str = "Unknown";
const NOT_SPECIFIED: &str = "Not specified";

/// Counts for `get_trial_statistics`.
///
/// Without a grouping the default breakdown (status, phase, study type) is produced; with one,
/// only `groups` is filled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialStatistics {
    pub analyzed_studies: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by: Option<GroupBy>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub by_status: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub by_phase: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub by_study_type: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub groups: BTreeMap<String, usize>,
}

impl TrialStatistics {
    pub fn new(group_by: Option<GroupBy>) -> Self {
        Self { group_by, ..Self::default() }
    }

    pub fn add(&mut self, study: &Study) {
        self.analyzed_studies += 1;
        match self.group_by {
            Some(group) => bump(&mut self.groups, group_key(study, group)),
            None => {
                bump(&mut self.by_status, group_key(study, GroupBy::Status));
                // Multi-phase studies count once per phase.
                if study.phases().is_empty() {
                    bump(&mut self.by_phase, NOT_SPECIFIED.to_string());
                }
                for phase in study.phases() {
                    bump(&mut self.by_phase, phase.clone());
                }
                bump(&mut self.by_study_type, group_key(study, GroupBy::StudyType));
            }
        }
    }
}

fn bump(counts: &mut BTreeMap<String, usize>, key: String) {
    *counts.entry(key).or_insert(0) += 1;
}

/// Label a study falls under for `group`.
pub fn group_key(study: &Study, group: GroupBy) -> String {
    let label = match group {
        GroupBy::Status => study.overall_status().unwrap_or(UNKNOWN),
        GroupBy::StudyType => study.study_type().unwrap_or(UNKNOWN),
        GroupBy::Phase => study.phases().first().map(String::as_str).unwrap_or(NOT_SPECIFIED),
        GroupBy::Condition => study.conditions().first().map(String::as_str).unwrap_or(NOT_SPECIFIED),
        GroupBy::Sponsor => study.lead_sponsor_name().unwrap_or(NOT_SPECIFIED),
    };
    label.to_string()
}

/// Upper bounds (inclusive) of the enrollment buckets; the last bucket is open-ended.
const BUCKETS: &[(&str, u64)] = &[
    ("0-50", 50),
    ("51-100", 100),
    ("101-500", 500),
    ("501-1000", 1000),
    ("1001-5000", 5000),
    ("5001+", u64::MAX),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub range: &'static str,
    pub count: usize,
}

/// Enrollment histogram for `get_enrollment_distribution`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentDistribution {
    pub analyzed_studies: usize,
    pub buckets: Vec<Bucket>,
    /// Studies without an enrollment count.
    pub unknown: usize,
    pub mean: Option<f64>,
    pub median: Option<u64>,
    pub min: Option<u64>,
    pub max: Option<u64>,
    /// One entry per study with a count; at most the aggregation cap.
    #[serde(skip)]
    counts: Vec<u64>,
}

impl Default for EnrollmentDistribution {
    fn default() -> Self {
        Self {
            analyzed_studies: 0,
            buckets: BUCKETS.iter().map(|&(range, _)| Bucket { range, count: 0 }).collect(),
            unknown: 0,
            mean: None,
            median: None,
            min: None,
            max: None,
            counts: Vec::new(),
        }
    }
}

impl EnrollmentDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, study: &Study) {
        self.analyzed_studies += 1;
        let Some(count) = study.enrollment() else {
            self.unknown += 1;
            return;
        };
        if let Some(idx) = BUCKETS.iter().position(|&(_, upper)| count <= upper) {
            self.buckets[idx].count += 1;
        }
        self.counts.push(count);
    }

    /// Compute the summary figures from everything added so far.
    pub fn finish(mut self) -> Self {
        if self.counts.is_empty() {
            return self;
        }
        self.counts.sort_unstable();
        let n = self.counts.len();
        let sum: u64 = self.counts.iter().sum();
        self.mean = Some((sum as f64 / n as f64 * 10.0).round() / 10.0);
        self.median = Some(if n % 2 == 1 {
            self.counts[n / 2]
        } else {
            (self.counts[n / 2 - 1] + self.counts[n / 2]) / 2
        });
        self.min = self.counts.first().copied();
        self.max = self.counts.last().copied();
        self
    }
}

/// Collects decorated summaries for listing-style aggregations (`get_studies_with_results`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryCollector {
    pub studies: Vec<StudySummary>,
}

impl SummaryCollector {
    pub fn push(&mut self, summary: StudySummary) {
        self.studies.push(summary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn study(value: serde_json::Value) -> Study {
        serde_json::from_value(json!({ "protocolSection": value })).unwrap()
    }

    fn enrolled(count: u64) -> Study {
        study(json!({"designModule": {"enrollmentInfo": {"count": count}}}))
    }

    #[test]
    fn default_breakdown_counts_every_phase() {
        let mut stats = TrialStatistics::new(None);
        stats.add(&study(json!({
            "statusModule": {"overallStatus": "RECRUITING"},
            "designModule": {"studyType": "INTERVENTIONAL", "phases": ["PHASE1", "PHASE2"]}
        })));
        stats.add(&Study::default());

        assert_eq!(stats.analyzed_studies, 2);
        assert_eq!(stats.by_status["RECRUITING"], 1);
        assert_eq!(stats.by_status["Unknown"], 1);
        assert_eq!(stats.by_phase["PHASE1"], 1);
        assert_eq!(stats.by_phase["PHASE2"], 1);
        assert_eq!(stats.by_phase["Not specified"], 1);
        assert_eq!(stats.by_study_type["INTERVENTIONAL"], 1);
        assert!(stats.groups.is_empty());
    }

    #[test]
    fn custom_grouping_fills_only_groups() {
        let mut stats = TrialStatistics::new(Some(GroupBy::Sponsor));
        stats.add(&study(json!({"sponsorCollaboratorsModule": {"leadSponsor": {"name": "NCI"}}})));
        stats.add(&study(json!({"sponsorCollaboratorsModule": {"leadSponsor": {"name": "NCI"}}})));
        stats.add(&Study::default());

        assert_eq!(stats.groups["NCI"], 2);
        assert_eq!(stats.groups["Not specified"], 1);
        assert!(stats.by_status.is_empty());
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["groupBy"], "sponsor");
        assert!(json.get("byStatus").is_none());
    }

    #[test]
    fn enrollment_buckets_boundaries() {
        let mut dist = EnrollmentDistribution::new();
        for count in [0, 50, 51, 100, 500, 501, 1000, 1001, 5000, 5001] {
            dist.add(&enrolled(count));
        }
        dist.add(&Study::default());
        let dist = dist.finish();

        let counts: Vec<usize> = dist.buckets.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![2, 2, 1, 2, 2, 1]);
        assert_eq!(dist.unknown, 1);
        assert_eq!(dist.analyzed_studies, 11);
        assert_eq!(dist.min, Some(0));
        assert_eq!(dist.max, Some(5001));
    }

    #[test]
    fn enrollment_summary_figures() {
        let mut dist = EnrollmentDistribution::new();
        for count in [10, 20, 30, 100] {
            dist.add(&enrolled(count));
        }
        let dist = dist.finish();
        assert_eq!(dist.mean, Some(40.0));
        assert_eq!(dist.median, Some(25));
    }

    #[test]
    fn median_state_holds_only_known_counts() {
        let mut dist = EnrollmentDistribution::new();
        for count in [300, 100, 200] {
            dist.add(&enrolled(count));
        }
        for _ in 0..5 {
            dist.add(&Study::default());
        }
        assert_eq!(dist.counts.len(), 3);
        assert_eq!(dist.analyzed_studies, 8);

        let dist = dist.finish();
        assert_eq!(dist.median, Some(200));
        assert_eq!(dist.unknown, 5);
    }

    #[test]
    fn empty_distribution_has_no_figures() {
        let dist = EnrollmentDistribution::new().finish();
        assert_eq!(dist.mean, None);
        assert_eq!(dist.buckets.len(), 6);
        let json = serde_json::to_value(&dist).unwrap();
        assert!(json.get("counts").is_none());
    }
}
