//! The fixed catalogue of registry operations exposed to the tool layer.

use crate::GatewayError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Every operation the gateway can execute.
///
/// The tool layer addresses operations by their snake_case name (`search_by_condition`, ...);
/// [`FromStr`] maps those names onto this enum and rejects anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    SearchStudies,
    GetStudyDetails,
    SearchByLocation,
    SearchByCondition,
    GetTrialStatistics,
    SearchBySponsor,
    SearchByIntervention,
    GetRecruitingStudies,
    SearchByDateRange,
    GetStudiesWithResults,
    SearchRareDiseases,
    GetPediatricStudies,
    GetSimilarStudies,
    SearchByPrimaryOutcome,
    SearchByEligibilityCriteria,
    GetStudyTimeline,
    SearchInternationalStudies,
    SearchByNctIds,
    GetEnrollmentDistribution,
    GetFieldValueStats,
    GetFieldSizeStats,
    ListStudyEnums,
    GetSearchAreas,
    GetApiVersion,
}

impl Operation {
    /// All operations in catalogue order.
    pub const ALL: [Operation; 24] = [
        Operation::SearchStudies,
        Operation::GetStudyDetails,
        Operation::SearchByLocation,
        Operation::SearchByCondition,
        Operation::GetTrialStatistics,
        Operation::SearchBySponsor,
        Operation::SearchByIntervention,
        Operation::GetRecruitingStudies,
        Operation::SearchByDateRange,
        Operation::GetStudiesWithResults,
        Operation::SearchRareDiseases,
        Operation::GetPediatricStudies,
        Operation::GetSimilarStudies,
        Operation::SearchByPrimaryOutcome,
        Operation::SearchByEligibilityCriteria,
        Operation::GetStudyTimeline,
        Operation::SearchInternationalStudies,
        Operation::SearchByNctIds,
        Operation::GetEnrollmentDistribution,
        Operation::GetFieldValueStats,
        Operation::GetFieldSizeStats,
        Operation::ListStudyEnums,
        Operation::GetSearchAreas,
        Operation::GetApiVersion,
    ];

    /// Tool-facing name.
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::SearchStudies => "search_studies",
            Operation::GetStudyDetails => "get_study_details",
            Operation::SearchByLocation => "search_by_location",
            Operation::SearchByCondition => "search_by_condition",
            Operation::GetTrialStatistics => "get_trial_statistics",
            Operation::SearchBySponsor => "search_by_sponsor",
            Operation::SearchByIntervention => "search_by_intervention",
            Operation::GetRecruitingStudies => "get_recruiting_studies",
            Operation::SearchByDateRange => "search_by_date_range",
            Operation::GetStudiesWithResults => "get_studies_with_results",
            Operation::SearchRareDiseases => "search_rare_diseases",
            Operation::GetPediatricStudies => "get_pediatric_studies",
            Operation::GetSimilarStudies => "get_similar_studies",
            Operation::SearchByPrimaryOutcome => "search_by_primary_outcome",
            Operation::SearchByEligibilityCriteria => "search_by_eligibility_criteria",
            Operation::GetStudyTimeline => "get_study_timeline",
            Operation::SearchInternationalStudies => "search_international_studies",
            Operation::SearchByNctIds => "search_by_nct_ids",
            Operation::GetEnrollmentDistribution => "get_enrollment_distribution",
            Operation::GetFieldValueStats => "get_field_value_stats",
            Operation::GetFieldSizeStats => "get_field_size_stats",
            Operation::ListStudyEnums => "list_study_enums",
            Operation::GetSearchAreas => "get_search_areas",
            Operation::GetApiVersion => "get_api_version",
        }
    }

    /// One-line description, used by the CLI listing.
    pub fn description(self) -> &'static str {
        match self {
            Operation::SearchStudies => "Search clinical trials with free text and common filters",
            Operation::GetStudyDetails => "Detailed record for one study by NCT ID",
            Operation::SearchByLocation => "Trials by country, state, city or facility",
            Operation::SearchByCondition => "Trials for a medical condition",
            Operation::GetTrialStatistics => "Aggregate counts by status, phase, type, condition or sponsor",
            Operation::SearchBySponsor => "Trials by sponsor or organization",
            Operation::SearchByIntervention => "Trials by intervention or treatment",
            Operation::GetRecruitingStudies => "Currently recruiting trials with eligibility and sites",
            Operation::SearchByDateRange => "Trials by start or primary completion date range",
            Operation::GetStudiesWithResults => "Completed trials with posted results",
            Operation::SearchRareDiseases => "Trials for rare and orphan conditions",
            Operation::GetPediatricStudies => "Trials enrolling children and adolescents",
            Operation::GetSimilarStudies => "Trials similar to a reference study",
            Operation::SearchByPrimaryOutcome => "Trials by primary outcome measure",
            Operation::SearchByEligibilityCriteria => "Trials by age, sex and eligibility keywords",
            Operation::GetStudyTimeline => "Start and completion milestones for trials",
            Operation::SearchInternationalStudies => "Trials running in several countries",
            Operation::SearchByNctIds => "Batch lookup of several NCT IDs",
            Operation::GetEnrollmentDistribution => "Distribution of planned or actual enrollment sizes",
            Operation::GetFieldValueStats => "Value statistics for registry fields",
            Operation::GetFieldSizeStats => "Size statistics for list-valued registry fields",
            Operation::ListStudyEnums => "Enumeration types and their values",
            Operation::GetSearchAreas => "Search areas available to query parameters",
            Operation::GetApiVersion => "Registry API and data version",
        }
    }

    /// Operations that walk continuation tokens across several pages.
    pub fn is_aggregation(self) -> bool {
        matches!(
            self,
            Operation::GetTrialStatistics
                | Operation::GetEnrollmentDistribution
                | Operation::GetStudiesWithResults
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = GatewayError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let trimmed = name.trim();
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == trimmed)
            .ok_or_else(|| GatewayError::UnknownOperation { name: trimmed.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_round_trip_through_from_str() {
        for op in Operation::ALL {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
    }

    #[test]
    fn names_are_unique() {
        let names: HashSet<_> = Operation::ALL.iter().map(|op| op.as_str()).collect();
        assert_eq!(names.len(), Operation::ALL.len());
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = "search_everything".parse::<Operation>().unwrap_err();
        assert!(matches!(err, GatewayError::UnknownOperation { ref name } if name == "search_everything"));
    }

    #[test]
    fn serializes_as_tool_name() {
        let json = serde_json::to_string(&Operation::GetFieldSizeStats).unwrap();
        assert_eq!(json, "\"get_field_size_stats\"");
    }
}
