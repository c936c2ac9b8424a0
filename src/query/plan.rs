//! Declarative query plans: which arguments each operation takes and where they land.

use super::FilterKey;
use super::FilterKey as K;
use crate::Operation;

pub(crate) const PHASES: &[&str] = &["EARLY_PHASE1", "PHASE1", "PHASE2", "PHASE3", "PHASE4", "NA"];

pub(crate) const STATUSES: &[&str] = &[
    "ACTIVE_NOT_RECRUITING",
    "COMPLETED",
    "ENROLLING_BY_INVITATION",
    "NOT_YET_RECRUITING",
    "RECRUITING",
    "SUSPENDED",
    "TERMINATED",
    "WITHDRAWN",
    "AVAILABLE",
    "NO_LONGER_AVAILABLE",
    "TEMPORARILY_NOT_AVAILABLE",
    "APPROVED_FOR_MARKETING",
    "WITHHELD",
    "UNKNOWN",
];

const SEXES: &[&str] = &["ALL", "FEMALE", "MALE"];

const STD_AGES: &[&str] = &["CHILD", "ADULT", "OLDER_ADULT"];

const SPONSOR_CLASSES: &[&str] =
    &["NIH", "FED", "OTHER_GOV", "INDIV", "INDUSTRY", "NETWORK", "AMBIG", "OTHER", "UNKNOWN"];

const INTERVENTION_TYPES: &[&str] = &[
    "BEHAVIORAL",
    "BIOLOGICAL",
    "COMBINATION_PRODUCT",
    "DEVICE",
    "DIAGNOSTIC_TEST",
    "DIETARY_SUPPLEMENT",
    "DRUG",
    "GENETIC",
    "PROCEDURE",
    "RADIATION",
    "OTHER",
];

pub(crate) const FIELD_TYPES: &[&str] = &["ENUM", "STRING", "DATE", "INTEGER", "NUMBER", "BOOLEAN"];

/// How one argument is read and rendered.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ArgKind {
    Text,
    Choice(&'static [&'static str]),
    Choices(&'static [&'static str]),
    Flag,
    Date,
}

/// Argument-to-filter binding.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Binding {
    pub arg: &'static str,
    pub aliases: &'static [&'static str],
    pub key: FilterKey,
    pub kind: ArgKind,
    pub required: bool,
}

const fn bind(arg: &'static str, key: FilterKey, kind: ArgKind) -> Binding {
    Binding { arg, aliases: &[], key, kind, required: false }
}

const fn require(arg: &'static str, key: FilterKey) -> Binding {
    Binding { arg, aliases: &[], key, kind: ArgKind::Text, required: true }
}

const fn text(arg: &'static str, key: FilterKey) -> Binding {
    bind(arg, key, ArgKind::Text)
}

const fn date(arg: &'static str, aliases: &'static [&'static str], key: FilterKey) -> Binding {
    Binding { arg, aliases, key, kind: ArgKind::Date, required: false }
}

const CONDITION: Binding = text("condition", FilterKey::Condition);
const INTERVENTION: Binding = text("intervention", FilterKey::Intervention);
const PHASE: Binding = bind("phase", FilterKey::Phase, ArgKind::Choices(PHASES));
const RECRUITMENT_STATUS: Binding =
    bind("recruitmentStatus", FilterKey::OverallStatus, ArgKind::Choices(STATUSES));

/// Multi-argument hooks run after the plain bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Composite {
    /// `country`, `state`, `city`, `facilityName` joined into one location query; `distance`
    /// needs `city`.
    Location,
    /// At least one date bound.
    DateRange,
    /// Broadens the free-text term with orphan and rare designations.
    RareDisease,
    /// `ageRange` mapped to minimum and maximum age.
    Pediatric,
    /// `timelineType` mapped to a status set.
    Timeline,
    /// `exclusionKeywords` post-filter.
    Eligibility,
    /// `excludeCountry` and `minCountries` post-filters.
    International,
    /// `groupBy` and `filters`.
    Statistics,
}

/// Plan for operations answered by the `/studies` listing.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FilteredPlan {
    pub bindings: &'static [Binding],
    pub fixed: &'static [(FilterKey, &'static str)],
    pub composite: Option<Composite>,
    /// Accepts `nctId`, which must then stand alone.
    pub id_lookup: bool,
}

/// The small set of query shapes every operation funnels into.
#[derive(Debug, Clone, Copy)]
pub(crate) enum QueryShape {
    Filtered(FilteredPlan),
    /// Single-study lookup; `similar` adds the second search stage.
    ById { similar: bool },
    ByIds,
    Catalog,
    FieldStats { sizes: bool },
}

const fn filtered(bindings: &'static [Binding]) -> FilteredPlan {
    FilteredPlan { bindings, fixed: &[], composite: None, id_lookup: false }
}

const SEARCH_STUDIES: FilteredPlan = FilteredPlan {
    id_lookup: true,
    ..filtered(&[
        text("query", K::Term),
        CONDITION,
        INTERVENTION,
        text("location", K::Location),
        PHASE,
        bind("status", K::OverallStatus, ArgKind::Choices(STATUSES)),
        bind("sex", K::Sex, ArgKind::Choice(SEXES)),
        bind("age", K::StdAge, ArgKind::Choices(STD_AGES)),
    ])
};

const SEARCH_BY_LOCATION: FilteredPlan = FilteredPlan {
    composite: Some(Composite::Location),
    ..filtered(&[CONDITION, RECRUITMENT_STATUS])
};

const SEARCH_BY_CONDITION: FilteredPlan =
    filtered(&[require("condition", K::Condition), PHASE, RECRUITMENT_STATUS]);

const TRIAL_STATISTICS: FilteredPlan =
    FilteredPlan { composite: Some(Composite::Statistics), ..filtered(&[]) };

const SEARCH_BY_SPONSOR: FilteredPlan = filtered(&[
    require("sponsor", K::Sponsor),
    bind("sponsorType", K::LeadSponsorClass, ArgKind::Choice(SPONSOR_CLASSES)),
]);

const SEARCH_BY_INTERVENTION: FilteredPlan = filtered(&[
    require("intervention", K::Intervention),
    bind("interventionType", K::InterventionType, ArgKind::Choices(INTERVENTION_TYPES)),
    PHASE,
]);

const RECRUITING: FilteredPlan = FilteredPlan {
    fixed: &[(K::OverallStatus, "RECRUITING")],
    ..filtered(&[
        CONDITION,
        text("location", K::Location),
        bind("ageGroup", K::StdAge, ArgKind::Choices(STD_AGES)),
    ])
};

const DATE_RANGE: FilteredPlan = FilteredPlan {
    composite: Some(Composite::DateRange),
    ..filtered(&[
        date("startDateFrom", &["start"], K::StartDateFrom),
        date("startDateTo", &["end"], K::StartDateTo),
        date("completionDateFrom", &[], K::CompletionDateFrom),
        date("completionDateTo", &[], K::CompletionDateTo),
        CONDITION,
    ])
};

const WITH_RESULTS: FilteredPlan = FilteredPlan {
    fixed: &[(K::OverallStatus, "COMPLETED"), (K::HasResults, "true")],
    ..filtered(&[CONDITION, INTERVENTION, date("completedAfter", &[], K::CompletionDateFrom)])
};

const RARE_DISEASES: FilteredPlan = FilteredPlan {
    composite: Some(Composite::RareDisease),
    ..filtered(&[require("rareDisease", K::Condition), RECRUITMENT_STATUS])
};

const PEDIATRIC: FilteredPlan = FilteredPlan {
    fixed: &[(K::StdAge, "CHILD")],
    composite: Some(Composite::Pediatric),
    ..filtered(&[CONDITION, RECRUITMENT_STATUS])
};

const PRIMARY_OUTCOME: FilteredPlan =
    filtered(&[require("outcome", K::Outcome), CONDITION, PHASE]);

const ELIGIBILITY: FilteredPlan = FilteredPlan {
    composite: Some(Composite::Eligibility),
    ..filtered(&[
        text("minAge", K::MinimumAge),
        text("maxAge", K::MaximumAge),
        bind("sex", K::Sex, ArgKind::Choice(SEXES)),
        bind("healthyVolunteers", K::HealthyVolunteers, ArgKind::Flag),
        CONDITION,
        text("inclusionKeywords", K::Eligibility),
    ])
};

const TIMELINE: FilteredPlan = FilteredPlan {
    composite: Some(Composite::Timeline),
    ..filtered(&[CONDITION, text("sponsor", K::Sponsor), PHASE])
};

const INTERNATIONAL: FilteredPlan = FilteredPlan {
    composite: Some(Composite::International),
    ..filtered(&[CONDITION, text("includeCountry", K::Location), PHASE])
};

const ENROLLMENT: FilteredPlan = filtered(&[
    CONDITION,
    INTERVENTION,
    PHASE,
    bind("status", K::OverallStatus, ArgKind::Choices(STATUSES)),
]);

pub(crate) fn shape(operation: Operation) -> QueryShape {
    use Operation as Op;

    let plan = match operation {
        Op::SearchStudies => SEARCH_STUDIES,
        Op::SearchByLocation => SEARCH_BY_LOCATION,
        Op::SearchByCondition => SEARCH_BY_CONDITION,
        Op::GetTrialStatistics => TRIAL_STATISTICS,
        Op::SearchBySponsor => SEARCH_BY_SPONSOR,
        Op::SearchByIntervention => SEARCH_BY_INTERVENTION,
        Op::GetRecruitingStudies => RECRUITING,
        Op::SearchByDateRange => DATE_RANGE,
        Op::GetStudiesWithResults => WITH_RESULTS,
        Op::SearchRareDiseases => RARE_DISEASES,
        Op::GetPediatricStudies => PEDIATRIC,
        Op::SearchByPrimaryOutcome => PRIMARY_OUTCOME,
        Op::SearchByEligibilityCriteria => ELIGIBILITY,
        Op::GetStudyTimeline => TIMELINE,
        Op::SearchInternationalStudies => INTERNATIONAL,
        Op::GetEnrollmentDistribution => ENROLLMENT,
        Op::GetStudyDetails => return QueryShape::ById { similar: false },
        Op::GetSimilarStudies => return QueryShape::ById { similar: true },
        Op::SearchByNctIds => return QueryShape::ByIds,
        Op::GetFieldValueStats => return QueryShape::FieldStats { sizes: false },
        Op::GetFieldSizeStats => return QueryShape::FieldStats { sizes: true },
        Op::ListStudyEnums | Op::GetSearchAreas | Op::GetApiVersion => return QueryShape::Catalog,
    };
    QueryShape::Filtered(plan)
}

/// `ageRange` values and the minimum/maximum age they select.
pub(crate) const AGE_RANGES: &[&str] = &["INFANT", "CHILD", "ADOLESCENT"];

pub(crate) fn age_bounds(range: &str) -> Option<(&'static str, &'static str)> {
    match range {
        "INFANT" => Some(("0 Years", "2 Years")),
        "CHILD" => Some(("2 Years", "12 Years")),
        "ADOLESCENT" => Some(("12 Years", "18 Years")),
        _ => None,
    }
}

pub(crate) const TIMELINE_TYPES: &[&str] = &["CURRENT", "COMPLETED", "UPCOMING", "ALL"];

/// Status filter for a timeline type; `ALL` filters nothing.
pub(crate) fn timeline_statuses(kind: &str) -> Option<&'static str> {
    match kind {
        "CURRENT" => Some("RECRUITING,NOT_YET_RECRUITING,ACTIVE_NOT_RECRUITING"),
        "COMPLETED" => Some("COMPLETED"),
        "UPCOMING" => Some("NOT_YET_RECRUITING"),
        _ => None,
    }
}
