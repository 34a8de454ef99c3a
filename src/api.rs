use crate::engine::{self, CompiledRules, Pipeline, RunMetrics};
use crate::error::{EngineError, EngineInputError};
use crate::pattern::{DEFAULT_REGEX_SIZE_LIMIT, PatternCheck, validate_pattern_with_limit};
use crate::store::{RuleSource, RuleStats, RuleStore};
use crate::{AppliedRule, FacetMode, Filter, Rule, ScoreAdjustment, Track};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::{Duration, Instant};

/// Default time allowed for matching one query against the rule set.
pub const DEFAULT_MATCH_BUDGET: Duration = Duration::from_millis(250);

/// Evaluation context.
///
/// Holds the reference time track ages are measured against.
#[derive(Debug, Clone)]
pub struct Context {
    pub reference_time: NaiveDateTime,
}

impl Default for Context {
    fn default() -> Self {
        if cfg!(test) {
            let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
            let time = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
            Self { reference_time: NaiveDateTime::new(date, time) }
        } else {
            Self { reference_time: Local::now().naive_local() }
        }
    }
}

/// Engine tuning.
///
/// Deserializable so hosts can keep it next to their own configuration:
///
/// ```
/// let opts: cadence_rerank::Options = serde_json::from_str(r#"{"match_budget_ms": 50}"#).unwrap();
/// assert_eq!(opts.match_budget, std::time::Duration::from_millis(50));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Matching a query fails with [`EngineError::MatchBudgetExceeded`] past this.
    #[serde(rename = "match_budget_ms", deserialize_with = "duration_from_millis")]
    pub match_budget: Duration,
    /// Compiled-size limit for each rule pattern, in bytes.
    pub regex_size_limit: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self { match_budget: DEFAULT_MATCH_BUDGET, regex_size_limit: DEFAULT_REGEX_SIZE_LIMIT }
    }
}

fn duration_from_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

/// Facets contributed by one genre-simplification rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetGroup {
    pub rule_id: String,
    /// `expand` ORs the facets into the search, `restrict` ANDs them.
    pub mode: FacetMode,
    pub facets: Vec<String>,
}

/// What the caller should add to its search before running it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreQueryPlan {
    pub expanded_facets: Vec<String>,
    pub facet_groups: Vec<FacetGroup>,
    pub auto_filters: Vec<Filter>,
    pub applied_rules: Vec<AppliedRule>,
}

/// Result of [`apply_rules`] and [`Engine::rerank`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RerankOutcome {
    pub results: Vec<Track>,
    pub applied_rules: Vec<AppliedRule>,
    pub score_adjustments: Vec<ScoreAdjustment>,
    pub expanded_facets: Vec<String>,
    pub facet_groups: Vec<FacetGroup>,
    pub auto_filters: Vec<Filter>,
    #[serde(skip)]
    pub metrics: RunMetrics,
}

/// Check a pattern for validity and backtracking risk.
///
/// ```
/// let check = cadence_rerank::validate_pattern("(a+)+");
/// assert!(check.valid && !check.safe);
/// ```
pub fn validate_pattern(pattern: &str) -> PatternCheck {
    crate::pattern::validate_pattern(pattern)
}

/// Select the enabled rules of `rules` whose pattern matches `query`,
/// highest priority first.
///
/// Compiles the patterns on every call; [`Engine::match_rules`] reuses the
/// compiled rule set of the current snapshot instead.
pub fn match_rules(query: &str, rules: &[Rule], options: &Options) -> Result<Vec<Rule>, EngineError> {
    let compiled = CompiledRules::new(rules, options.regex_size_limit);
    let run = engine::match_indices(rules, &compiled, query, options.match_budget)?;
    Ok(run.indices.into_iter().map(|idx| rules[idx].clone()).collect())
}

/// Facets and filters from already-matched `rules`, before any search has run.
pub fn prepare_query(rules: &[Rule]) -> PreQueryPlan {
    let (mut plan, applied) = Pipeline::new(rules.iter().collect()).prepare_query();
    plan.applied_rules = applied;
    plan
}

/// Apply already-matched `rules` (in the given order) to `tracks` using a default [`Context`].
///
/// # Example
/// ```
/// use cadence_rerank::{FeatureBoost, RuleAction, Track, apply_rules, rule};
///
/// let stems = rule! {
///     id: "stems",
///     pattern: "stems",
///     action: RuleAction::FeatureBoost(FeatureBoost {
///         boost_field: "has_stems".into(),
///         boost_value: "true".into(),
///         boost_factor: 2.0,
///     }),
/// };
/// let tracks = vec![Track::new().with("id", 1).with("has_stems", "true").with("_relevance_score", 1.0)];
///
/// let out = apply_rules(tracks, &[stems], "stems please").unwrap();
/// assert_eq!(out.results[0].relevance_score(), Some(2.0));
/// ```
pub fn apply_rules(tracks: Vec<Track>, rules: &[Rule], query: &str) -> Result<RerankOutcome, EngineInputError> {
    apply_rules_with(tracks, rules, query, &Context::default())
}

/// Apply already-matched `rules` to `tracks` with an explicit `context`.
///
/// Use this when ages must be measured against a fixed reference time.
pub fn apply_rules_with(
    tracks: Vec<Track>,
    rules: &[Rule],
    query: &str,
    context: &Context,
) -> Result<RerankOutcome, EngineInputError> {
    Pipeline::new(rules.iter().collect()).run(tracks, query, context)
}

/// Rule store + options: the entry point for hosts that keep rules in a document.
#[derive(Debug)]
pub struct Engine {
    store: RuleStore,
    options: Options,
}

impl Engine {
    pub fn new(source: impl RuleSource + 'static, options: Options) -> Self {
        let store = RuleStore::with_regex_size_limit(source, options.regex_size_limit);
        Self { store, options }
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn match_rules(&self, query: &str) -> Result<Vec<Rule>, EngineError> {
        let snapshot = self.store.snapshot()?;
        let run = engine::match_indices(&snapshot.rules, &snapshot.compiled, query, self.options.match_budget)?;
        Ok(run.indices.into_iter().map(|idx| snapshot.rules[idx].clone()).collect())
    }

    /// Match `query` and return the pre-search plan.
    pub fn prepare_query(&self, query: &str) -> Result<PreQueryPlan, EngineError> {
        let matched = self.match_rules(query)?;
        Ok(prepare_query(&matched))
    }

    /// Apply rules the caller matched earlier (e.g. before running its search).
    pub fn apply_rules(
        &self,
        tracks: Vec<Track>,
        rules: &[Rule],
        query: &str,
        context: &Context,
    ) -> Result<RerankOutcome, EngineError> {
        Ok(apply_rules_with(tracks, rules, query, context)?)
    }

    /// Match and apply in one call, against a single snapshot.
    pub fn rerank(&self, query: &str, tracks: Vec<Track>, context: &Context) -> Result<RerankOutcome, EngineError> {
        let start = Instant::now();
        let snapshot = self.store.snapshot()?;
        let run = engine::match_indices(&snapshot.rules, &snapshot.compiled, query, self.options.match_budget)?;

        let matched: Vec<&Rule> = run.indices.iter().map(|&idx| &snapshot.rules[idx]).collect();
        let mut outcome = Pipeline::new(matched).run(tracks, query, context)?;

        outcome.metrics.matching = run.elapsed;
        outcome.metrics.rules_evaluated = run.evaluated;
        outcome.metrics.total = start.elapsed();
        Ok(outcome)
    }

    pub fn rule_stats(&self) -> Result<RuleStats, EngineError> {
        Ok(self.store.rule_stats()?)
    }

    pub fn validate_pattern(&self, pattern: &str) -> PatternCheck {
        validate_pattern_with_limit(pattern, self.options.regex_size_limit)
    }
}
