//! Declarative search-result reranking.
//!
//! Rules pair a case-insensitive trigger pattern with one action. For a
//! query, the engine selects the matching rules (highest priority first),
//! returns the facets and filters the caller should add to its search, and
//! then reshapes the scored result list: multiplying relevance scores,
//! attenuating them by age, and interleaving the final order.
//!
//! ```
//! use cadence_rerank::{Context, Engine, MemorySource, Options, RuleDocument, Track};
//!
//! let doc = RuleDocument::from_json(r#"{
//!     "rules": [{
//!         "id": "rock-library",
//!         "type": "library_boost",
//!         "pattern": "\\brock\\b",
//!         "action": {"boost_libraries": [{"library_name": "Rock Library", "boost_factor": 2.0}]}
//!     }]
//! }"#).unwrap();
//! let engine = Engine::new(MemorySource::new(doc), Options::default());
//!
//! let tracks = vec![
//!     Track::new().with("id", 1).with("library_name", "Other").with("_relevance_score", 1.0),
//!     Track::new().with("id", 2).with("library_name", "Rock Library").with("_relevance_score", 0.8),
//! ];
//! let out = engine.rerank("upbeat ROCK", tracks, &Context::default()).unwrap();
//! assert_eq!(out.results[1].relevance_score(), Some(1.6));
//! assert_eq!(out.score_adjustments.len(), 1);
//! ```

extern crate self as cadence_rerank;

#[macro_use]
mod macros;
mod api;
pub mod dates;
mod engine;
mod error;
mod pattern;
mod rule;
mod rules;
mod store;
mod track;

pub use api::{
    Context, DEFAULT_MATCH_BUDGET, Engine, FacetGroup, Options, PreQueryPlan, RerankOutcome, apply_rules,
    apply_rules_with, match_rules, prepare_query, validate_pattern,
};
pub use engine::{AppliedRule, CompiledRule, CompiledRules, PhaseMask, RunMetrics, ScoreAdjustment};
pub use error::{
    ActionShapeError, ConfigError, EngineError, EngineInputError, FieldError, StoreError, ValidationErrors,
};
pub use pattern::{DEFAULT_REGEX_SIZE_LIMIT, MAX_PATTERN_LEN, PatternCheck, validate_pattern_with_limit};
pub use rule::{
    DEFAULT_DATE_FIELD, DEFAULT_PRIORITY, FacetMode, FeatureBoost, FieldHelp, Filter, FilterOperator,
    FilterOptimization, GenreSimplification, InterleaveFallback, LibraryBoost, LibraryBoostEntry, MAX_PRIORITY,
    RecencyDecay, RecencyInterleaving, Rule, RuleAction, RuleKind, RuleLifecycle, SubgenreInterleaving,
};
pub use store::{
    JsonFileSource, MemorySource, Revision, RuleDocument, RuleSnapshot, RuleSource, RuleStats, RuleStore, SaveMode,
    SaveReport, TypeStats,
};
pub use track::{ID_FIELD, LIBRARY_FIELD, SCORE_FIELD, Track};
