//! Engine run metrics.
//!
//! Per-phase timings for one rerank call. They ride along on every
//! [`RerankOutcome`](crate::RerankOutcome) (collection is a handful of
//! `Instant::now()` calls) and are printed by the CLI report; they are not
//! part of the serialized outcome.

use std::time::Duration;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunMetrics {
    /// Total elapsed time for the call.
    pub total: Duration,
    /// Pattern matching, including the budget check. Zero when the caller
    /// supplied already-matched rules.
    pub matching: Duration,
    /// Facet/filter accumulation.
    pub pre_query: Duration,
    /// Score check + multiplicative scorers.
    pub scoring: Duration,
    /// Interleaving reorderers.
    pub reorder: Duration,
    /// Patterns actually tested against the query.
    pub rules_evaluated: usize,
    /// Rules that matched (or were supplied pre-matched).
    pub rules_matched: usize,
}

/// Matching result bundled with its timing.
#[derive(Debug, Clone, Default)]
pub struct MatchRun {
    /// Positions of the matched rules in the active set, in application order.
    pub indices: Vec<usize>,
    pub evaluated: usize,
    pub elapsed: Duration,
}
