//! Phase driver.
//!
//! A `Pipeline` takes already-matched rules (in application order) and runs
//! them through three phases:
//!
//! ```text
//! (1) pre-query   genre_simplification, filter_optimization -> facets, filters
//! (2) scoring     library_boost, feature_boost, recency_decay -> scores (in place)
//! (3) reorder     recency_interleaving, subgenre_interleaving -> new order
//! ```
//!
//! Within a phase, rules apply in the order given, so scorers compose
//! multiplicatively in priority order and each reorderer re-derives its
//! buckets from the previous one's output.
//!
//! The pipeline owns no state between calls: `run` takes the track list by
//! value and returns the transformed list, which is what makes repeated calls
//! on copies of the same input produce identical output.

use super::audit::AuditLog;
use super::compiled_rules::PhaseMask;
use super::metrics::RunMetrics;
use crate::error::EngineInputError;
use crate::rules::{pre_query, reorder, scoring};
use crate::{AppliedRule, Context, PreQueryPlan, RerankOutcome, Rule, Track};
use std::time::Instant;
use tracing::debug;

#[derive(Debug)]
pub(crate) struct Pipeline<'a> {
    rules: Vec<&'a Rule>,
    phases: PhaseMask,
}

impl<'a> Pipeline<'a> {
    pub fn new(rules: Vec<&'a Rule>) -> Self {
        let phases = PhaseMask::of(rules.iter().copied());
        Self { rules, phases }
    }

    /// Phase (1) alone, for callers that haven't searched yet.
    pub fn prepare_query(&self) -> (PreQueryPlan, Vec<AppliedRule>) {
        let mut audit = AuditLog::default();
        let plan = pre_query::plan(&self.rules, &mut audit);
        (plan, audit.applied)
    }

    /// Run every phase over `tracks`.
    pub fn run(&self, mut tracks: Vec<Track>, query: &str, ctx: &Context) -> Result<RerankOutcome, EngineInputError> {
        let start = Instant::now();
        let mut metrics = RunMetrics { rules_matched: self.rules.len(), ..RunMetrics::default() };
        let mut audit = AuditLog::default();

        let t = Instant::now();
        let plan = pre_query::plan(&self.rules, &mut audit);
        metrics.pre_query = t.elapsed();

        let t = Instant::now();
        if self.phases.contains(PhaseMask::READS_SCORE) {
            check_scores(&tracks)?;
        }
        if self.phases.contains(PhaseMask::SCORING) {
            for rule in self.in_phase(PhaseMask::SCORING) {
                let adjustments = scoring::apply(rule, &mut tracks, ctx);
                let count = audit.scored(rule, adjustments);
                debug!(target: "cadence::pipeline", query, rule_id = %rule.id, kind = %rule.kind(), adjusted = count, "scoring rule applied");
            }
        }
        metrics.scoring = t.elapsed();

        let t = Instant::now();
        if self.phases.contains(PhaseMask::REORDER) {
            for rule in self.in_phase(PhaseMask::REORDER) {
                let Some(order) = reorder::order(rule, &tracks, ctx) else { continue };
                let moved = reorder::moved(&order);
                if moved > 0 {
                    tracks = apply_order(tracks, &order);
                }
                audit.reordered(rule, moved);
                debug!(target: "cadence::pipeline", query, rule_id = %rule.id, kind = %rule.kind(), moved, "reorder rule applied");
            }
        }
        metrics.reorder = t.elapsed();
        metrics.total = start.elapsed();

        Ok(RerankOutcome {
            results: tracks,
            applied_rules: audit.applied,
            score_adjustments: audit.adjustments,
            expanded_facets: plan.expanded_facets,
            facet_groups: plan.facet_groups,
            auto_filters: plan.auto_filters,
            metrics,
        })
    }

    fn in_phase(&self, phase: PhaseMask) -> impl Iterator<Item = &'a Rule> + '_ {
        self.rules.iter().copied().filter(move |rule| PhaseMask::for_kind(rule.kind()).contains(phase))
    }
}

/// Every track must carry a numeric `_relevance_score` before scores are read.
fn check_scores(tracks: &[Track]) -> Result<(), EngineInputError> {
    match tracks.iter().position(|track| track.relevance_score().is_none()) {
        Some(index) => Err(EngineInputError::MissingScore { index, track_id: tracks[index].id() }),
        None => Ok(()),
    }
}

/// Rearrange `tracks` so that position `i` holds `tracks[order[i]]`.
fn apply_order(tracks: Vec<Track>, order: &[usize]) -> Vec<Track> {
    let mut slots: Vec<Option<Track>> = tracks.into_iter().map(Some).collect();
    order.iter().filter_map(|&idx| slots.get_mut(idx).and_then(Option::take)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_order_permutes() {
        let tracks: Vec<Track> = (0..3).map(|i| Track::new().with("id", i)).collect();
        let ids: Vec<String> = apply_order(tracks, &[2, 0, 1]).iter().map(Track::id).collect();
        assert_eq!(ids, vec!["2", "0", "1"]);
    }

    #[test]
    fn check_scores_reports_first_unscored_track() {
        let tracks = vec![
            Track::new().with("id", "a").with("_relevance_score", 1.0),
            Track::new().with("id", "b").with("_relevance_score", "high"),
        ];
        assert_eq!(check_scores(&tracks).unwrap_err(), EngineInputError::MissingScore {
            index: 1,
            track_id: "b".into()
        });
        assert!(check_scores(&[]).is_ok());
    }
}
