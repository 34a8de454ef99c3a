//! Post-search scorers: library boost, feature boost, recency decay.
//!
//! Each scorer multiplies `_relevance_score` in place and returns one
//! [`ScoreAdjustment`] per change it made. Several scoring rules compose
//! multiplicatively in the order the pipeline calls them.

use crate::dates::track_age_months;
use crate::{Context, FeatureBoost, LibraryBoost, RecencyDecay, Rule, RuleAction, ScoreAdjustment, Track};
use tracing::debug;

/// Apply one scoring rule to `tracks`. Non-scoring rules are a no-op.
pub(crate) fn apply(rule: &Rule, tracks: &mut [Track], ctx: &Context) -> Vec<ScoreAdjustment> {
    match &rule.action {
        RuleAction::LibraryBoost(action) => library_boost(rule, action, tracks),
        RuleAction::FeatureBoost(action) => feature_boost(rule, action, tracks),
        RuleAction::RecencyDecay(action) => recency_decay(rule, action, tracks, ctx),
        RuleAction::GenreSimplification(_)
        | RuleAction::FilterOptimization(_)
        | RuleAction::RecencyInterleaving(_)
        | RuleAction::SubgenreInterleaving(_) => Vec::new(),
    }
}

fn multiply(rule: &Rule, track: &mut Track, factor: f64, reason: String) -> Option<ScoreAdjustment> {
    let original = track.relevance_score()?;
    let new_score = original * factor;
    track.set_relevance_score(new_score);
    Some(ScoreAdjustment {
        track_id: track.id(),
        rule_id: rule.id.clone(),
        reason,
        original_score: original,
        new_score,
        score_multiplier: Some(factor),
        recency_factor: None,
        age_months: None,
    })
}

fn library_boost(rule: &Rule, action: &LibraryBoost, tracks: &mut [Track]) -> Vec<ScoreAdjustment> {
    let mut out = Vec::new();
    for entry in &action.boost_libraries {
        for track in tracks.iter_mut() {
            if track.library_name() != Some(entry.library_name.as_str()) {
                continue;
            }
            let reason = format!("library boost: {}", entry.library_name);
            out.extend(multiply(rule, track, entry.boost_factor, reason));
        }
    }
    out
}

fn feature_boost(rule: &Rule, action: &FeatureBoost, tracks: &mut [Track]) -> Vec<ScoreAdjustment> {
    let mut out = Vec::new();
    for track in tracks.iter_mut() {
        let hit = track.field_text(&action.boost_field).is_some_and(|value| value == action.boost_value);
        if !hit {
            continue;
        }
        let reason = format!("feature boost: {}={}", action.boost_field, action.boost_value);
        out.extend(multiply(rule, track, action.boost_factor, reason));
    }
    out
}

/// Logarithmic decay: 1.0 at age 0, `horizon_threshold` at the horizon,
/// floored at `min_factor`.
pub(crate) fn decay_factor(age_months: f64, action: &RecencyDecay) -> f64 {
    let horizon = f64::from(action.horizon_months.max(1));
    let curve = 1.0 - (1.0 - action.horizon_threshold) * (1.0 + age_months.max(0.0) / horizon).ln() / 2f64.ln();
    // Unvalidated rules may carry min_factor > 1; `clamp` would panic on them.
    curve.max(action.min_factor).min(1.0)
}

fn recency_decay(rule: &Rule, action: &RecencyDecay, tracks: &mut [Track], ctx: &Context) -> Vec<ScoreAdjustment> {
    let mut out = Vec::new();
    for track in tracks.iter_mut() {
        let Some(age) = track_age_months(track, &action.date_field, ctx.reference_time) else {
            debug!(target: "cadence::scoring", rule_id = %rule.id, track_id = %track.id(), field = %action.date_field, "no usable release date; decay skipped");
            continue;
        };
        let Some(original) = track.relevance_score() else { continue };

        let factor = decay_factor(age, action);
        let new_score = original * factor;
        track.set_relevance_score(new_score);
        out.push(ScoreAdjustment {
            track_id: track.id(),
            rule_id: rule.id.clone(),
            reason: format!("recency decay: {age:.1} months old"),
            original_score: original,
            new_score,
            score_multiplier: None,
            recency_factor: Some(factor),
            age_months: Some(age),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_DATE_FIELD;

    fn decay(horizon_months: u32, horizon_threshold: f64, min_factor: f64) -> RecencyDecay {
        RecencyDecay { horizon_months, horizon_threshold, min_factor, date_field: DEFAULT_DATE_FIELD.into() }
    }

    #[test]
    fn decay_curve_is_anchored_at_zero_and_horizon() {
        let action = decay(24, 0.5, 0.1);
        assert_eq!(decay_factor(0.0, &action), 1.0);
        assert!((decay_factor(24.0, &action) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn decay_curve_is_monotone_and_floored() {
        let action = decay(12, 0.7, 0.4);
        let mut previous = 1.0;
        for age in [1.0, 6.0, 12.0, 36.0, 120.0, 1200.0] {
            let factor = decay_factor(age, &action);
            assert!(factor <= previous, "age {age}: {factor} > {previous}");
            assert!(factor >= 0.4);
            previous = factor;
        }
        assert_eq!(decay_factor(1_000_000.0, &action), 0.4);
    }

    #[test]
    fn floor_above_one_caps_at_one() {
        let action = decay(12, 0.5, 1.5);
        assert_eq!(decay_factor(0.0, &action), 1.0);
        assert_eq!(decay_factor(120.0, &action), 1.0);
    }

    #[test]
    fn negative_age_counts_as_new() {
        assert_eq!(decay_factor(-5.0, &decay(12, 0.5, 0.0)), 1.0);
    }
}
