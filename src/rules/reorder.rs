//! Result reorderers: recency and subgenre interleaving.
//!
//! Both work on positions. They return a permutation of `0..tracks.len()`
//! (every track appears exactly once) that the pipeline applies to the
//! working list, so no track is ever dropped by a reorder.

use super::pattern_slots;
use crate::dates::track_age_months;
use crate::{Context, InterleaveFallback, RecencyInterleaving, Rule, RuleAction, SubgenreInterleaving, Track};
use std::collections::{BTreeMap, VecDeque};

/// Compute the new order for one reorder rule, or `None` for other kinds.
pub(crate) fn order(rule: &Rule, tracks: &[Track], ctx: &Context) -> Option<Vec<usize>> {
    match &rule.action {
        RuleAction::RecencyInterleaving(action) => Some(recency_order(action, tracks, ctx)),
        RuleAction::SubgenreInterleaving(action) => Some(subgenre_order(action, tracks)),
        RuleAction::GenreSimplification(_)
        | RuleAction::LibraryBoost(_)
        | RuleAction::FeatureBoost(_)
        | RuleAction::RecencyDecay(_)
        | RuleAction::FilterOptimization(_) => None,
    }
}

/// Number of positions whose occupant changed.
pub(crate) fn moved(order: &[usize]) -> usize {
    order.iter().enumerate().filter(|(pos, idx)| pos != *idx).count()
}

fn recency_order(action: &RecencyInterleaving, tracks: &[Track], ctx: &Context) -> Vec<usize> {
    let recent_max = f64::from(action.recent_threshold_months);
    let vintage_max = f64::from(action.vintage_max_months);

    let mut recent = VecDeque::new();
    let mut vintage = VecDeque::new();
    let mut beyond = Vec::new();

    for (idx, track) in tracks.iter().enumerate() {
        match track_age_months(track, &action.date_field, ctx.reference_time) {
            Some(age) if age <= recent_max => recent.push_back(idx),
            Some(age) if age <= vintage_max => vintage.push_back(idx),
            _ => beyond.push(idx),
        }
    }

    let slots = pattern_slots(&action.pattern);
    let mut out = Vec::with_capacity(tracks.len());

    'walk: for _ in 0..action.repeat_count {
        for &slot in &slots {
            let (first, second) = if slot == 'R' { (&mut recent, &mut vintage) } else { (&mut vintage, &mut recent) };
            match first.pop_front().or_else(|| second.pop_front()) {
                Some(idx) => out.push(idx),
                None => break 'walk,
            }
        }
    }

    let mut leftovers: Vec<usize> = recent.into_iter().chain(vintage).collect();
    leftovers.sort_unstable();
    out.extend(leftovers);
    out.extend(beyond);
    out
}

fn subgenre_order(action: &SubgenreInterleaving, tracks: &[Track]) -> Vec<usize> {
    let mut groups: BTreeMap<char, VecDeque<usize>> = BTreeMap::new();
    for (idx, track) in tracks.iter().enumerate() {
        let letter = track.field_text(&action.attribute).and_then(|value| action.letter_for(&value));
        if let Some(letter) = letter {
            groups.entry(letter).or_default().push_back(idx);
        }
    }

    // Unconsumed tracks by descending score; stable, so ties keep incoming order.
    let mut by_score: Vec<usize> = (0..tracks.len()).collect();
    by_score.sort_by(|&a, &b| tracks[b].score_or_zero().total_cmp(&tracks[a].score_or_zero()));

    let mut consumed = vec![false; tracks.len()];
    let mut out = Vec::with_capacity(tracks.len());

    for slot in pattern_slots(&action.pattern) {
        if out.len() == tracks.len() {
            break;
        }
        let from_group = groups.get_mut(&slot).and_then(|group| pop_unconsumed(group, &consumed));
        let pick = match (from_group, action.fallback) {
            (Some(idx), _) => Some(idx),
            (None, InterleaveFallback::Relevance) => by_score.iter().copied().find(|&idx| !consumed[idx]),
            (None, InterleaveFallback::Skip) => None,
        };
        if let Some(idx) = pick {
            consumed[idx] = true;
            out.push(idx);
        }
    }

    out.extend(by_score.into_iter().filter(|&idx| !consumed[idx]));
    out
}

/// Pop the next index of `group` that a relevance fallback hasn't taken already.
fn pop_unconsumed(group: &mut VecDeque<usize>, consumed: &[bool]) -> Option<usize> {
    while let Some(idx) = group.pop_front() {
        if !consumed[idx] {
            return Some(idx);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moved_counts_changed_positions() {
        assert_eq!(moved(&[0, 1, 2]), 0);
        assert_eq!(moved(&[0, 2, 1]), 2);
        assert_eq!(moved(&[]), 0);
    }
}
