//! Audit records returned to clients for transparency.

use crate::{Rule, RuleKind};
use serde::{Deserialize, Serialize};

/// One score change made by one rule on one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreAdjustment {
    pub track_id: String,
    pub rule_id: String,
    pub reason: String,
    pub original_score: f64,
    pub new_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recency_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_months: Option<f64>,
}

/// A rule that matched and had an observable effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedRule {
    pub rule_id: String,
    #[serde(rename = "type")]
    pub kind: RuleKind,
    pub description: String,
    /// Adjustment records produced (scorers), tracks moved (reorderers), 0 for pre-query rules.
    pub affected_tracks: usize,
}

impl AppliedRule {
    pub(crate) fn new(rule: &Rule, affected_tracks: usize) -> Self {
        Self { rule_id: rule.id.clone(), kind: rule.kind(), description: rule.description.clone(), affected_tracks }
    }
}

/// Accumulator threaded through one pipeline run.
#[derive(Debug, Default)]
pub(crate) struct AuditLog {
    pub applied: Vec<AppliedRule>,
    pub adjustments: Vec<ScoreAdjustment>,
}

impl AuditLog {
    /// Record a pre-query rule that emitted facets or a filter.
    pub fn pre_query(&mut self, rule: &Rule) {
        self.applied.push(AppliedRule::new(rule, 0));
    }

    /// Record a scorer's adjustments; the rule is listed only if it produced any.
    pub fn scored(&mut self, rule: &Rule, adjustments: Vec<ScoreAdjustment>) -> usize {
        let count = adjustments.len();
        if count > 0 {
            self.applied.push(AppliedRule::new(rule, count));
            self.adjustments.extend(adjustments);
        }
        count
    }

    /// Record a reorderer; the rule is listed only if it moved something.
    pub fn reordered(&mut self, rule: &Rule, moved: usize) {
        if moved > 0 {
            self.applied.push(AppliedRule::new(rule, moved));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn adjustment_serializes_camel_case_and_skips_absent_fields() {
        let adj = ScoreAdjustment {
            track_id: "1".into(),
            rule_id: "rock".into(),
            reason: "library boost: Rock Library".into(),
            original_score: 1.0,
            new_score: 1.5,
            score_multiplier: Some(1.5),
            recency_factor: None,
            age_months: None,
        };
        assert_eq!(
            serde_json::to_value(&adj).unwrap(),
            json!({
                "trackId": "1",
                "ruleId": "rock",
                "reason": "library boost: Rock Library",
                "originalScore": 1.0,
                "newScore": 1.5,
                "scoreMultiplier": 1.5,
            })
        );
    }

    #[test]
    fn applied_rule_uses_type_key() {
        let applied = AppliedRule {
            rule_id: "r".into(),
            kind: RuleKind::FilterOptimization,
            description: "".into(),
            affected_tracks: 0,
        };
        let value = serde_json::to_value(&applied).unwrap();
        assert_eq!(value["type"], "filter_optimization");
        assert_eq!(value["affectedTracks"], 0);
    }
}
