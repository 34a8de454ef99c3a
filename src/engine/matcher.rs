//! Query → rule selection.
//!
//! A rule is selected when it is enabled and its compiled pattern matches
//! anywhere in the query. Selected rules are ordered by descending priority;
//! the sort is stable, so equal priorities keep configuration order, which in
//! turn fixes how scorers compose downstream.
//!
//! Matching runs on `regex` automata and cannot backtrack, but a rule set can
//! still be large enough to be slow. The time spent is checked against a
//! budget after every evaluated pattern; going over it fails the whole call
//! rather than returning a partial (and therefore misleading) selection.

use super::compiled_rules::CompiledRules;
use super::metrics::MatchRun;
use crate::Rule;
use crate::error::EngineError;
use std::cmp::Reverse;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Select the rules of `rules` that apply to `query`.
///
/// `compiled` must have been built from `rules`.
pub(crate) fn match_indices(
    rules: &[Rule],
    compiled: &CompiledRules,
    query: &str,
    budget: Duration,
) -> Result<MatchRun, EngineError> {
    let start = Instant::now();
    let mut indices = Vec::new();
    let mut evaluated = 0;

    for entry in &compiled.entries {
        let Some(rule) = rules.get(entry.index) else { continue };
        if !rule.enabled {
            continue;
        }
        let Some(regex) = &entry.regex else { continue };

        evaluated += 1;
        if regex.is_match(query) {
            trace!(target: "cadence::matcher", rule_id = %rule.id, priority = rule.priority, "rule matched");
            indices.push(entry.index);
        }

        let elapsed = start.elapsed();
        if elapsed >= budget {
            return Err(EngineError::MatchBudgetExceeded { budget, elapsed, evaluated });
        }
    }

    indices.sort_by_key(|&idx| Reverse(rules[idx].priority));

    let elapsed = start.elapsed();
    debug!(target: "cadence::matcher", query, evaluated, matched = indices.len(), ?elapsed, "matched rules");
    Ok(MatchRun { indices, evaluated, elapsed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::DEFAULT_REGEX_SIZE_LIMIT;
    use crate::{Filter, FilterOperator, FilterOptimization, RuleAction};

    fn filter_rule(id: &str, pattern: &str, priority: u8, enabled: bool) -> Rule {
        rule! {
            id: id,
            pattern: pattern,
            priority: priority,
            enabled: enabled,
            action: RuleAction::FilterOptimization(FilterOptimization {
                auto_apply_filter: Filter {
                    field: "vocal_type".into(),
                    value: "instrumental".into(),
                    operator: FilterOperator::Equals,
                },
            }),
        }
    }

    fn matched_ids(rules: &[Rule], query: &str) -> Vec<String> {
        let compiled = CompiledRules::new(rules, DEFAULT_REGEX_SIZE_LIMIT);
        let run = match_indices(rules, &compiled, query, Duration::from_secs(5)).unwrap();
        run.indices.iter().map(|&i| rules[i].id.clone()).collect()
    }

    #[test]
    fn matches_case_insensitively_anywhere() {
        let rules = vec![filter_rule("rock", r"\bROCK\b", 50, true), filter_rule("jazz", "jazz", 50, true)];
        assert_eq!(matched_ids(&rules, "upbeat rock music"), vec!["rock"]);
        assert!(matched_ids(&rules, "rockabilly").is_empty());
    }

    #[test]
    fn disabled_rules_never_match() {
        let rules = vec![filter_rule("off", "rock", 90, false), filter_rule("on", "rock", 10, true)];
        assert_eq!(matched_ids(&rules, "rock"), vec!["on"]);
    }

    #[test]
    fn orders_by_priority_then_configuration_order() {
        let rules = vec![
            filter_rule("low", "rock", 10, true),
            filter_rule("mid-a", "rock", 50, true),
            filter_rule("high", "rock", 90, true),
            filter_rule("mid-b", "rock", 50, true),
        ];
        assert_eq!(matched_ids(&rules, "rock"), vec!["high", "mid-a", "mid-b", "low"]);
    }

    #[test]
    fn broken_patterns_are_skipped() {
        let rules = vec![filter_rule("broken", "(rock", 90, true), filter_rule("ok", "rock", 10, true)];
        assert_eq!(matched_ids(&rules, "rock"), vec!["ok"]);
    }

    #[test]
    fn empty_query_or_rules_is_not_an_error() {
        assert!(matched_ids(&[], "rock").is_empty());
        let rules = vec![filter_rule("rock", "rock", 50, true)];
        assert!(matched_ids(&rules, "").is_empty());
    }

    #[test]
    fn exceeding_the_budget_fails_the_call() {
        let rules = vec![filter_rule("rock", "rock", 50, true)];
        let compiled = CompiledRules::new(&rules, DEFAULT_REGEX_SIZE_LIMIT);
        let err = match_indices(&rules, &compiled, "rock", Duration::ZERO).unwrap_err();
        assert!(matches!(err, EngineError::MatchBudgetExceeded { evaluated: 1, .. }), "{err}");
    }
}
