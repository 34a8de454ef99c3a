//! Handlers that shape the search call: facet expansion and filter injection.

use crate::engine::AuditLog;
use crate::{FacetGroup, PreQueryPlan, Rule, RuleAction};

/// Accumulate facets and filters from `rules`, in the given order.
///
/// Facets are concatenated without deduplication. Rules of other kinds are ignored.
pub(crate) fn plan(rules: &[&Rule], audit: &mut AuditLog) -> PreQueryPlan {
    let mut plan = PreQueryPlan::default();

    for rule in rules {
        match &rule.action {
            RuleAction::GenreSimplification(action) => {
                if action.auto_apply_facets.is_empty() {
                    continue;
                }
                plan.expanded_facets.extend(action.auto_apply_facets.iter().cloned());
                plan.facet_groups.push(FacetGroup {
                    rule_id: rule.id.clone(),
                    mode: action.mode,
                    facets: action.auto_apply_facets.clone(),
                });
                audit.pre_query(rule);
            }
            RuleAction::FilterOptimization(action) => {
                plan.auto_filters.push(action.auto_apply_filter.clone());
                audit.pre_query(rule);
            }
            RuleAction::LibraryBoost(_)
            | RuleAction::FeatureBoost(_)
            | RuleAction::RecencyDecay(_)
            | RuleAction::RecencyInterleaving(_)
            | RuleAction::SubgenreInterleaving(_) => {}
        }
    }

    plan
}
