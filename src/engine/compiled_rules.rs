//! Rule compilation and indexing.
//!
//! This module holds the *static* side of the engine: everything derived from
//! a rule list once, so that each query only pays for matching.
//!
//! A run is split in two phases:
//!
//! 1. **Compile rules** (this module): compile every pattern
//!    case-insensitively under the configured size limit. `PhaseMask` maps a
//!    rule kind to the pipeline phases it participates in.
//! 2. **Run** (see `matcher.rs` and `pipeline.rs`): test patterns against the
//!    query, then drive the matched rules through pre-query, scoring and
//!    reorder phases.
//!
//! ## Invariants
//!
//! - `CompiledRule::index` is a position in the rule slice the index was built
//!   from. `CompiledRules` is only ever used together with that slice (the
//!   store keeps both inside one `RuleSnapshot`).
//! - A rule whose pattern fails to compile is kept with `regex: None` and
//!   never matches.

use crate::pattern::compile_pattern;
use crate::{Rule, RuleKind};
use regex::Regex;
use tracing::warn;

bitflags::bitflags! {
    /// Pipeline phases a rule takes part in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PhaseMask: u8 {
        /// Shapes the search call (facets, filters); runs before tracks exist.
        const PRE_QUERY = 1 << 0;
        /// Multiplies `_relevance_score`.
        const SCORING   = 1 << 1;
        /// Replaces the working list with a reordered copy.
        const REORDER   = 1 << 2;
        /// Reads scores to order tracks without changing them.
        const READS_SCORE = 1 << 3;
    }
}

impl PhaseMask {
    pub fn for_kind(kind: RuleKind) -> Self {
        match kind {
            RuleKind::GenreSimplification | RuleKind::FilterOptimization => PhaseMask::PRE_QUERY,
            RuleKind::LibraryBoost | RuleKind::FeatureBoost | RuleKind::RecencyDecay => {
                PhaseMask::SCORING | PhaseMask::READS_SCORE
            }
            RuleKind::RecencyInterleaving => PhaseMask::REORDER,
            RuleKind::SubgenreInterleaving => PhaseMask::REORDER | PhaseMask::READS_SCORE,
        }
    }

    /// Union of the phases of `rules`.
    pub fn of<'a>(rules: impl IntoIterator<Item = &'a Rule>) -> Self {
        rules.into_iter().fold(PhaseMask::empty(), |acc, rule| acc | PhaseMask::for_kind(rule.kind()))
    }
}

/// One rule's compiled pattern.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub index: usize,
    pub regex: Option<Regex>,
}

/// Pre-compiled rule set.
#[derive(Debug, Clone, Default)]
pub struct CompiledRules {
    pub entries: Vec<CompiledRule>,
}

impl CompiledRules {
    /// Compile every rule in `rules`. Disabled rules are compiled too, so
    /// toggling `enabled` never needs a recompile of the pattern set.
    pub fn new(rules: &[Rule], size_limit: usize) -> Self {
        let entries = rules
            .iter()
            .enumerate()
            .map(|(index, rule)| {
                let regex = match compile_pattern(&rule.pattern, size_limit) {
                    Ok(regex) => Some(regex),
                    Err(err) => {
                        warn!(target: "cadence::compile", rule_id = %rule.id, error = %err, "rule pattern does not compile; rule will never match");
                        None
                    }
                };
                CompiledRule { index, regex }
            })
            .collect();

        CompiledRules { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
