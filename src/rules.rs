//! Rule handlers, one module per pipeline phase.
//!
//! Dispatch is an exhaustive `match` over [`RuleAction`](crate::RuleAction)
//! in each module; adding an action variant fails to compile until every
//! phase has decided what to do with it.

#[path = "rules/pre_query.rs"]
pub(crate) mod pre_query;
#[path = "rules/reorder.rs"]
pub(crate) mod reorder;
#[path = "rules/scoring.rs"]
pub(crate) mod scoring;

#[cfg(test)]
#[path = "rules/tests.rs"]
mod tests;

/// Interleave pattern as slots: whitespace dropped, letters uppercased.
pub(crate) fn pattern_slots(pattern: &str) -> Vec<char> {
    pattern.chars().filter(|c| !c.is_whitespace()).map(|c| c.to_ascii_uppercase()).collect()
}
