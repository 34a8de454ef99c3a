//! Matching and rule-application engine.
//!
//! This module is the internal core behind [`crate::api`]. It is split into
//! focused submodules under `src/engine/`.
//!
//! ## How the parts work together
//!
//! ```text
//! rules (snapshot) ──┐
//!                    │  CompiledRules::new          (compiled_rules.rs)
//!                    └──────────────┬──────────────
//!                                   │
//! query ── match_indices ───────────┤ enabled + pattern hit,
//!          (matcher.rs)             │ priority desc, stable
//!                                   v
//!                         Pipeline::run (pipeline.rs)
//!                           - pre-query: facets, filters
//!                           - scoring: multiply scores
//!                           - reorder: interleave
//!                           - audit (audit.rs)
//!                                   │
//!                                   v
//!                             RerankOutcome
//! ```
//!
//! ## Responsibilities by module
//!
//! - `compiled_rules.rs`: compiles rule patterns once per rule set; `PhaseMask`
//!   maps rule kinds to phases.
//! - `matcher.rs`: selects and orders the rules for a query under a time budget.
//! - `pipeline.rs`: drives matched rules through the phases; the handlers
//!   themselves live in `src/rules/`.
//! - `audit.rs`: `AppliedRule` / `ScoreAdjustment` records.
//! - `metrics.rs`: per-phase timings.
//!
//! ## Debugging
//!
//! Set `RUST_LOG=cadence=debug` (or `trace` for per-rule matches) to see
//! matching and application events.

#[path = "engine/audit.rs"]
mod audit;
#[path = "engine/compiled_rules.rs"]
mod compiled_rules;
#[path = "engine/matcher.rs"]
mod matcher;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/pipeline.rs"]
mod pipeline;

pub(crate) use audit::AuditLog;
pub use audit::{AppliedRule, ScoreAdjustment};
pub use compiled_rules::{CompiledRule, CompiledRules, PhaseMask};
pub(crate) use matcher::match_indices;
pub use metrics::RunMetrics;
pub(crate) use pipeline::Pipeline;
