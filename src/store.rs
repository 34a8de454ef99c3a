//! Versioned rule store.
//!
//! The store owns a [`RuleSource`] and serves immutable [`RuleSnapshot`]s.
//! Readers clone an `Arc` and keep using it for the whole call, so a single
//! match/apply never sees a mix of two rule sets.
//!
//! Refresh protocol:
//!
//! ```text
//! snapshot()
//!   ├─ revision unchanged ─────────────────────────────> current (fast path)
//!   └─ changed ─ lock refresh ─ re-check ─ load ─ ok ──> compile + swap
//!                                            └─ err ─> last-known-good (warn)
//!                                                      or ConfigError
//! ```
//!
//! A revision that failed to load is remembered, so a broken document is
//! parsed once, not on every request, until it changes again.
//!
//! Writes (create/update/toggle/disable/restore/delete) run under the same
//! lock: load the document, apply the edit, save it atomically, install the
//! result as the new snapshot.

#[path = "store/source.rs"]
mod source;

pub use source::{JsonFileSource, MemorySource, Revision, RuleDocument, RuleSource};

use crate::engine::CompiledRules;
use crate::error::{ConfigError, StoreError, ValidationErrors};
use crate::pattern::{DEFAULT_REGEX_SIZE_LIMIT, PatternCheck};
use crate::{Rule, RuleKind};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// An immutable, compiled view of one revision of the rule document.
#[derive(Debug)]
pub struct RuleSnapshot {
    /// Store-local counter, incremented on every install.
    pub version: u64,
    pub revision: Revision,
    pub rules: Vec<Rule>,
    pub disabled_rules: Vec<Rule>,
    /// Compiled patterns of `rules`, index-aligned.
    pub compiled: CompiledRules,
}

impl RuleSnapshot {
    fn new(version: u64, revision: Revision, doc: RuleDocument, size_limit: usize) -> Self {
        let compiled = CompiledRules::new(&doc.rules, size_limit);
        Self { version, revision, rules: doc.rules, disabled_rules: doc.disabled_rules, compiled }
    }

    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().chain(&self.disabled_rules).find(|r| r.id == id)
    }

    pub fn stats(&self) -> RuleStats {
        RuleStats::collect(&self.rules, &self.disabled_rules)
    }
}

/// Counts per rule type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeStats {
    pub total: usize,
    pub enabled: usize,
}

/// Rule counts across both sets. A rule is `enabled` when it is active and
/// its flag is set; everything else counts as `disabled`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleStats {
    pub total: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub by_type: BTreeMap<RuleKind, TypeStats>,
}

impl RuleStats {
    fn collect(active: &[Rule], disabled: &[Rule]) -> Self {
        let mut stats = RuleStats::default();
        let all = active.iter().map(|r| (r, r.enabled)).chain(disabled.iter().map(|r| (r, false)));
        for (rule, enabled) in all {
            let entry = stats.by_type.entry(rule.kind()).or_default();
            entry.total += 1;
            stats.total += 1;
            if enabled {
                entry.enabled += 1;
                stats.enabled += 1;
            } else {
                stats.disabled += 1;
            }
        }
        stats
    }
}

/// How create/update treat a valid pattern that failed the safety heuristic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SaveMode {
    /// Reject it as a `pattern` field error.
    #[default]
    Strict,
    /// Save it and report the warning.
    AllowUnsafe,
}

/// Result of a successful create/update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub rule_id: String,
    pub pattern: PatternCheck,
}

#[derive(Debug, Default)]
struct RefreshState {
    failed: Option<Revision>,
    installs: u64,
}

#[derive(Debug)]
pub struct RuleStore {
    source: Box<dyn RuleSource>,
    regex_size_limit: usize,
    current: RwLock<Option<Arc<RuleSnapshot>>>,
    refresh: Mutex<RefreshState>,
}

impl RuleStore {
    pub fn new(source: impl RuleSource + 'static) -> Self {
        Self::with_regex_size_limit(source, DEFAULT_REGEX_SIZE_LIMIT)
    }

    pub fn with_regex_size_limit(source: impl RuleSource + 'static, regex_size_limit: usize) -> Self {
        Self {
            source: Box::new(source),
            regex_size_limit,
            current: RwLock::new(None),
            refresh: Mutex::new(RefreshState::default()),
        }
    }

    fn current(&self) -> Option<Arc<RuleSnapshot>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The current snapshot, reloading first if the source changed.
    pub fn snapshot(&self) -> Result<Arc<RuleSnapshot>, ConfigError> {
        if let (Some(snap), Ok(revision)) = (self.current(), self.source.revision()) {
            if snap.revision == revision {
                return Ok(snap);
            }
        }

        let mut state = self.refresh.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.current();

        let revision = match self.source.revision() {
            Ok(revision) => revision,
            Err(err) => return last_known_good(current, err),
        };
        if let Some(snap) = &current {
            if snap.revision == revision {
                // Another reader reloaded while we waited.
                return Ok(snap.clone());
            }
            if state.failed == Some(revision) {
                return Ok(snap.clone());
            }
        }

        match self.source.load() {
            Ok(doc) => {
                state.failed = None;
                Ok(self.install(&mut state, revision, doc))
            }
            Err(err) => {
                state.failed = Some(revision);
                last_known_good(current, err)
            }
        }
    }

    fn install(&self, state: &mut RefreshState, revision: Revision, doc: RuleDocument) -> Arc<RuleSnapshot> {
        state.installs += 1;
        let snap = Arc::new(RuleSnapshot::new(state.installs, revision, doc, self.regex_size_limit));
        info!(
            target: "cadence::store",
            version = snap.version,
            active = snap.rules.len(),
            disabled = snap.disabled_rules.len(),
            "rule snapshot installed"
        );
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(snap.clone());
        snap
    }

    /// Load, edit, save and install, all under the refresh lock.
    fn mutate<T>(&self, edit: impl FnOnce(&mut RuleDocument) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let mut state = self.refresh.lock().unwrap_or_else(PoisonError::into_inner);
        let mut doc = self.source.load()?;
        let out = edit(&mut doc)?;
        doc.check()?;
        self.source.save(&doc)?;
        let revision = self.source.revision()?;
        state.failed = None;
        self.install(&mut state, revision, doc);
        Ok(out)
    }

    fn checked(&self, rule: &Rule, mode: SaveMode) -> Result<PatternCheck, ValidationErrors> {
        let check = rule.validate_with_limit(self.regex_size_limit)?;
        if mode == SaveMode::Strict && !check.safe {
            let mut errs = ValidationErrors::default();
            let reason = check.reason.clone().unwrap_or_default();
            errs.push("pattern", format!("unsafe pattern: {reason}"));
            return Err(errs);
        }
        Ok(check)
    }

    /// Validate and append `rule` to the active set.
    pub fn create_rule(&self, rule: Rule, mode: SaveMode) -> Result<SaveReport, StoreError> {
        let check = self.checked(&rule, mode)?;
        let rule_id = rule.id.clone();
        self.mutate(|doc| {
            if doc.contains(&rule.id) {
                let mut errs = ValidationErrors::default();
                errs.push("id", format!("a rule with id '{}' already exists", rule.id));
                return Err(errs.into());
            }
            doc.rules.push(Rule { lifecycle: Default::default(), ..rule });
            Ok(())
        })?;
        if !check.safe {
            warn!(target: "cadence::store", rule_id = %rule_id, reason = ?check.reason, "rule saved with an unsafe pattern");
        }
        debug!(target: "cadence::store", rule_id = %rule_id, "rule created");
        Ok(SaveReport { rule_id, pattern: check })
    }

    /// Replace the rule with the same id, wherever it lives. Position, set
    /// and lifecycle metadata are kept.
    pub fn update_rule(&self, rule: Rule, mode: SaveMode) -> Result<SaveReport, StoreError> {
        let check = self.checked(&rule, mode)?;
        let rule_id = rule.id.clone();
        self.mutate(|doc| {
            let slot = doc
                .rules
                .iter_mut()
                .chain(doc.disabled_rules.iter_mut())
                .find(|r| r.id == rule.id)
                .ok_or_else(|| StoreError::UnknownRule(rule.id.clone()))?;
            let lifecycle = std::mem::take(&mut slot.lifecycle);
            *slot = Rule { lifecycle, ..rule };
            Ok(())
        })?;
        debug!(target: "cadence::store", rule_id = %rule_id, "rule updated");
        Ok(SaveReport { rule_id, pattern: check })
    }

    /// Flip the `enabled` flag of an active rule.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<Rule, StoreError> {
        self.mutate(|doc| {
            let rule = active_mut(doc, id)?;
            rule.enabled = enabled;
            Ok(rule.clone())
        })
    }

    /// Move a rule from the active set to the end of the disabled set.
    pub fn disable_rule(&self, id: &str, reason: Option<String>) -> Result<Rule, StoreError> {
        self.mutate(|doc| {
            let pos = active_position(doc, id)?;
            let mut rule = doc.rules.remove(pos);
            rule.lifecycle.disabled_at = Some(Utc::now());
            rule.lifecycle.disabled_reason = reason;
            rule.lifecycle.restored_at = None;
            doc.disabled_rules.push(rule.clone());
            info!(target: "cadence::store", rule_id = id, "rule disabled");
            Ok(rule)
        })
    }

    /// Move a rule from the disabled set to the end of the active set.
    pub fn restore_rule(&self, id: &str) -> Result<Rule, StoreError> {
        self.mutate(|doc| {
            let pos = disabled_position(doc, id)?;
            let mut rule = doc.disabled_rules.remove(pos);
            rule.lifecycle.disabled_at = None;
            rule.lifecycle.disabled_reason = None;
            rule.lifecycle.restored_at = Some(Utc::now());
            doc.rules.push(rule.clone());
            info!(target: "cadence::store", rule_id = id, "rule restored");
            Ok(rule)
        })
    }

    /// Hard-delete a rule. Only disabled rules can be deleted.
    pub fn delete_rule(&self, id: &str) -> Result<Rule, StoreError> {
        self.mutate(|doc| {
            let pos = disabled_position(doc, id)?;
            info!(target: "cadence::store", rule_id = id, "rule deleted");
            Ok(doc.disabled_rules.remove(pos))
        })
    }

    pub fn rule(&self, id: &str) -> Result<Option<Rule>, ConfigError> {
        Ok(self.snapshot()?.rule(id).cloned())
    }

    pub fn rule_stats(&self) -> Result<RuleStats, ConfigError> {
        Ok(self.snapshot()?.stats())
    }
}

fn last_known_good(current: Option<Arc<RuleSnapshot>>, err: ConfigError) -> Result<Arc<RuleSnapshot>, ConfigError> {
    match current {
        Some(snap) => {
            warn!(target: "cadence::store", error = %err, version = snap.version, "rule document unavailable; serving last known good snapshot");
            Ok(snap)
        }
        None => Err(err),
    }
}

fn active_position(doc: &RuleDocument, id: &str) -> Result<usize, StoreError> {
    match doc.rules.iter().position(|r| r.id == id) {
        Some(pos) => Ok(pos),
        None if doc.disabled_rules.iter().any(|r| r.id == id) => Err(StoreError::NotActive(id.to_string())),
        None => Err(StoreError::UnknownRule(id.to_string())),
    }
}

fn disabled_position(doc: &RuleDocument, id: &str) -> Result<usize, StoreError> {
    match doc.disabled_rules.iter().position(|r| r.id == id) {
        Some(pos) => Ok(pos),
        None if doc.rules.iter().any(|r| r.id == id) => Err(StoreError::NotDisabled(id.to_string())),
        None => Err(StoreError::UnknownRule(id.to_string())),
    }
}

fn active_mut<'a>(doc: &'a mut RuleDocument, id: &str) -> Result<&'a mut Rule, StoreError> {
    let pos = active_position(doc, id)?;
    Ok(&mut doc.rules[pos])
}
