//! Rule document transports.

use crate::Rule;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;

/// The persisted rule configuration: active and disabled (soft-deleted) rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleDocument {
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub disabled_rules: Vec<Rule>,
}

impl RuleDocument {
    /// Parse a JSON document and [`check`](Self::check) it.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let doc: RuleDocument = serde_json::from_str(text)?;
        doc.check()?;
        Ok(doc)
    }

    /// Ids must be unique across both sets and every rule must pass
    /// [`Rule::validate`]. Unsafe-but-valid patterns are accepted.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.check_unique_ids()?;
        for rule in self.rules.iter().chain(&self.disabled_rules) {
            rule.validate().map_err(|errors| ConfigError::InvalidRule { id: rule.id.clone(), errors })?;
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn check_unique_ids(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for rule in self.rules.iter().chain(&self.disabled_rules) {
            if !seen.insert(rule.id.as_str()) {
                return Err(ConfigError::DuplicateId(rule.id.clone()));
            }
        }
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rules.iter().chain(&self.disabled_rules).any(|r| r.id == id)
    }
}

/// Staleness signal of a [`RuleSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revision {
    /// The backing document does not exist (yet).
    Missing,
    /// File modification time.
    Mtime(SystemTime),
    /// Explicit version counter.
    Version(u64),
}

/// Load-all / save-all storage for the rule document.
pub trait RuleSource: Send + Sync + fmt::Debug {
    fn load(&self) -> Result<RuleDocument, ConfigError>;

    /// Replace the whole document atomically.
    fn save(&self, doc: &RuleDocument) -> Result<(), ConfigError>;

    /// Cheap check used to decide whether `load` is needed.
    fn revision(&self) -> Result<Revision, ConfigError>;
}

impl<S: RuleSource + ?Sized> RuleSource for std::sync::Arc<S> {
    fn load(&self) -> Result<RuleDocument, ConfigError> {
        (**self).load()
    }

    fn save(&self, doc: &RuleDocument) -> Result<(), ConfigError> {
        (**self).save(doc)
    }

    fn revision(&self) -> Result<Revision, ConfigError> {
        (**self).revision()
    }
}

/// A JSON file on disk. A missing file reads as an empty document.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_err(&self, source: io::Error) -> ConfigError {
        ConfigError::Write { path: self.path.clone(), source }
    }
}

impl RuleSource for JsonFileSource {
    fn load(&self) -> Result<RuleDocument, ConfigError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => RuleDocument::from_json(&text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(RuleDocument::default()),
            Err(source) => Err(ConfigError::Read { path: self.path.clone(), source }),
        }
    }

    fn save(&self, doc: &RuleDocument) -> Result<(), ConfigError> {
        let json = doc.to_json()?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        // Write beside the target and rename over it, so readers never see a partial file.
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| self.write_err(e))?;
        tmp.write_all(json.as_bytes()).map_err(|e| self.write_err(e))?;
        tmp.write_all(b"\n").map_err(|e| self.write_err(e))?;
        tmp.as_file().sync_all().map_err(|e| self.write_err(e))?;
        tmp.persist(&self.path).map_err(|e| self.write_err(e.error))?;
        Ok(())
    }

    fn revision(&self) -> Result<Revision, ConfigError> {
        match fs::metadata(&self.path) {
            Ok(meta) => {
                let mtime = meta.modified().map_err(|source| ConfigError::Read { path: self.path.clone(), source })?;
                Ok(Revision::Mtime(mtime))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Revision::Missing),
            Err(source) => Err(ConfigError::Read { path: self.path.clone(), source }),
        }
    }
}

/// In-memory document with an explicit version counter, bumped on every save.
#[derive(Debug, Default)]
pub struct MemorySource {
    doc: RwLock<RuleDocument>,
    version: AtomicU64,
}

impl MemorySource {
    pub fn new(doc: RuleDocument) -> Self {
        Self { doc: RwLock::new(doc), version: AtomicU64::new(1) }
    }

    /// Replace the document as an out-of-band edit would.
    pub fn replace(&self, doc: RuleDocument) {
        *self.doc.write().unwrap_or_else(PoisonError::into_inner) = doc;
        self.version.fetch_add(1, Ordering::SeqCst);
    }
}

impl RuleSource for MemorySource {
    fn load(&self) -> Result<RuleDocument, ConfigError> {
        let doc = self.doc.read().unwrap_or_else(PoisonError::into_inner).clone();
        doc.check()?;
        Ok(doc)
    }

    fn save(&self, doc: &RuleDocument) -> Result<(), ConfigError> {
        self.replace(doc.clone());
        Ok(())
    }

    fn revision(&self) -> Result<Revision, ConfigError> {
        Ok(Revision::Version(self.version.load(Ordering::SeqCst)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOC: &str = r#"{
        "rules": [
            {"id": "instrumental", "type": "filter_optimization", "pattern": "instrumental",
             "action": {"auto_apply_filter": {"field": "vocal_type", "value": "instrumental", "operator": "equals"}}}
        ],
        "disabled_rules": []
    }"#;

    #[test]
    fn document_parses_and_checks_ids() {
        let doc = RuleDocument::from_json(DOC).unwrap();
        assert_eq!(doc.rules.len(), 1);
        assert!(doc.contains("instrumental"));

        let mut dup = doc.clone();
        dup.disabled_rules.push(doc.rules[0].clone());
        assert!(matches!(dup.check_unique_ids(), Err(ConfigError::DuplicateId(id)) if id == "instrumental"));
    }

    #[test]
    fn out_of_range_actions_are_rejected_on_load() {
        let decay = r#"{"rules": [{"id": "fresh", "type": "recency_decay", "pattern": "new",
            "action": {"horizon_months": 12, "horizon_threshold": 0.5, "min_factor": 1.5}}]}"#;
        match RuleDocument::from_json(decay) {
            Err(ConfigError::InvalidRule { id, errors }) => {
                assert_eq!(id, "fresh");
                assert!(errors.has_field("action.min_factor"), "{errors}");
            }
            other => panic!("expected InvalidRule, got {other:?}"),
        }

        let boost = r#"{"disabled_rules": [{"id": "neg", "type": "feature_boost", "pattern": "stems", "priority": 250,
            "action": {"boost_field": "has_stems", "boost_value": "true", "boost_factor": -3}}]}"#;
        match RuleDocument::from_json(boost) {
            Err(ConfigError::InvalidRule { id, errors }) => {
                assert_eq!(id, "neg");
                assert!(errors.has_field("priority"), "{errors}");
                assert!(errors.has_field("action.boost_factor"), "{errors}");
            }
            other => panic!("expected InvalidRule, got {other:?}"),
        }
    }

    #[test]
    fn memory_source_validates_on_load() {
        let mut doc = RuleDocument::from_json(DOC).unwrap();
        doc.rules[0].priority = 101;
        let source = MemorySource::new(doc);
        assert!(matches!(source.load(), Err(ConfigError::InvalidRule { id, .. }) if id == "instrumental"));
    }

    #[test]
    fn missing_sets_default_to_empty() {
        let doc = RuleDocument::from_json("{}").unwrap();
        assert_eq!(doc, RuleDocument::default());
    }

    #[test]
    fn json_file_roundtrip_and_revision() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonFileSource::new(dir.path().join("rules.json"));

        assert_eq!(source.revision().unwrap(), Revision::Missing);
        assert_eq!(source.load().unwrap(), RuleDocument::default());

        let doc = RuleDocument::from_json(DOC).unwrap();
        source.save(&doc).unwrap();
        assert!(matches!(source.revision().unwrap(), Revision::Mtime(_)));
        assert_eq!(source.load().unwrap(), doc);
    }

    #[test]
    fn json_file_parse_errors_surface() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(JsonFileSource::new(&path).load(), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn memory_source_bumps_version_on_save() {
        let source = MemorySource::new(RuleDocument::default());
        let before = source.revision().unwrap();
        source.save(&RuleDocument::from_json(DOC).unwrap()).unwrap();
        assert_ne!(source.revision().unwrap(), before);
        assert_eq!(source.load().unwrap().rules.len(), 1);
    }
}
