//! Rule model.
//!
//! A [`Rule`] pairs a trigger pattern with one [`RuleAction`]. The seven
//! action shapes form a closed sum type; the serialized `type` tag is derived
//! from the variant ([`Rule::kind`]) and never stored separately, so a rule
//! can't claim one type while carrying another type's payload.
//!
//! On the wire a rule is a flat JSON object:
//!
//! ```json
//! {
//!   "id": "sports-library",
//!   "type": "library_boost",
//!   "pattern": "\\b(sports?|stadium)\\b",
//!   "description": "Boost the sports library",
//!   "priority": 60,
//!   "enabled": true,
//!   "action": { "boost_libraries": [{ "library_name": "Sports Beats", "boost_factor": 1.5 }] }
//! }
//! ```

use crate::error::{ActionShapeError, ValidationErrors};
use crate::pattern::{DEFAULT_REGEX_SIZE_LIMIT, PatternCheck, validate_pattern_with_limit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Priority given to rules that don't specify one.
pub const DEFAULT_PRIORITY: u8 = 50;
/// Highest accepted priority.
pub const MAX_PRIORITY: u8 = 100;
/// Release-date field read by recency rules unless configured otherwise.
pub const DEFAULT_DATE_FIELD: &str = "apm_release_date";

// --- Kinds -------------------------------------------------------------------

/// The seven rule types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    GenreSimplification,
    LibraryBoost,
    FeatureBoost,
    RecencyDecay,
    FilterOptimization,
    RecencyInterleaving,
    SubgenreInterleaving,
}

/// Help text for one action field, for rule-editing UIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldHelp {
    pub name: &'static str,
    pub kind: &'static str,
    pub help: &'static str,
}

const fn help(name: &'static str, kind: &'static str, help: &'static str) -> FieldHelp {
    FieldHelp { name, kind, help }
}

impl RuleKind {
    pub const ALL: [RuleKind; 7] = [
        RuleKind::GenreSimplification,
        RuleKind::LibraryBoost,
        RuleKind::FeatureBoost,
        RuleKind::RecencyDecay,
        RuleKind::FilterOptimization,
        RuleKind::RecencyInterleaving,
        RuleKind::SubgenreInterleaving,
    ];

    /// The serialized `type` tag.
    pub fn as_str(self) -> &'static str {
        match self {
            RuleKind::GenreSimplification => "genre_simplification",
            RuleKind::LibraryBoost => "library_boost",
            RuleKind::FeatureBoost => "feature_boost",
            RuleKind::RecencyDecay => "recency_decay",
            RuleKind::FilterOptimization => "filter_optimization",
            RuleKind::RecencyInterleaving => "recency_interleaving",
            RuleKind::SubgenreInterleaving => "subgenre_interleaving",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RuleKind::GenreSimplification => "Genre simplification",
            RuleKind::LibraryBoost => "Library boost",
            RuleKind::FeatureBoost => "Feature boost",
            RuleKind::RecencyDecay => "Recency decay",
            RuleKind::FilterOptimization => "Filter optimization",
            RuleKind::RecencyInterleaving => "Recency interleaving",
            RuleKind::SubgenreInterleaving => "Subgenre interleaving",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            RuleKind::GenreSimplification => "Expand or restrict the genre facets sent to the search backend.",
            RuleKind::LibraryBoost => "Multiply the score of tracks from the listed libraries.",
            RuleKind::FeatureBoost => "Multiply the score of tracks whose field equals a value.",
            RuleKind::RecencyDecay => "Attenuate scores logarithmically with track age.",
            RuleKind::FilterOptimization => "Add a filter to the search backend query.",
            RuleKind::RecencyInterleaving => "Alternate recent and vintage tracks following an R/V pattern.",
            RuleKind::SubgenreInterleaving => "Alternate attribute groups following a lettered pattern.",
        }
    }

    /// Per-field help for the action of this kind.
    pub fn field_help(self) -> &'static [FieldHelp] {
        match self {
            RuleKind::GenreSimplification => const { &[
                help("auto_apply_facets", "string[]", "Facets added to the search, in order."),
                help("mode", "expand|restrict", "expand ORs the facets into the query, restrict ANDs them."),
            ] },
            RuleKind::LibraryBoost => const { &[help(
                "boost_libraries",
                "[{library_name, boost_factor}]",
                "Exact library names and the factor (> 0) their tracks' scores are multiplied by.",
            )] },
            RuleKind::FeatureBoost => const { &[
                help("boost_field", "string", "Track field to compare."),
                help("boost_value", "string", "Value the field must equal. Comparison is case-sensitive."),
                help("boost_factor", "number", "Score multiplier, > 0."),
            ] },
            RuleKind::RecencyDecay => const { &[
                help("horizon_months", "integer", "Age in months at which the factor reaches horizon_threshold."),
                help("horizon_threshold", "number", "Factor at the horizon, in (0, 1]."),
                help("min_factor", "number", "Floor for the factor, in [0, 1]."),
                help("date_field", "string", "Track field holding the release date."),
            ] },
            RuleKind::FilterOptimization => const { &[help(
                "auto_apply_filter",
                "{field, value, operator}",
                "Filter added to the search; operator is contains, contains_any, equals or not_equals.",
            )] },
            RuleKind::RecencyInterleaving => const { &[
                help("recent_threshold_months", "integer", "Tracks at most this old are recent (R)."),
                help("vintage_max_months", "integer", "Older tracks up to this age are vintage (V); older ones go last."),
                help("pattern", "string", "Sequence of R and V; spaces are ignored."),
                help("repeat_count", "integer", "How many times the pattern is walked."),
                help("date_field", "string", "Track field holding the release date."),
            ] },
            RuleKind::SubgenreInterleaving => const { &[
                help("attribute", "string", "Track field whose value selects the group."),
                help("values", "{letter: value}", "Maps pattern letters to attribute values (case-insensitive)."),
                help("pattern", "string", "Sequence of letters A-Z; spaces are ignored."),
                help("fallback", "relevance|skip", "What fills a slot whose group is exhausted."),
            ] },
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Action payloads ---------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetMode {
    #[default]
    Expand,
    Restrict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreSimplification {
    #[serde(default)]
    pub auto_apply_facets: Vec<String>,
    #[serde(default)]
    pub mode: FacetMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryBoostEntry {
    pub library_name: String,
    pub boost_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryBoost {
    pub boost_libraries: Vec<LibraryBoostEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBoost {
    pub boost_field: String,
    #[serde(deserialize_with = "scalar_as_string")]
    pub boost_value: String,
    pub boost_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecencyDecay {
    pub horizon_months: u32,
    pub horizon_threshold: f64,
    pub min_factor: f64,
    #[serde(default = "default_date_field")]
    pub date_field: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Contains,
    ContainsAny,
    Equals,
    NotEquals,
}

/// A filter the caller adds to its search backend query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    #[serde(deserialize_with = "scalar_as_string")]
    pub value: String,
    pub operator: FilterOperator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterOptimization {
    pub auto_apply_filter: Filter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecencyInterleaving {
    pub recent_threshold_months: u32,
    pub vintage_max_months: u32,
    pub pattern: String,
    #[serde(default = "default_repeat_count")]
    pub repeat_count: u32,
    #[serde(default = "default_date_field")]
    pub date_field: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterleaveFallback {
    #[default]
    Relevance,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgenreInterleaving {
    pub attribute: String,
    /// Letter -> attribute value.
    pub values: BTreeMap<String, String>,
    pub pattern: String,
    #[serde(default)]
    pub fallback: InterleaveFallback,
}

impl SubgenreInterleaving {
    /// The letter whose mapped value equals `value`, ignoring case.
    pub fn letter_for(&self, value: &str) -> Option<char> {
        self.values
            .iter()
            .find(|(_, mapped)| mapped.to_lowercase() == value.to_lowercase())
            .and_then(|(letter, _)| letter.chars().next())
            .map(|c| c.to_ascii_uppercase())
    }
}

/// What a rule does once its pattern matches.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RuleAction {
    GenreSimplification(GenreSimplification),
    LibraryBoost(LibraryBoost),
    FeatureBoost(FeatureBoost),
    RecencyDecay(RecencyDecay),
    FilterOptimization(FilterOptimization),
    RecencyInterleaving(RecencyInterleaving),
    SubgenreInterleaving(SubgenreInterleaving),
}

impl RuleAction {
    pub fn kind(&self) -> RuleKind {
        match self {
            RuleAction::GenreSimplification(_) => RuleKind::GenreSimplification,
            RuleAction::LibraryBoost(_) => RuleKind::LibraryBoost,
            RuleAction::FeatureBoost(_) => RuleKind::FeatureBoost,
            RuleAction::RecencyDecay(_) => RuleKind::RecencyDecay,
            RuleAction::FilterOptimization(_) => RuleKind::FilterOptimization,
            RuleAction::RecencyInterleaving(_) => RuleKind::RecencyInterleaving,
            RuleAction::SubgenreInterleaving(_) => RuleKind::SubgenreInterleaving,
        }
    }

    /// Decode the `action` object of a rule tagged `kind`.
    fn decode(kind: RuleKind, action: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            RuleKind::GenreSimplification => RuleAction::GenreSimplification(serde_json::from_value(action)?),
            RuleKind::LibraryBoost => RuleAction::LibraryBoost(serde_json::from_value(action)?),
            RuleKind::FeatureBoost => RuleAction::FeatureBoost(serde_json::from_value(action)?),
            RuleKind::RecencyDecay => RuleAction::RecencyDecay(serde_json::from_value(action)?),
            RuleKind::FilterOptimization => RuleAction::FilterOptimization(serde_json::from_value(action)?),
            RuleKind::RecencyInterleaving => RuleAction::RecencyInterleaving(serde_json::from_value(action)?),
            RuleKind::SubgenreInterleaving => RuleAction::SubgenreInterleaving(serde_json::from_value(action)?),
        })
    }
}

// --- Rule --------------------------------------------------------------------

/// Disable/restore audit trail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleLifecycle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_at: Option<DateTime<Utc>>,
}

/// A configured trigger pattern + priority + action.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RuleRecord")]
pub struct Rule {
    pub id: String,
    /// Case-insensitive, unanchored regular expression matched against the query.
    pub pattern: String,
    pub description: String,
    /// 0..=100, higher runs first.
    pub priority: u8,
    pub enabled: bool,
    pub action: RuleAction,
    pub lifecycle: RuleLifecycle,
}

impl Rule {
    pub fn kind(&self) -> RuleKind {
        self.action.kind()
    }

    /// Check required fields, action constraints and the pattern.
    ///
    /// Returns the pattern's safety report on success: an unsafe-but-valid
    /// pattern is a warning for the caller to weigh, not a validation error.
    pub fn validate(&self) -> Result<PatternCheck, ValidationErrors> {
        self.validate_with_limit(DEFAULT_REGEX_SIZE_LIMIT)
    }

    pub fn validate_with_limit(&self, size_limit: usize) -> Result<PatternCheck, ValidationErrors> {
        let mut errs = ValidationErrors::default();

        if self.id.trim().is_empty() {
            errs.push("id", "must not be empty");
        }
        if self.priority > MAX_PRIORITY {
            errs.push("priority", format!("must be between 0 and {MAX_PRIORITY}"));
        }

        let check = validate_pattern_with_limit(&self.pattern, size_limit);
        if self.pattern.trim().is_empty() {
            errs.push("pattern", "must not be empty");
        } else if !check.valid {
            errs.push("pattern", check.reason.clone().unwrap_or_else(|| "invalid regular expression".into()));
        }

        validate_action(&self.action, &mut errs);

        errs.into_result()?;
        Ok(check)
    }
}

fn validate_factor(errs: &mut ValidationErrors, field: &str, factor: f64) {
    if !(factor.is_finite() && factor > 0.0) {
        errs.push(field, "must be a finite number greater than 0");
    }
}

fn validate_action(action: &RuleAction, errs: &mut ValidationErrors) {
    match action {
        RuleAction::GenreSimplification(a) => {
            if a.auto_apply_facets.iter().any(|f| f.trim().is_empty()) {
                errs.push("action.auto_apply_facets", "facets must not be empty strings");
            }
        }
        RuleAction::LibraryBoost(a) => {
            if a.boost_libraries.is_empty() {
                errs.push("action.boost_libraries", "must list at least one library");
            }
            for (i, entry) in a.boost_libraries.iter().enumerate() {
                if entry.library_name.trim().is_empty() {
                    errs.push(format!("action.boost_libraries[{i}].library_name"), "must not be empty");
                }
                validate_factor(errs, &format!("action.boost_libraries[{i}].boost_factor"), entry.boost_factor);
            }
        }
        RuleAction::FeatureBoost(a) => {
            if a.boost_field.trim().is_empty() {
                errs.push("action.boost_field", "must not be empty");
            }
            validate_factor(errs, "action.boost_factor", a.boost_factor);
        }
        RuleAction::RecencyDecay(a) => {
            if a.horizon_months == 0 {
                errs.push("action.horizon_months", "must be at least 1");
            }
            if !(a.horizon_threshold > 0.0 && a.horizon_threshold <= 1.0) {
                errs.push("action.horizon_threshold", "must be in (0, 1]");
            }
            if !(0.0..=1.0).contains(&a.min_factor) {
                errs.push("action.min_factor", "must be in [0, 1]");
            }
            if a.date_field.trim().is_empty() {
                errs.push("action.date_field", "must not be empty");
            }
        }
        RuleAction::FilterOptimization(a) => {
            if a.auto_apply_filter.field.trim().is_empty() {
                errs.push("action.auto_apply_filter.field", "must not be empty");
            }
        }
        RuleAction::RecencyInterleaving(a) => {
            if a.vintage_max_months <= a.recent_threshold_months {
                errs.push("action.vintage_max_months", "must be greater than recent_threshold_months");
            }
            let slots: Vec<char> = a.pattern.chars().filter(|c| !c.is_whitespace()).collect();
            if slots.is_empty() {
                errs.push("action.pattern", "must contain at least one R or V");
            } else if let Some(bad) = slots.iter().find(|c| !matches!(c.to_ascii_uppercase(), 'R' | 'V')) {
                errs.push("action.pattern", format!("may only contain R and V, found '{bad}'"));
            }
            if a.repeat_count == 0 {
                errs.push("action.repeat_count", "must be at least 1");
            }
            if a.date_field.trim().is_empty() {
                errs.push("action.date_field", "must not be empty");
            }
        }
        RuleAction::SubgenreInterleaving(a) => {
            if a.attribute.trim().is_empty() {
                errs.push("action.attribute", "must not be empty");
            }
            for letter in a.values.keys() {
                let mut chars = letter.chars();
                let single = matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_alphabetic());
                if !single {
                    errs.push("action.values", format!("key '{letter}' must be a single letter A-Z"));
                }
            }
            let slots: Vec<char> = a.pattern.chars().filter(|c| !c.is_whitespace()).collect();
            if slots.is_empty() {
                errs.push("action.pattern", "must contain at least one letter");
            }
            for c in slots {
                if !c.is_ascii_alphabetic() {
                    errs.push("action.pattern", format!("may only contain letters A-Z, found '{c}'"));
                    break;
                }
                let mapped = a.values.keys().any(|k| k.eq_ignore_ascii_case(&c.to_string()));
                if !mapped {
                    errs.push("action.pattern", format!("letter '{c}' has no entry in values"));
                    break;
                }
            }
        }
    }
}

// --- Serialization -----------------------------------------------------------

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

fn default_enabled() -> bool {
    true
}

fn default_repeat_count() -> u32 {
    1
}

fn default_date_field() -> String {
    DEFAULT_DATE_FIELD.to_string()
}

/// Accept `"true"`, `true` and `1` alike for string-typed action values.
fn scalar_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("expected a string, got {other}"))),
    }
}

/// Owned wire form used for deserialization.
#[derive(Deserialize)]
struct RuleRecord {
    id: String,
    #[serde(rename = "type")]
    kind: RuleKind,
    pattern: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_priority")]
    priority: u8,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    action: serde_json::Value,
    #[serde(flatten)]
    lifecycle: RuleLifecycle,
}

impl TryFrom<RuleRecord> for Rule {
    type Error = ActionShapeError;

    fn try_from(record: RuleRecord) -> Result<Self, Self::Error> {
        let action = RuleAction::decode(record.kind, record.action)
            .map_err(|source| ActionShapeError { id: record.id.clone(), kind: record.kind, source })?;
        Ok(Rule {
            id: record.id,
            pattern: record.pattern,
            description: record.description,
            priority: record.priority,
            enabled: record.enabled,
            action,
            lifecycle: record.lifecycle,
        })
    }
}

/// Borrowed wire form used for serialization.
#[derive(Serialize)]
struct RuleRecordRef<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: RuleKind,
    pattern: &'a str,
    description: &'a str,
    priority: u8,
    enabled: bool,
    action: &'a RuleAction,
    #[serde(flatten)]
    lifecycle: &'a RuleLifecycle,
}

impl Serialize for Rule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RuleRecordRef {
            id: &self.id,
            kind: self.kind(),
            pattern: &self.pattern,
            description: &self.description,
            priority: self.priority,
            enabled: self.enabled,
            action: &self.action,
            lifecycle: &self.lifecycle,
        }
        .serialize(serializer)
    }
}
