//! Candidate items.
//!
//! Tracks are owned by the search backend, so the engine keeps them as opaque
//! JSON objects and only touches the handful of fields rules refer to.

use crate::error::EngineInputError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;

/// Field holding the relevance score the engine adjusts.
pub const SCORE_FIELD: &str = "_relevance_score";
/// Field compared by library boosts.
pub const LIBRARY_FIELD: &str = "library_name";
/// Field used to identify a track in audit records.
pub const ID_FIELD: &str = "id";

/// One search result, as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Track(Map<String, Value>);

impl Track {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter, handy for fixtures.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    /// The track id, stringified. Tracks without one are reported as `""`.
    pub fn id(&self) -> String {
        self.field_text(ID_FIELD).map(Cow::into_owned).unwrap_or_default()
    }

    pub fn relevance_score(&self) -> Option<f64> {
        self.0.get(SCORE_FIELD).and_then(Value::as_f64)
    }

    pub fn set_relevance_score(&mut self, score: f64) {
        // Non-finite floats have no JSON form; keep the previous value.
        if let Some(number) = serde_json::Number::from_f64(score) {
            self.0.insert(SCORE_FIELD.to_string(), Value::Number(number));
        }
    }

    /// Score used for ordering; tracks are checked for a score before any
    /// score-dependent step runs, so the fallback only covers unscored lists
    /// passed to reorder-only rule sets.
    pub(crate) fn score_or_zero(&self) -> f64 {
        self.relevance_score().unwrap_or(0.0)
    }

    /// `track[field]` as text: strings verbatim, numbers and booleans via
    /// their JSON form. Null, arrays and objects have no text form.
    pub fn field_text(&self, field: &str) -> Option<Cow<'_, str>> {
        match self.0.get(field)? {
            Value::String(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Number(n) => Some(Cow::Owned(n.to_string())),
            Value::Bool(b) => Some(Cow::Owned(b.to_string())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn library_name(&self) -> Option<&str> {
        self.0.get(LIBRARY_FIELD).and_then(Value::as_str)
    }

    /// Decode a JSON track list, rejecting anything that is not an array of objects.
    ///
    /// Scores are not checked here; whether they are required depends on the
    /// rules that end up applying.
    pub fn list_from_json(value: Value) -> Result<Vec<Track>, EngineInputError> {
        let items = match value {
            Value::Array(items) => items,
            other => return Err(EngineInputError::NotAList { found: json_kind(&other) }),
        };
        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(map) => Ok(Track(map)),
                _ => Err(EngineInputError::TrackNotObject { index }),
            })
            .collect()
    }
}

impl From<Map<String, Value>> for Track {
    fn from(map: Map<String, Value>) -> Self {
        Track(map)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_text_stringifies_scalars() {
        let track = Track::new().with("id", 7).with("has_stems", true).with("title", "Ride").with("tags", json!(["a"]));

        assert_eq!(track.id(), "7");
        assert_eq!(track.field_text("has_stems").as_deref(), Some("true"));
        assert_eq!(track.field_text("title").as_deref(), Some("Ride"));
        assert_eq!(track.field_text("tags"), None);
        assert_eq!(track.field_text("missing"), None);
    }

    #[test]
    fn score_roundtrips_through_json() {
        let mut track = Track::new().with(SCORE_FIELD, 1);
        assert_eq!(track.relevance_score(), Some(1.0));

        track.set_relevance_score(1.25);
        assert_eq!(serde_json::to_value(&track).unwrap(), json!({"_relevance_score": 1.25}));

        track.set_relevance_score(f64::NAN);
        assert_eq!(track.relevance_score(), Some(1.25));
    }

    #[test]
    fn list_from_json_checks_shape() {
        let tracks = Track::list_from_json(json!([{"id": 1}, {"id": 2}])).unwrap();
        assert_eq!(tracks.len(), 2);

        assert_eq!(
            Track::list_from_json(json!({"id": 1})).unwrap_err(),
            EngineInputError::NotAList { found: "an object" }
        );
        assert_eq!(Track::list_from_json(json!([{"id": 1}, 3])).unwrap_err(), EngineInputError::TrackNotObject {
            index: 1
        });
        assert!(Track::list_from_json(json!([])).unwrap().is_empty());
    }
}
