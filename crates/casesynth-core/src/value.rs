//! Field values and record identifiers.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Timestamp rendering used by the record store (`YYYY-MM-DD hh:mm:ss`).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Resolved field map handed to a [`crate::RecordStore`].
pub type Fields = BTreeMap<String, Value>;

/// Identifier assigned by the record store on insert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh 32-character hex identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A single resolved field value.
///
/// Serialized untagged so stored documents read like plain JSON rows.
/// Timestamps are the one exception: they are written as
/// `{"timestamp": "<rfc3339>"}` so that a text value which merely looks
/// like a date reads back as `Text`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Number(f64),
    Timestamp(#[serde(with = "tagged_timestamp")] DateTime<FixedOffset>),
    Text(String),
}

mod tagged_timestamp {
    use chrono::{DateTime, FixedOffset};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize)]
    struct Out<'a> {
        timestamp: &'a DateTime<FixedOffset>,
    }

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    struct In {
        timestamp: DateTime<FixedOffset>,
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<FixedOffset>, serializer: S) -> Result<S::Ok, S::Error> {
        Out { timestamp: ts }.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<FixedOffset>, D::Error> {
        In::deserialize(deserializer).map(|v| v.timestamp)
    }
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Interpret the value as a record reference. Empty text is "no reference".
    pub fn as_record_id(&self) -> Option<RecordId> {
        match self {
            Self::Text(s) if !s.trim().is_empty() => Some(RecordId::new(s.clone())),
            _ => None,
        }
    }

    /// Plain-text rendering used by templates and prompts.
    pub fn render(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Number(n) => n.to_string(),
            Self::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<RecordId> for Value {
    fn from(value: RecordId) -> Self {
        Self::Text(value.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_untagged_roundtrip_keeps_variants() {
        let offset = FixedOffset::east_opt(0).unwrap();
        let ts = offset.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let mut fields = Fields::new();
        fields.insert("a".into(), Value::Integer(3));
        fields.insert("b".into(), Value::Number(12.5));
        fields.insert("c".into(), Value::text("Network"));
        fields.insert("d".into(), Value::Timestamp(ts));
        fields.insert("e".into(), Value::Null);

        let json = serde_json::to_string(&fields).unwrap();
        let back: Fields = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fields);
    }

    #[test]
    fn test_date_like_text_stays_text() {
        let text = Value::text("2024-03-01T12:00:00Z");
        let json = serde_json::to_string(&text).unwrap();
        assert_eq!(json, r#""2024-03-01T12:00:00Z""#);
        assert_eq!(serde_json::from_str::<Value>(&json).unwrap(), text);

        let offset = FixedOffset::east_opt(3600).unwrap();
        let ts = Value::Timestamp(offset.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, r#"{"timestamp":"2024-03-01T12:00:00+01:00"}"#);
        assert_eq!(serde_json::from_str::<Value>(&json).unwrap(), ts);
    }

    #[test]
    fn test_render_timestamp_uses_store_format() {
        let offset = FixedOffset::east_opt(-5 * 3600).unwrap();
        let ts = offset.with_ymd_and_hms(2024, 12, 31, 23, 5, 9).unwrap();
        assert_eq!(Value::Timestamp(ts).render(), "2024-12-31 23:05:09");
    }

    #[test]
    fn test_empty_text_is_not_a_reference() {
        assert!(Value::text("").as_record_id().is_none());
        assert!(Value::Null.as_record_id().is_none());
        assert_eq!(
            Value::text("abc").as_record_id(),
            Some(RecordId::new("abc"))
        );
    }

    #[test]
    fn test_generated_ids_look_like_sys_ids() {
        let id = RecordId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
