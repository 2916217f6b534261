//! Provenance metadata stored next to each cached result.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local, SecondsFormat};
use serde::{Deserialize, Serialize};

/// Metadata of a cache entry.
///
/// `query` and `cache_file` are filled in by the store when the entry is
/// written. Keys other than the four named fields are kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub cache_file: String,
    pub executed_at: String,
    pub duration: f64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Metadata {
    /// Metadata for an execution that started at `executed_at` and took `duration`.
    pub fn new<Tz: chrono::TimeZone>(executed_at: DateTime<Tz>, duration: Duration) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            query: String::new(),
            cache_file: String::new(),
            executed_at: executed_at.to_rfc3339_opts(SecondsFormat::Micros, false),
            duration: duration.as_secs_f64(),
            extra: BTreeMap::new(),
        }
    }

    /// Metadata stamped with the current local time.
    pub fn now(duration: Duration) -> Self {
        Self::new(Local::now(), duration)
    }

    /// Add or replace an additional key.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn get_extra(&self, key: &str) -> Option<&serde_json::Value> {
        self.extra.get(key)
    }

    /// Parse `executed_at`.
    ///
    /// Returns `None` if the timestamp is not RFC 3339 (for example a naive
    /// ISO-8601 string written by another tool).
    pub fn executed_at_datetime(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.executed_at).ok()
    }

    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extra_keys_round_trip() {
        let metadata = Metadata::now(Duration::from_millis(1500))
            .with_extra("db_name", "dbtest")
            .with_extra("rows", 3);
        let text = serde_json::to_string(&metadata).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["db_name"], json!("dbtest"));
        assert_eq!(value["duration"], json!(1.5));

        let back: Metadata = serde_json::from_str(&text).unwrap();
        assert_eq!(back, metadata);
    }

    #[test]
    fn test_missing_derived_fields_default() {
        let back: Metadata =
            serde_json::from_value(json!({"executed_at": "2024-01-01T10:00:00", "duration": 600})).unwrap();
        assert!(back.query.is_empty());
        assert_eq!(back.duration(), Duration::from_secs(600));
        assert!(back.executed_at_datetime().is_none());
    }

    #[test]
    fn test_executed_at_parses() {
        let metadata = Metadata::now(Duration::ZERO);
        assert!(metadata.executed_at_datetime().is_some());
    }
}
