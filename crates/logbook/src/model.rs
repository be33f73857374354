//! Typed view of a log session document.
//!
//! The document is written by the live bot and read back here. Every nested
//! container goes through [`Shaped`], so a value with an unexpected shape is
//! kept verbatim and written back unchanged instead of failing the parse.
//! Keys this model does not know about land in the `extra` bag of the
//! enclosing struct. Scalar fields are `Option<Option<T>>`: absent, explicit
//! `null`, or a value, and all three are written back as they were read.
//!
//! Key order is kept for every map (groups, logs, stats, extras). Inside a
//! struct the known fields are written first in declaration order, followed
//! by the `extra` keys in document order.

use {
    indexmap::IndexMap,
    serde::{Deserialize, Deserializer, Serialize},
    serde_json::{Map, Value},
};

/// Unrecognized keys, preserved in document order.
pub type Extras = Map<String, Value>;

/// A value that either matches the expected shape or is held verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Shaped<T> {
    Valid(T),
    Malformed(Value),
}

impl<T> Shaped<T> {
    pub fn as_valid(&self) -> Option<&T> {
        match self {
            Self::Valid(v) => Some(v),
            Self::Malformed(_) => None,
        }
    }

    pub fn as_valid_mut(&mut self) -> Option<&mut T> {
        match self {
            Self::Valid(v) => Some(v),
            Self::Malformed(_) => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

impl<T> From<T> for Shaped<T> {
    fn from(value: T) -> Self {
        Self::Valid(value)
    }
}

/// Keep a present key (even `null`) instead of collapsing it into `None`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Shaped<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Shaped::deserialize(deserializer).map(Some)
}

/// Keep a present scalar (even `null`) as `Some(..)`; absent stays `None`.
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Some(Option::<T>::deserialize(deserializer)?))
}

/// Value of a scalar field, treating an explicit `null` like an absent key.
pub fn scalar<T>(field: &Option<Option<T>>) -> Option<&T> {
    field.as_ref().and_then(Option::as_ref)
}

/// Borrow the valid inner value of an optional shaped field.
fn valid<T>(field: &Option<Shaped<T>>) -> Option<&T> {
    field.as_ref().and_then(Shaped::as_valid)
}

fn valid_mut<T>(field: &mut Option<Shaped<T>>) -> Option<&mut T> {
    field.as_mut().and_then(Shaped::as_valid_mut)
}

/// An identifier the bot has written either as a string or as a number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdValue {
    Text(String),
    Number(serde_json::Number),
}

impl IdValue {
    /// String form, as used for archive keys.
    pub fn as_string(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
        }
    }
}

impl From<&str> for IdValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// All logs of one bot account, keyed by group id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogDocument {
    pub groups: IndexMap<String, Shaped<GroupLogs>>,
}

impl LogDocument {
    /// Parse raw document bytes. Fails only if the top level is not a JSON
    /// object; anything below that is captured as [`Shaped::Malformed`].
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Serialize the way the bot writes it: two-space indent, UTF-8 verbatim.
    pub fn to_pretty_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}

/// Per-group payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupLogs {
    /// Id of the log currently recording, empty when idle.
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub current: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub logs: Option<Shaped<IndexMap<String, Shaped<LogEntry>>>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub filters: Option<Shaped<LogFilters>>,
    /// Lowercased log name to log id.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub name_index: Option<Shaped<Map<String, Value>>>,
    #[serde(flatten)]
    pub extra: Extras,
}

impl GroupLogs {
    pub fn logs(&self) -> Option<&IndexMap<String, Shaped<LogEntry>>> {
        valid(&self.logs)
    }

    pub fn logs_mut(&mut self) -> Option<&mut IndexMap<String, Shaped<LogEntry>>> {
        valid_mut(&mut self.logs)
    }

    /// Effective filters; a missing or malformed block means all off.
    pub fn filters(&self) -> LogFilters {
        valid(&self.filters).cloned().unwrap_or_default()
    }
}

/// Group-level recording filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogFilters {
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub outside: Option<Option<bool>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub command: Option<Option<bool>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub bot: Option<Option<bool>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub media: Option<Option<bool>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub forum_code: Option<Option<bool>>,
    #[serde(flatten)]
    pub extra: Extras,
}

/// One transcript session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub recording: Option<Option<bool>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub record_begin_at: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_warn: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub records: Option<Shaped<Vec<Shaped<Record>>>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub stats: Option<Shaped<Stats>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub color_map: Option<Shaped<Map<String, Value>>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub upload: Option<Shaped<UploadInfo>>,
    #[serde(flatten)]
    pub extra: Extras,
}

impl LogEntry {
    pub fn records(&self) -> Option<&Vec<Shaped<Record>>> {
        valid(&self.records)
    }

    pub fn records_mut(&mut self) -> Option<&mut Vec<Shaped<Record>>> {
        valid_mut(&mut self.records)
    }

    pub fn stats(&self) -> Option<&Stats> {
        valid(&self.stats)
    }

    pub fn stats_mut(&mut self) -> Option<&mut Stats> {
        valid_mut(&mut self.stats)
    }

    pub fn color_map(&self) -> Option<&Map<String, Value>> {
        valid(&self.color_map)
    }

    pub fn color_map_mut(&mut self) -> Option<&mut Map<String, Value>> {
        valid_mut(&mut self.color_map)
    }

    pub fn upload(&self) -> Option<&UploadInfo> {
        valid(&self.upload)
    }
}

/// Upload bookkeeping for a finished log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadInfo {
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub time: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub file: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub note: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub url: Option<Option<String>>,
    #[serde(flatten)]
    pub extra: Extras,
}

/// Aggregates kept alongside the records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// User id to `{count, nickname, ...}`.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub participants: Option<Shaped<Map<String, Value>>>,
    /// Face value to per-face roll aggregates.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub dice_faces: Option<Shaped<IndexMap<String, Shaped<DiceFace>>>>,
    #[serde(flatten)]
    pub extra: Extras,
}

impl Stats {
    pub fn participants(&self) -> Option<&Map<String, Value>> {
        valid(&self.participants)
    }

    pub fn participants_mut(&mut self) -> Option<&mut Map<String, Value>> {
        valid_mut(&mut self.participants)
    }

    pub fn dice_faces(&self) -> Option<&IndexMap<String, Shaped<DiceFace>>> {
        valid(&self.dice_faces)
    }

    pub fn dice_faces_mut(&mut self) -> Option<&mut IndexMap<String, Shaped<DiceFace>>> {
        valid_mut(&mut self.dice_faces)
    }
}

/// Roll aggregates for one die face (`sum`, `count` stay in `extra`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiceFace {
    /// User id to `{sum, count, nickname}`.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub users: Option<Shaped<Map<String, Value>>>,
    #[serde(flatten)]
    pub extra: Extras,
}

impl DiceFace {
    pub fn users(&self) -> Option<&Map<String, Value>> {
        valid(&self.users)
    }

    pub fn users_mut(&mut self) -> Option<&mut Map<String, Value>> {
        valid_mut(&mut self.users)
    }
}

/// One transcript line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub time: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_id: Option<Option<IdValue>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub nickname: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub content: Option<Option<String>>,
    /// `user`, `bot`, ...
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub source: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub message_id: Option<Option<IdValue>>,
    #[serde(flatten)]
    pub extra: Extras,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn sample() -> Value {
        json!({
            "10001": {
                "current": "a1",
                "logs": {
                    "a1": {
                        "name": "Session One",
                        "created_at": "2024/05/01 20:00:00",
                        "recording": true,
                        "records": [
                            {"time": "2024/05/01 20:01:00", "user_id": 42, "nickname": "Ann",
                             "content": "hi", "source": "user", "message_id": "m1"},
                            "garbage"
                        ],
                        "stats": {"messages": 1, "participants": {"42": {"count": 1}}},
                        "color_map": {"42": "#ff0000"},
                        "session_count": 3
                    }
                },
                "filters": {"bot": true},
                "name_index": {"session one": "a1"},
                "legacy_flag": 1
            },
            "10002": "not a group"
        })
    }

    #[test]
    fn parses_typed_fields_and_keeps_extras() {
        let doc: LogDocument = serde_json::from_value(sample()).unwrap();
        let group = doc.groups["10001"].as_valid().unwrap();
        assert_eq!(scalar(&group.current).map(String::as_str), Some("a1"));
        assert_eq!(group.extra["legacy_flag"], json!(1));
        assert_eq!(scalar(&group.filters().bot), Some(&true));

        let entry = group.logs().unwrap()["a1"].as_valid().unwrap();
        assert_eq!(scalar(&entry.name).map(String::as_str), Some("Session One"));
        assert_eq!(entry.extra["session_count"], json!(3));

        let records = entry.records().unwrap();
        assert_eq!(records.len(), 2);
        let first = records[0].as_valid().unwrap();
        assert_eq!(scalar(&first.user_id).unwrap().as_string(), "42");
        assert!(records[1].is_malformed());

        assert!(doc.groups["10002"].is_malformed());
    }

    #[test]
    fn round_trip_preserves_content() {
        let original = sample();
        let doc: LogDocument = serde_json::from_value(original.clone()).unwrap();
        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn null_scalars_survive_a_rewrite() {
        let original = json!({
            "g": {
                "current": null,
                "logs": {
                    "l": {
                        "name": "x",
                        "record_begin_at": null,
                        "last_warn": null,
                        "upload": {"url": null},
                        "records": [{"time": "t", "nickname": null, "message_id": null}]
                    }
                },
                "filters": {"bot": null}
            }
        });
        let doc: LogDocument = serde_json::from_value(original.clone()).unwrap();
        let group = doc.groups["g"].as_valid().unwrap();
        assert_eq!(group.current, Some(None));
        assert!(scalar(&group.current).is_none());

        let entry = group.logs().unwrap()["l"].as_valid().unwrap();
        assert_eq!(entry.record_begin_at, Some(None));
        assert_eq!(entry.created_at, None);

        let text = String::from_utf8(doc.to_pretty_bytes().unwrap()).unwrap();
        assert!(text.contains("\"record_begin_at\": null"));
        assert!(!text.contains("created_at"));
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn known_fields_lead_and_extras_keep_document_order() {
        let doc = LogDocument::from_slice(
            br#"{"g": {"logs": {"l": {"zeta": 1, "records": [], "alpha": 2, "name": "x"}}}}"#,
        )
        .unwrap();
        let text = String::from_utf8(serde_json::to_vec(&doc).unwrap()).unwrap();
        assert_eq!(
            text,
            r#"{"g":{"logs":{"l":{"name":"x","records":[],"zeta":1,"alpha":2}}}}"#
        );
    }

    #[test]
    fn wrong_shaped_stats_fields_are_held_verbatim() {
        let doc: LogDocument = serde_json::from_value(json!({
            "g": {"logs": {"l": {"stats": {"participants": [1, 2], "dice_faces": null}}}}
        }))
        .unwrap();
        let entry = doc.groups["g"].as_valid().unwrap().logs().unwrap()["l"]
            .as_valid()
            .unwrap();
        let stats = entry.stats().unwrap();
        assert!(stats.participants.as_ref().unwrap().is_malformed());
        assert_eq!(stats.dice_faces, Some(Shaped::Malformed(Value::Null)));

        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back["g"]["logs"]["l"]["stats"]["dice_faces"], Value::Null);
    }

    #[test]
    fn non_object_document_fails_to_parse() {
        assert!(LogDocument::from_slice(b"[1, 2, 3]").is_err());
        assert!(LogDocument::from_slice(b"{").is_err());
    }

    #[test]
    fn pretty_output_keeps_non_ascii() {
        let doc: LogDocument =
            serde_json::from_value(json!({"g": {"logs": {"l": {"name": "跑团记录"}}}})).unwrap();
        let text = String::from_utf8(doc.to_pretty_bytes().unwrap()).unwrap();
        assert!(text.contains("跑团记录"));
        assert!(text.contains("\n  \"g\""));
    }
}
