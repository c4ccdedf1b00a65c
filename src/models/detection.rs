//! Laugh detection records as they travel to and from the event store.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A single qualifying laugh, as posted to the event store.
///
/// `start_time`/`end_time` bracket `detected_time` by one second on each side,
/// clamped at zero.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DetectionEvent {
    #[serde(rename = "session_uuid")]
    pub session_id: String,
    pub nickname: String,
    pub event_index: u32,
    pub detected_time: u64,
    pub start_time: u64,
    pub end_time: u64,
}

impl DetectionEvent {
    pub fn new(session_id: String, nickname: String, event_index: u32, detected_time: u64) -> Self {
        Self {
            session_id,
            nickname,
            event_index,
            detected_time,
            start_time: detected_time.saturating_sub(1),
            end_time: detected_time.saturating_add(1),
        }
    }
}

/// A stored laugh event read back from the event store.
///
/// Tags are attached out of band by the tagging pipeline, so they may be
/// missing for a while after the event was created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LaughEventRecord {
    #[serde(default)]
    pub session_uuid: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    pub event_index: u32,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl LaughEventRecord {
    /// Tags once the tagging pipeline has produced at least one.
    pub fn ready_tags(&self) -> Option<&[String]> {
        self.tags
            .as_deref()
            .filter(|tags| !tags.is_empty())
    }
}

/// Normalizes the several encodings the store uses for tags.
///
/// `null`, `[]`, `"[]"` and blank strings all mean "not tagged yet".
fn deserialize_tags<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(tags_from_value))
}

fn tags_from_value(value: Value) -> Option<Vec<String>> {
    let tags: Vec<String> = match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.starts_with('[') {
                match serde_json::from_str::<Value>(trimmed) {
                    Ok(inner @ Value::Array(_)) => return tags_from_value(inner),
                    _ => return None,
                }
            }
            trimmed
                .split(',')
                .map(|tag| tag.trim().to_string())
                .collect()
        }
        _ => return None,
    };

    let tags: Vec<String> = tags
        .into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect();

    if tags.is_empty() {
        None
    } else {
        Some(tags)
    }
}
