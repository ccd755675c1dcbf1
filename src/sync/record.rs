//! Incoming JSON records, decoded from neutral key-value maps.
//!
//! Required fields that are missing abort the whole batch. Optional fields
//! that are missing or malformed are treated as absent. Ids and capacities
//! arrive as strings or numbers depending on the endpoint, so both are
//! accepted as text; `null` text decodes to an empty string.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use crate::sync::reconcile::ReconcileError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoomRecord {
    #[serde(deserialize_with = "text")]
    pub id: String,
    #[serde(deserialize_with = "text")]
    pub name: String,
    #[serde(deserialize_with = "text")]
    pub capacity: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakerRecord {
    #[serde(deserialize_with = "text")]
    pub id: String,
    #[serde(deserialize_with = "text")]
    pub first_name: String,
    #[serde(deserialize_with = "text")]
    pub last_name: String,
    #[serde(deserialize_with = "text")]
    pub bio: String,
    #[serde(deserialize_with = "text")]
    pub company: String,
    #[serde(rename = "imageURI", deserialize_with = "text")]
    pub image_uri: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionRecord {
    #[serde(deserialize_with = "text")]
    pub id: String,
    #[serde(deserialize_with = "text")]
    pub title: String,
    #[serde(deserialize_with = "text")]
    pub experience: String,
    #[serde(rename = "type", deserialize_with = "text")]
    pub session_type: String,
    #[serde(deserialize_with = "text")]
    pub summary: String,
    #[serde(default, deserialize_with = "optional_text")]
    pub track: Option<String>,
    /// `speakerUri` references, in payload order. `None` when the payload
    /// has no usable `speakers` array.
    #[serde(default, deserialize_with = "speaker_uris")]
    pub speakers: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRecord {
    #[serde(deserialize_with = "text")]
    pub from_time: String,
    #[serde(deserialize_with = "text")]
    pub to_time: String,
    #[serde(deserialize_with = "text")]
    pub kind: String,
    #[serde(rename = "type", deserialize_with = "text")]
    pub entry_type: String,
    #[serde(deserialize_with = "text")]
    pub code: String,
    #[serde(default, deserialize_with = "optional_text")]
    pub room: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub presentation_uri: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub note: Option<String>,
}

/// Decode every record of every batch, in order. Any failure aborts the
/// whole set: a partial entity set would make the lost-id sweep delete rows
/// that are still present remotely.
pub fn decode_batches<T: DeserializeOwned>(
    entity: &'static str,
    batches: &[Vec<Value>],
) -> Result<Vec<T>, ReconcileError> {
    let mut records = Vec::with_capacity(batches.iter().map(Vec::len).sum());
    for (index, raw) in batches.iter().flatten().enumerate() {
        let record = T::deserialize(raw).map_err(|source| ReconcileError::Record {
            entity,
            index,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

fn value_as_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        other => value_as_text(other)
            .ok_or_else(|| de::Error::custom("expected a string or number")),
    }
}

fn optional_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(value_as_text(Value::deserialize(deserializer)?))
}

fn speaker_uris<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Vec<String>>, D::Error> {
    let Value::Array(items) = Value::deserialize(deserializer)? else {
        return Ok(None);
    };
    Ok(Some(
        items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(mut map) => map.remove("speakerUri").and_then(value_as_text),
                _ => None,
            })
            .collect(),
    ))
}
