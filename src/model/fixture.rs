use crate::error::FeedResult;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use strum_macros::{Display, EnumIter};

/// Fixture document as delivered by snapshots and stream deltas.
///
/// Snapshots and deltas share this schema. Upstream emits PascalCase keys; the
/// camelCase spellings are accepted as aliases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(rename = "Id", alias = "id", default)]
    pub id: String,
    #[serde(rename = "Name", alias = "name", default)]
    pub name: String,
    #[serde(rename = "Epoch", alias = "epoch", default)]
    pub epoch: i64,
    #[serde(rename = "Sequence", alias = "sequence", default)]
    pub sequence: i64,
    #[serde(rename = "MatchStatus", alias = "matchStatus", default)]
    pub match_status: MatchStatus,
    #[serde(rename = "Markets", alias = "markets", default, deserialize_with = "null_as_default")]
    pub markets: Vec<Market>,
    #[serde(
        rename = "LastEpochChangeReason",
        alias = "lastEpochChangeReason",
        default,
        deserialize_with = "null_as_default"
    )]
    pub last_epoch_change_reason: Vec<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Market {
    #[serde(rename = "Id", alias = "id")]
    pub id: String,
    #[serde(rename = "Tags", alias = "tags", default, deserialize_with = "null_as_default")]
    pub tags: HashMap<String, Value>,
    #[serde(rename = "Selections", alias = "selections", default, deserialize_with = "null_as_default")]
    pub selections: Vec<Selection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    #[serde(rename = "Id", alias = "id")]
    pub id: String,
    #[serde(rename = "Tags", alias = "tags", default, deserialize_with = "null_as_default")]
    pub tags: HashMap<String, Value>,
}

impl Fixture {
    /// Parse a full snapshot document.
    pub fn from_snapshot(json: &str) -> FeedResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a stream update. The payload is either a bare fixture document or a
    /// stream message envelope carrying the fixture under `Content`.
    pub fn from_update(payload: &str) -> FeedResult<Self> {
        let mut message: Value = serde_json::from_str(payload)?;
        let content = match message.as_object_mut() {
            Some(object) => object.remove("Content").or_else(|| object.remove("content")),
            None => None,
        };
        match content {
            Some(content) => Ok(serde_json::from_value(content)?),
            None => Ok(serde_json::from_value(message)?),
        }
    }

    pub fn epoch_change_reasons(&self) -> impl Iterator<Item = EpochChangeReason> + '_ {
        self.last_epoch_change_reason.iter().map(|code| EpochChangeReason::from(*code))
    }

    pub fn is_deleted(&self) -> bool {
        self.epoch_change_reasons().any(|reason| reason == EpochChangeReason::Deleted)
    }
}

impl Market {
    pub fn tag(&self, key: &str) -> Option<String> {
        self.tags.get(key).map(tag_text)
    }
}

impl Selection {
    pub fn tag(&self, key: &str) -> Option<String> {
        self.tags.get(key).map(tag_text)
    }
}

fn tag_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Match status of a fixture. Upstream sends the code either as a string or as an integer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum MatchStatus {
    #[default]
    Undefined,
    Setup,
    Ready,
    PreMatch,
    InRunning,
    MatchOver,
    Other(i32),
}

impl MatchStatus {
    pub fn code(&self) -> i32 {
        match self {
            MatchStatus::Undefined => 0,
            MatchStatus::Setup => 10,
            MatchStatus::Ready => 20,
            MatchStatus::PreMatch => 30,
            MatchStatus::InRunning => 40,
            MatchStatus::MatchOver => 50,
            MatchStatus::Other(code) => *code,
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self == MatchStatus::MatchOver
    }
}

impl From<i32> for MatchStatus {
    fn from(code: i32) -> Self {
        match code {
            0 => MatchStatus::Undefined,
            10 => MatchStatus::Setup,
            20 => MatchStatus::Ready,
            30 => MatchStatus::PreMatch,
            40 => MatchStatus::InRunning,
            50 => MatchStatus::MatchOver,
            other => MatchStatus::Other(other),
        }
    }
}

impl Display for MatchStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchStatus::Other(code) => write!(f, "Other({})", code),
            known => write!(f, "{:?}", known),
        }
    }
}

impl Serialize for MatchStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.code().to_string())
    }
}

impl<'de> Deserialize<'de> for MatchStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Str(String),
            Null(()),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Int(code) => i32::try_from(code)
                .map(MatchStatus::from)
                .map_err(|_| serde::de::Error::custom(format!("match status out of range: {}", code))),
            Raw::Str(text) if text.trim().is_empty() => Ok(MatchStatus::Undefined),
            Raw::Str(text) => text
                .trim()
                .parse::<i32>()
                .map(MatchStatus::from)
                .map_err(|e| serde::de::Error::custom(format!("invalid match status '{}': {}", text, e))),
            Raw::Null(()) => Ok(MatchStatus::Undefined),
        }
    }
}

#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, Hash, EnumIter)]
pub enum EpochChangeReason {
    Created,
    Unpublished,
    Deleted,
    Participants,
    StartTime,
    MatchStatus,
    BaseVariables,
    Definition,
    Unknown,
}

impl From<i32> for EpochChangeReason {
    fn from(code: i32) -> Self {
        match code {
            0 => EpochChangeReason::Created,
            5 => EpochChangeReason::Unpublished,
            10 => EpochChangeReason::Deleted,
            20 => EpochChangeReason::Participants,
            30 => EpochChangeReason::StartTime,
            40 => EpochChangeReason::MatchStatus,
            50 => EpochChangeReason::BaseVariables,
            60 => EpochChangeReason::Definition,
            _ => EpochChangeReason::Unknown,
        }
    }
}

/// Lightweight state a discovery listing may carry for a fixture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceSummary {
    pub match_status: MatchStatus,
    pub sequence: i64,
}
