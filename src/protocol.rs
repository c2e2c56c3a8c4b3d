//! Message definitions for the hub's WebSocket API.
//!
//! Outbound commands are plain text frames like `GET:all`. Inbound frames are
//! JSON objects keyed by what they describe (`{"all": …}`,
//! `{"homeegram": …}`); they are decoded once into [`HubMessage`] so command
//! handlers can match on the variant.

use crate::trigger::TimeTriggerUpdate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Largest integer a JSON number can carry without losing precision.
const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// Command sent to the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubCommand {
    /// Ask for the full state; answered with [`HubMessage::Snapshot`].
    GetAll,
    /// Redefine a time trigger of a homeegram.
    UpdateTimeTrigger {
        homeegram_id: i64,
        update: TimeTriggerUpdate,
    },
}

impl HubCommand {
    /// Render the command as the text frame the hub expects.
    pub fn to_wire(&self) -> String {
        match self {
            HubCommand::GetAll => "GET:all".to_string(),
            HubCommand::UpdateTimeTrigger {
                homeegram_id,
                update,
            } => {
                let rrule: String = url::form_urlencoded::byte_serialize(update.rrule.as_bytes())
                    .collect();
                format!(
                    "PUT:homeegrams/{}/triggers/{}?dtstart={}&rrule={}",
                    homeegram_id, update.trigger_id, update.dtstart, rrule
                )
            }
        }
    }
}

/// Message received from the hub.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    /// Full state, the answer to `GET:all`.
    Snapshot(Snapshot),
    /// A single homeegram changed, e.g. after one of its triggers was updated.
    Homeegram(Homeegram),
    /// Anything else the hub pushes (node attributes, user updates, …).
    Other,
}

impl HubMessage {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let mut object: Map<String, Value> =
            serde_json::from_str(text).map_err(DecodeError::NotAnObject)?;

        if let Some(all) = object.remove("all") {
            return serde_json::from_value(all)
                .map(HubMessage::Snapshot)
                .map_err(|source| DecodeError::Malformed { key: "all", source });
        }
        if let Some(homeegram) = object.remove("homeegram") {
            return serde_json::from_value(homeegram)
                .map(HubMessage::Homeegram)
                .map_err(|source| DecodeError::Malformed {
                    key: "homeegram",
                    source,
                });
        }
        Ok(HubMessage::Other)
    }
}

/// Why an inbound frame could not be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not a JSON object: {0}")]
    NotAnObject(#[source] serde_json::Error),
    #[error("malformed `{key}` message from Homee: {source}")]
    Malformed {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// The parts of the full state this tool looks at.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Snapshot {
    /// `None` when the hub left the collection out.
    #[serde(default)]
    pub homeegrams: Option<Vec<Homeegram>>,
}

/// An automation routine hosted on the hub.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Homeegram {
    #[serde(default, deserialize_with = "safe_integer")]
    pub id: Option<i64>,
    /// Whether the homeegram is currently running.
    #[serde(default, deserialize_with = "truthy")]
    pub play: bool,
    /// Epoch seconds of the last start.
    #[serde(default, deserialize_with = "safe_integer")]
    pub last_triggered: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub triggers: Option<Triggers>,
}

impl Homeegram {
    pub fn time_triggers(&self) -> &[TimeTrigger] {
        self.triggers
            .as_ref()
            .and_then(|t| t.time_triggers.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Triggers {
    #[serde(default, deserialize_with = "lenient")]
    pub time_triggers: Option<Vec<TimeTrigger>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TimeTrigger {
    #[serde(default, deserialize_with = "safe_integer")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "safe_integer")]
    pub homeegram_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub dtstart: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub rrule: Option<String>,
}

/// A homeegram that is currently running, as printed by `dump-running-homeegrams`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunningRoutine {
    pub id: i64,
    pub start_epoch_secs: i64,
}

impl RunningRoutine {
    /// `None` unless the homeegram is playing and both numbers are usable.
    pub fn from_homeegram(homeegram: &Homeegram) -> Option<Self> {
        if !homeegram.play {
            return None;
        }
        Some(Self {
            id: homeegram.id?,
            start_epoch_secs: homeegram.last_triggered?,
        })
    }
}

/// Accept only integral JSON numbers in the safe range, written either as
/// `5` or `5.0`; anything else reads as absent.
fn safe_integer<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let Some(Value::Number(n)) = value else {
        return Ok(None);
    };
    let integer = match n.as_i64() {
        Some(i) => Some(i),
        None => n
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER as f64)
            .map(|f| f as i64),
    };
    Ok(integer.filter(|i| i.abs() <= MAX_SAFE_INTEGER))
}

/// A field of an unexpected shape reads as absent instead of failing the
/// whole frame.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// The hub reports flags as booleans or as 0/1.
fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
        Some(Value::Null) | None => false,
    })
}
