//! # DNS Query Events
//!
//! The event record exposed by both the paginated `/logs` endpoint and the
//! `/logs/stream` feed.
//!
//! ## Wire Shape
//! ```text
//! {
//!   "timestamp": "2024-05-01T10:00:00.123Z",   ← required
//!   "domain":    "ads.example.com",            ← required
//!   "type":      "A",
//!   "status":    "blocked",
//!   "blocked":   true,
//!   "clientIp":  "192.168.1.20",
//!   "protocol":  "DNS-over-HTTPS",
//!   "device":    { "id": "8TD1G", "name": "Pixel", ... } | "Pixel" | null,
//!   "root":      "example.com",
//!   "tracker":   "doubleclick",
//!   "encrypted": true
//! }
//! ```
//!
//! Optional text fields that are missing or `null` become empty strings and
//! missing flags become `false`, so a sparse event never fails to decode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};
use crate::identity::EventId;

// =============================================================================
// Device
// =============================================================================

/// Device metadata attached to an event.
///
/// The API emits either a structured object, a bare label, or nothing at all.
/// The shape is resolved once at parse time; everything downstream works with
/// this enum and [`Device::display_name`]. A structured device keeps every
/// key it arrived with, so storage writes back exactly what was received.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Device {
    /// `{ "id": ..., "name": "...", ... }`
    Structured {
        /// `name` when it is a string, otherwise `""`.
        name: String,
        fields: Map<String, Value>,
    },

    /// A bare JSON string.
    Label(String),

    /// Missing, `null`, or a shape we do not understand.
    #[default]
    Absent,
}

impl Device {
    /// Resolves the device variant from a raw JSON value.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Device::Structured {
                name: fields
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                fields,
            },
            Value::String(label) => Device::Label(label),
            _ => Device::Absent,
        }
    }

    /// Human-readable device name, or `""` when none is known.
    pub fn display_name(&self) -> &str {
        match self {
            Device::Structured { name, .. } => name,
            Device::Label(label) => label,
            Device::Absent => "",
        }
    }

    /// The `id` key of a structured device, whatever its JSON type.
    pub fn id(&self) -> Option<&Value> {
        match self {
            Device::Structured { fields, .. } => fields.get("id"),
            _ => None,
        }
    }

    /// Returns true when no device metadata was supplied.
    pub fn is_absent(&self) -> bool {
        matches!(self, Device::Absent)
    }

    /// JSON form used for storage: object, string, or `None` for SQL NULL.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Device::Structured { fields, .. } => Some(Value::Object(fields.clone())),
            Device::Label(label) => Some(Value::String(label.clone())),
            Device::Absent => None,
        }
    }
}

impl<'de> Deserialize<'de> for Device {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.map(Device::from_value).unwrap_or_default())
    }
}

impl Serialize for Device {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.to_json() {
            Some(value) => value.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }
}

// =============================================================================
// DNS Event
// =============================================================================

/// One DNS query as reported by the log API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsEvent {
    /// When the query was resolved.
    pub timestamp: DateTime<Utc>,

    /// Queried name.
    pub domain: String,

    /// Record type (`A`, `AAAA`, `HTTPS`, ...).
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub record_type: String,

    /// Resolution status (`default`, `blocked`, `allowed`, ...).
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub blocked: bool,

    #[serde(default, deserialize_with = "null_as_default")]
    pub client_ip: String,

    /// Transport used by the client (`DNS-over-HTTPS`, `UDP`, ...).
    #[serde(default, deserialize_with = "null_as_default")]
    pub protocol: String,

    #[serde(default)]
    pub device: Device,

    /// Registrable root of `domain`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub root: String,

    /// Tracker classification, empty when the domain is not a known tracker.
    #[serde(default, deserialize_with = "null_as_default")]
    pub tracker: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub encrypted: bool,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl DnsEvent {
    /// Decodes one event from its JSON text.
    pub fn from_json(payload: &str) -> CoreResult<Self> {
        serde_json::from_str(payload).map_err(CoreError::malformed_event)
    }

    /// Decodes one event from an already-parsed JSON value.
    pub fn from_value(value: Value) -> CoreResult<Self> {
        serde_json::from_value(value).map_err(CoreError::malformed_event)
    }

    /// Dedup identity of this event. See [`EventId::assign`].
    pub fn identity(&self) -> EventId {
        EventId::assign(self)
    }

    /// Shortcut for `self.device.display_name()`.
    pub fn device_name(&self) -> &str {
        self.device.display_name()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
