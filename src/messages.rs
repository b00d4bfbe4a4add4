//! Wire protocol spoken on every cross-context channel.
//!
//! Every message travels inside an [Envelope] naming its sender and logical destination.
//! Connections to the coordinator identify themselves with a [ConnectionName] of the form
//! `{role}/{tab_id}`. Between the page and the bridge, envelopes are wrapped in a tagged
//! page message so that only the counterpart installed by this crate consumes them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::{CapturedResponse, MockDefinition, Settings, StoreState, TabId};
use crate::Error;

/// Tag carried by page messages posted by the interception hook.
pub const HOOK_SOURCE: &str = "gqlmock-hook";
/// Tag carried by page messages posted by the bridge.
pub const BRIDGE_SOURCE: &str = "gqlmock-bridge";

/// Participant kinds on the message bus.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    UiSurface,
    Bridge,
    /// The coordinator and its store layer. Accepts `self` on the wire.
    #[serde(alias = "self")]
    Coordinator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::UiSurface => "ui-surface",
            Role::Bridge => "bridge",
            Role::Coordinator => "coordinator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ui-surface" => Ok(Role::UiSurface),
            "bridge" => Ok(Role::Bridge),
            "coordinator" | "self" => Ok(Role::Coordinator),
            other => Err(Error::InvalidConnectionName(other.to_string())),
        }
    }
}

/// Declared name of a connection, `{role}/{tab_id}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionName {
    pub role: Role,
    pub tab_id: TabId,
}

impl ConnectionName {
    pub fn new(role: Role, tab_id: TabId) -> Self {
        Self { role, tab_id }
    }

    pub fn bridge(tab_id: TabId) -> Self {
        Self::new(Role::Bridge, tab_id)
    }

    pub fn ui_surface(tab_id: TabId) -> Self {
        Self::new(Role::UiSurface, tab_id)
    }
}

impl fmt::Display for ConnectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.role, self.tab_id)
    }
}

impl FromStr for ConnectionName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (role, tab_id) = s.split_once('/').ok_or_else(|| Error::InvalidConnectionName(s.to_string()))?;

        let role = role.parse::<Role>().map_err(|_| Error::InvalidConnectionName(s.to_string()))?;
        let tab_id = tab_id.parse::<TabId>().map_err(|_| Error::InvalidConnectionName(s.to_string()))?;

        Ok(ConnectionName { role, tab_id })
    }
}

/// Messages exchanged between the hook, bridge, coordinator and UI surfaces.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Message {
    SnapshotRequest,
    Snapshot(StoreState),
    #[serde(rename_all = "camelCase")]
    ResponseCaptured {
        responses: Vec<CapturedResponse>,
    },
    #[serde(rename_all = "camelCase")]
    MockUpdate {
        custom_responses: Vec<MockDefinition>,
    },
    #[serde(rename_all = "camelCase")]
    SettingsUpdate {
        settings: Settings,
    },
    ClearAll,
    KeepAlivePing,
}

impl Message {
    /// Short name used in logs and hook event names.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::SnapshotRequest => "snapshotRequest",
            Message::Snapshot(_) => "snapshot",
            Message::ResponseCaptured { .. } => "responseCaptured",
            Message::MockUpdate { .. } => "mockUpdate",
            Message::SettingsUpdate { .. } => "settingsUpdate",
            Message::ClearAll => "clearAll",
            Message::KeepAlivePing => "keepAlivePing",
        }
    }
}

/// Addressed message, `{ from, to, msg }` on the wire.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Envelope {
    pub from: Role,
    pub to: Role,
    pub msg: Message,
}

impl Envelope {
    pub fn new(from: Role, to: Role, msg: Message) -> Self {
        Self { from, to, msg }
    }

    /// Envelope addressed to the coordinator.
    pub fn to_coordinator(from: Role, msg: Message) -> Self {
        Self::new(from, Role::Coordinator, msg)
    }

    pub fn encode(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(data: &str) -> Result<Envelope, Error> {
        Ok(serde_json::from_str(data)?)
    }
}

/// Wraps an envelope for posting on the page channel.
pub fn tag_page_message(source: &str, envelope: &Envelope) -> Value {
    json!({
        "source": source,
        "envelope": envelope,
    })
}

/// Extracts the envelope of a page message carrying the expected tag.
///
/// Messages posted by other page scripts, or with a different tag, yield `None`.
pub fn untag_page_message(message: &Value, expected_source: &str) -> Option<Envelope> {
    let source = message.get("source")?.as_str()?;
    if source != expected_source {
        return None;
    }

    let envelope = message.get("envelope")?;
    match serde_json::from_value(envelope.clone()) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            log::debug!("ignoring malformed {source} page message: {e}");
            None
        }
    }
}
