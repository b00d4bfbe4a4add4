//! The bridge relays envelopes between a page's interception hook and the coordinator.
//!
//! It keeps at most one connection, named `bridge/{tab_id}`. Hook-tagged page messages
//! are forwarded verbatim while connected and dropped otherwise. Everything the
//! coordinator sends is posted back on the page channel tagged for the hook. When the
//! connection drops, the bridge waits for the next storage change notification, then
//! reconnects with a bounded policy and asks for a fresh snapshot.

use serde_json::Value;

use crate::domain::TabId;
use crate::messages::{tag_page_message, untag_page_message, ConnectionName, Envelope, Message, Role, BRIDGE_SOURCE, HOOK_SOURCE};

#[cfg(feature = "sync")]
pub mod sync;

#[cfg(feature = "async")]
pub mod r#async;

/// Threaded bridge.
#[cfg(feature = "sync")]
pub mod blocking {
    pub use super::sync::Bridge;
}

#[cfg(feature = "async")]
pub use r#async::Bridge;
#[cfg(all(feature = "sync", not(feature = "async")))]
pub use sync::Bridge;

pub(crate) fn connection_name(tab_id: TabId) -> String {
    ConnectionName::bridge(tab_id).to_string()
}

/// Envelope to forward for a page message, if the hook posted it.
pub(crate) fn from_page(message: &Value) -> Option<Envelope> {
    untag_page_message(message, HOOK_SOURCE)
}

/// Page message carrying a coordinator envelope to the hook.
pub(crate) fn to_page(envelope: &Envelope) -> Value {
    tag_page_message(BRIDGE_SOURCE, envelope)
}

pub(crate) fn snapshot_request() -> Envelope {
    Envelope::to_coordinator(Role::Bridge, Message::SnapshotRequest)
}
