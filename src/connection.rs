//! Connections between the coordinator and its clients.
//!
//! An [Endpoint](sync::Endpoint) plays the part of the host platform's connect primitive:
//! a coordinator binds to it and clients (bridges and UI surfaces) open named connections
//! through it. Each side only ever sees message passing, never shared state.

pub mod common;

pub use common::{ConnectionId, LinkEvent, Port, ReconnectPolicy, KEEP_ALIVE_INTERVAL, MAX_RECONNECT_ATTEMPTS, RECONNECT_DELAY};

#[cfg(feature = "sync")]
pub mod sync;

#[cfg(feature = "async")]
pub mod r#async;

/// Threaded connection types.
#[cfg(feature = "sync")]
pub mod blocking {
    pub use super::sync::{Connect, Connection, Endpoint};
}

#[cfg(feature = "async")]
pub use r#async::{Connect, Connection, Endpoint};
#[cfg(all(feature = "sync", not(feature = "async")))]
pub use sync::{Connect, Connection, Endpoint};
