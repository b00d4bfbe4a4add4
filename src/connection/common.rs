//! Connection pieces shared between the sync and async implementations

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::messages::Envelope;
use crate::Error;

/// Maximum number of reconnection attempts made by a bridge or UI surface.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Fixed delay before each reconnection attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Interval between keep-alive pings sent by an open UI surface.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(20);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process unique identifier of one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Sending half the coordinator keeps for each connection.
pub trait Port: Send + fmt::Debug {
    fn post(&self, envelope: Envelope) -> Result<(), Error>;
}

#[cfg(feature = "sync")]
impl Port for crossbeam::channel::Sender<Envelope> {
    fn post(&self, envelope: Envelope) -> Result<(), Error> {
        self.send(envelope).map_err(|_| Error::Disconnected)
    }
}

#[cfg(feature = "async")]
impl Port for tokio::sync::mpsc::UnboundedSender<Envelope> {
    fn post(&self, envelope: Envelope) -> Result<(), Error> {
        self.send(envelope).map_err(|_| Error::Disconnected)
    }
}

/// Connection lifecycle and traffic as seen by the coordinator.
#[derive(Debug)]
pub enum LinkEvent {
    /// A client opened a connection under a declared `{role}/{tab_id}` name.
    Connected {
        id: ConnectionId,
        name: String,
        port: Box<dyn Port>,
    },
    /// A client posted an envelope.
    Message { id: ConnectionId, envelope: Envelope },
    /// A client closed its end.
    Disconnected { id: ConnectionId },
}

/// Bounded reconnection with a fixed delay.
///
/// After `max_attempts` failures the caller gives up; recovering from there needs outside action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// Delay before the given attempt (1 based), `None` once attempts are exhausted.
    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            None
        } else {
            Some(self.delay)
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(MAX_RECONNECT_ATTEMPTS, RECONNECT_DELAY)
    }
}
