//! The coordinator: single owner of every tab's [Store](crate::store::Store).
//!
//! A coordinator binds to an [Endpoint](crate::connection::Endpoint) and processes one
//! inbound event at a time to completion, fan-out included. After each mutation it pushes
//! a fresh snapshot to the tab's UI surfaces and bridge, persists every tab to the session
//! area and recomputes the tab's badge. Global settings live in the durable area and are
//! loaded before any session is restored.
//!
//! Hosts run the same core either on a dedicated thread ([blocking::Coordinator]) or on a
//! tokio task. With an idle timeout configured, a host that sees no inbound traffic for that
//! long stops, the same way a browser suspends an idle background worker. A new host bound
//! to the same endpoint and storage picks up where the old one left off.

use std::env;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{Badge, TabId};
use crate::persistence::Storage;
use crate::Error;

pub(crate) mod common;
pub mod recorder;
pub mod routing;

#[cfg(feature = "sync")]
pub mod sync;

#[cfg(feature = "async")]
pub mod r#async;

pub use recorder::MessageRecorder;
pub use routing::{determine_routing, RoutingDecision};

/// Threaded coordinator host.
#[cfg(feature = "sync")]
pub mod blocking {
    pub use super::sync::Coordinator;
}

#[cfg(feature = "async")]
pub use r#async::Coordinator;
#[cfg(all(feature = "sync", not(feature = "async")))]
pub use sync::Coordinator;

/// Environment variable selecting a directory for file backed storage.
pub const STORAGE_DIR_VAR: &str = "GQLMOCK_STORAGE_DIR";

/// Callback invoked with a tab's new badge whenever it changes.
pub type BadgeObserver = Arc<dyn Fn(TabId, Badge) + Send + Sync>;

/// Configuration of a coordinator host.
#[derive(Clone)]
pub struct CoordinatorOptions {
    pub(crate) session: Arc<Storage>,
    pub(crate) durable: Arc<Storage>,
    pub(crate) idle_timeout: Option<Duration>,
    pub(crate) badge_observer: Option<BadgeObserver>,
    pub(crate) recorder: MessageRecorder,
}

impl CoordinatorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options taken from the environment.
    ///
    /// `GQLMOCK_STORAGE_DIR` selects file backed areas under `<dir>/durable` and `<dir>/session`;
    /// unset or empty keeps both in memory. `GQLMOCK_RECORDING_DIR` enables message recording.
    pub fn from_env() -> Result<Self, Error> {
        let mut options = Self::default().recorder(MessageRecorder::from_env());

        if let Ok(dir) = env::var(STORAGE_DIR_VAR) {
            if !dir.is_empty() {
                let dir = Path::new(&dir);
                options = options
                    .durable_storage(Storage::files(dir.join("durable"))?)
                    .session_storage(Storage::files(dir.join("session"))?);
            }
        }

        Ok(options)
    }

    /// Area holding per-tab sessions.
    pub fn session_storage(mut self, storage: Arc<Storage>) -> Self {
        self.session = storage;
        self
    }

    /// Area holding global settings.
    pub fn durable_storage(mut self, storage: Arc<Storage>) -> Self {
        self.durable = storage;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn badge_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(TabId, Badge) + Send + Sync + 'static,
    {
        self.badge_observer = Some(Arc::new(observer));
        self
    }

    pub fn recorder(mut self, recorder: MessageRecorder) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn session(&self) -> &Arc<Storage> {
        &self.session
    }

    pub fn durable(&self) -> &Arc<Storage> {
        &self.durable
    }
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            session: Storage::memory(),
            durable: Storage::memory(),
            idle_timeout: None,
            badge_observer: None,
            recorder: MessageRecorder::disabled(),
        }
    }
}

impl fmt::Debug for CoordinatorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinatorOptions")
            .field("session", &self.session)
            .field("durable", &self.durable)
            .field("idle_timeout", &self.idle_timeout)
            .field("badge_observer", &self.badge_observer.is_some())
            .field("recorder", &self.recorder)
            .finish()
    }
}
