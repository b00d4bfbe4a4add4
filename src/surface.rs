//! UI surface client.
//!
//! A surface connects as `ui-surface/{tab_id}`, keeps the latest snapshot of its tab and
//! turns user intents into mutation messages for the coordinator. Mock edits are sent as
//! full replacement lists built on the surface's working copy, which is reset by every
//! snapshot. JSON typed by the user is validated before anything is sent. While open the
//! surface pings the coordinator every [KEEP_ALIVE_INTERVAL](crate::connection::KEEP_ALIVE_INTERVAL);
//! after a dropped connection it reconnects with a bounded policy and asks for a fresh
//! snapshot, so it never misses the final state even though intermediate snapshots are lost.

mod common;

#[cfg(feature = "sync")]
pub mod sync;

#[cfg(feature = "async")]
pub mod r#async;

pub use common::{SurfaceOptions, SurfaceStatus};

/// Threaded surface.
#[cfg(feature = "sync")]
pub mod blocking {
    pub use super::sync::Surface;
}

#[cfg(feature = "async")]
pub use r#async::Surface;
#[cfg(all(feature = "sync", not(feature = "async")))]
pub use sync::Surface;
