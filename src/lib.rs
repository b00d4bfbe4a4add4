//! Per-tab GraphQL traffic capture and response mocking.
//!
//! The crate models the contexts of a GraphQL mocking tool as independent parties that only
//! exchange messages:
//!
//! - the [interception hook](crate::hook) inside a page classifies outgoing calls, serves
//!   activated mocks and captures real responses,
//! - the [bridge](crate::bridge) relays envelopes between the page channel and the coordinator,
//! - the [coordinator](crate::coordinator) owns one [store](crate::store) per tab, applies
//!   mutations one at a time, fans snapshots out, and persists sessions,
//! - [UI surfaces](crate::surface) show snapshots and send mutation intents.
//!
//! Threaded implementations are enabled by the default `sync` feature. The `async` feature adds
//! tokio based ones; with both enabled the async types are exported at module root and the
//! threaded ones live under each module's `blocking` namespace.
//!
//!```no_run
//!     use std::sync::Arc;
//!     use std::time::Duration;
//!
//!     use gqlmock::broadcast::PageChannel;
//!     use gqlmock::bridge::blocking::Bridge;
//!     use gqlmock::connection::blocking::Endpoint;
//!     use gqlmock::coordinator::blocking::Coordinator;
//!     use gqlmock::coordinator::CoordinatorOptions;
//!     use gqlmock::domain::MockDefinition;
//!     use gqlmock::surface::blocking::Surface;
//!
//!     fn main() -> Result<(), gqlmock::Error> {
//!         let endpoint = Endpoint::new();
//!         let options = CoordinatorOptions::from_env()?;
//!         let _coordinator = Coordinator::start(&endpoint, options.clone())?;
//!
//!         let page = Arc::new(PageChannel::new());
//!         let _bridge = Bridge::attach(1, page, endpoint.clone(), Arc::clone(options.session()))?;
//!
//!         let surface = Surface::open(1, endpoint.clone())?;
//!         surface.wait_for(Duration::from_secs(1), |_| true);
//!         surface.save_mock_text("GetUser", r#"{"data": {"user": null}}"#)?;
//!         let state = surface.wait_for(Duration::from_secs(1), |state| !state.custom_responses.is_empty());
//!         println!("{state:?}");
//!
//!         Ok(())
//!     }
//!```

#[cfg(not(any(feature = "sync", feature = "async")))]
compile_error!("enable at least one of the `sync` or `async` features");

/// Bridge between a page and the coordinator.
pub mod bridge;

/// In-process publish/subscribe.
pub mod broadcast;

/// Connections between the coordinator and its clients.
pub mod connection;

/// Coordinator owning every tab's store.
pub mod coordinator;

/// Data carried by snapshots, captures and mocks.
pub mod domain;

mod errors;

/// Interception of a page's network calls.
pub mod hook;

/// Cross-window updates for pop-out editors.
pub mod live;

/// Envelope and message types.
pub mod messages;

/// Session and settings persistence.
pub mod persistence;

pub mod prelude;

/// Per-tab state and its mutations.
pub mod store;

/// UI surface client.
pub mod surface;

/// Export and import file format.
pub mod transfer;

pub use errors::Error;
