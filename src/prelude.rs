//! A prelude module for convenient importing of commonly used types and traits.
//!
//! Instead of importing each type individually:
//!
//! ```rust
//! use gqlmock::coordinator::{Coordinator, CoordinatorOptions};
//! use gqlmock::domain::{MockDefinition, Settings};
//! use gqlmock::surface::Surface;
//! ```
//!
//! You can simply use:
//!
//! ```rust
//! use gqlmock::prelude::*;
//! ```

pub use crate::Error;

// Data model
pub use crate::domain::{Badge, CapturedResponse, MockDefinition, Settings, StoreState, TabId, Theme};
pub use crate::messages::{ConnectionName, Envelope, Message, Role};

// Channels
pub use crate::broadcast::{Broadcast, PageChannel};
pub use crate::live::{LiveChannel, LiveUpdate, PopoutEditor};

// Connections and hosts, in the flavour selected by features
pub use crate::bridge::Bridge;
pub use crate::connection::{Connect, Connection, Endpoint, ReconnectPolicy};
pub use crate::coordinator::{Coordinator, CoordinatorOptions};
pub use crate::hook::{HttpRequest, HttpResponse, Network, Page, ResponseType, XhrBody, XhrEvent};
pub use crate::surface::{Surface, SurfaceOptions, SurfaceStatus};

// Persistence and transfer
pub use crate::persistence::Storage;
pub use crate::transfer::ExportFile;
