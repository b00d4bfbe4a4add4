//! Interception hook for a page's network calls.
//!
//! A [Page] owns the page message channel and the real network. Once the hook is installed,
//! every fetch-style and XHR-style call goes through classification. GraphQL calls with an
//! activated mock are answered locally after the mock's delay, without touching the network.
//! Other GraphQL calls go to the network once and their JSON responses are captured. Anything
//! else passes through untouched. Captures and mock updates travel as tagged page messages,
//! which the bridge relays to and from the coordinator.
//!
//! Failures while classifying or capturing never reach the caller: the call behaves as if
//! no hook were installed.

mod classify;
mod global;
mod http;
mod mock_table;
mod xhr;

#[cfg(feature = "sync")]
pub mod sync;

#[cfg(feature = "async")]
pub mod r#async;

pub use classify::{classify, GraphQLCall, GRAPHQL_PATH};
pub use global::{HookGlobal, ANY_MESSAGE};
pub use http::{Blob, HttpRequest, HttpResponse, ResponseType, XhrBody};
pub use mock_table::{MockEntry, MockTable};
pub use xhr::{ReadyState, XhrEvent, XhrSnapshot};

/// Threaded page context.
#[cfg(feature = "sync")]
pub mod blocking {
    pub use super::sync::{Network, Page, XmlHttpRequest};
}

#[cfg(feature = "async")]
pub use r#async::{Network, Page, XmlHttpRequest};
#[cfg(all(feature = "sync", not(feature = "async")))]
pub use sync::{Network, Page, XmlHttpRequest};
