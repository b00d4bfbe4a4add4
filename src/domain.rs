use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::Error;

/// Identifies the browser tab a store, connection or persisted record belongs to.
pub type TabId = i32;

/// Operation name used when a GraphQL request does not name its operation.
pub const UNKNOWN_OPERATION: &str = "unknown";

/// One observed GraphQL call and its response.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CapturedResponse {
    /// The client supplied operation name, [UNKNOWN_OPERATION] when absent.
    pub operation_name: String,
    /// GraphQL query text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Variables sent with the query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Map<String, Value>>,
    /// Response body as observed by the page (or the mock that replaced it).
    pub response: Value,
    /// Capture time in milliseconds since the unix epoch.
    pub timestamp: i64,
    /// Target URL of the request.
    pub url: String,
    /// Elapsed time between issuing the call and reading its body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

/// A user authored replacement response for one operation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MockDefinition {
    pub operation_name: String,
    /// Mock body. `None` is the "no mock" marker: a definition carrying it is removed rather than stored.
    #[serde(default)]
    pub custom_response: Option<Value>,
    #[serde(default)]
    pub activated: bool,
    /// Delay in milliseconds before the mocked response is released.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
}

impl MockDefinition {
    /// Creates an activated mock with no delay.
    pub fn new(operation_name: impl Into<String>, body: Value) -> Self {
        Self {
            operation_name: operation_name.into(),
            custom_response: Some(body),
            activated: true,
            delay: None,
        }
    }

    /// Creates the deletion marker for an operation.
    pub fn removal(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            custom_response: None,
            activated: false,
            delay: None,
        }
    }

    pub fn activated(mut self, activated: bool) -> Self {
        self.activated = activated;
        self
    }

    pub fn delay(mut self, delay_ms: u64) -> Self {
        self.delay = Some(delay_ms);
        self
    }

    /// Builds an activated mock from JSON text typed by a user.
    ///
    /// Text that is not JSON, or is `null`, is rejected with [Error::InvalidMockBody].
    pub fn parse(operation_name: impl Into<String>, text: &str) -> Result<Self, Error> {
        let operation_name = operation_name.into();
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Null) => Err(Error::InvalidMockBody(format!("{operation_name}: a mock body cannot be null"))),
            Ok(body) => Ok(Self::new(operation_name, body)),
            Err(e) => Err(Error::InvalidMockBody(format!("{operation_name}: {e}"))),
        }
    }

    /// True when this definition carries the "no mock" marker.
    pub fn is_removal(&self) -> bool {
        self.custom_response.is_none()
    }

    /// Configured delay, 0 when unset.
    pub fn delay_ms(&self) -> u64 {
        self.delay.unwrap_or(0)
    }
}

/// Presentation preference of the UI surfaces.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// Global, cross-tab configuration.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Master kill-switch for every mock in every tab.
    pub global_mock_enabled: bool,
    #[serde(default)]
    pub theme: Theme,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            global_mock_enabled: true,
            theme: Theme::default(),
        }
    }
}

/// The full per-tab state carried by a snapshot.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreState {
    /// Captured responses by operation name, newest first.
    #[serde(default)]
    pub responses: BTreeMap<String, Vec<CapturedResponse>>,
    /// Mock definitions by operation name.
    #[serde(default)]
    pub custom_responses: BTreeMap<String, MockDefinition>,
    #[serde(default)]
    pub settings: Settings,
}

impl StoreState {
    /// Mock definitions as a list, ordered by operation name.
    pub fn mock_list(&self) -> Vec<MockDefinition> {
        self.custom_responses.values().cloned().collect()
    }

    /// Number of activated mock definitions.
    pub fn activated_mocks(&self) -> usize {
        self.custom_responses.values().filter(|mock| mock.activated).count()
    }
}

/// Derived per-tab indicator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Badge {
    /// Number of activated mocks while mocking is globally enabled.
    Active(usize),
    /// Activated mocks exist but the global switch is off.
    Paused,
    /// No activated mocks.
    Cleared,
}

impl Badge {
    pub fn compute(state: &StoreState) -> Badge {
        let activated = state.activated_mocks();

        if activated == 0 {
            Badge::Cleared
        } else if state.settings.global_mock_enabled {
            Badge::Active(activated)
        } else {
            Badge::Paused
        }
    }

    /// Text rendered on the indicator, empty when cleared.
    pub fn text(&self) -> String {
        match self {
            Badge::Active(count) => count.to_string(),
            Badge::Paused => String::from("||"),
            Badge::Cleared => String::new(),
        }
    }
}

impl fmt::Display for Badge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text())
    }
}

/// Milliseconds since the unix epoch.
pub(crate) fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
