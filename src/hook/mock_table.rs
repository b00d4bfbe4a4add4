//! The hook's mirror of the tab's mocks and global switch.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::domain::{MockDefinition, Settings, StoreState};

#[derive(Clone, Debug, PartialEq)]
pub struct MockEntry {
    pub body: Value,
    pub activated: bool,
    pub delay: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MockTable {
    entries: HashMap<String, MockEntry>,
    global_enabled: bool,
}

impl MockTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            global_enabled: Settings::default().global_mock_enabled,
        }
    }

    /// Replaces every entry. Removal markers are skipped.
    pub fn replace(&mut self, mocks: &[MockDefinition]) {
        self.entries = mocks
            .iter()
            .filter_map(|mock| {
                let body = mock.custom_response.clone()?;
                let entry = MockEntry {
                    body,
                    activated: mock.activated,
                    delay: Duration::from_millis(mock.delay_ms()),
                };
                Some((mock.operation_name.clone(), entry))
            })
            .collect();
    }

    pub fn set_settings(&mut self, settings: &Settings) {
        self.global_enabled = settings.global_mock_enabled;
    }

    pub fn apply_snapshot(&mut self, state: &StoreState) {
        self.replace(&state.mock_list());
        self.set_settings(&state.settings);
    }

    /// The mock to serve for an operation: present, activated, and mocking globally enabled.
    pub fn lookup(&self, operation_name: &str) -> Option<&MockEntry> {
        if !self.global_enabled {
            return None;
        }
        self.entries.get(operation_name).filter(|entry| entry.activated)
    }

    pub fn global_enabled(&self) -> bool {
        self.global_enabled
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MockTable {
    fn default() -> Self {
        Self::new()
    }
}
