//! The authoritative per-tab aggregate.
//!
//! A [Store] is owned by the coordinator and only changes through [Mutation]s. Every
//! other component works on [StoreState] snapshots.

use log::debug;

use crate::domain::{Badge, CapturedResponse, MockDefinition, Settings, StoreState};
use crate::messages::Message;
use crate::persistence::SessionRecord;

/// Number of captured responses retained per operation name.
pub const MAX_CAPTURED_PER_OPERATION: usize = 10;

/// Lifecycle phase of a store. Removal is handled by the coordinator dropping the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorePhase {
    /// No captured responses and no mocks.
    Empty,
    /// Has captured data and/or mocks.
    Populated,
}

/// Mutation intents applied inside the coordinator.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    /// Record captured responses, newest first, capped per operation.
    Capture(Vec<CapturedResponse>),
    /// Replace the whole mock table. Removal markers are omitted.
    SetMocks(Vec<MockDefinition>),
    /// Replace settings wholesale.
    SetSettings(Settings),
    /// Empty captured responses and mocks, keeping settings.
    ClearAll,
    /// Merge a persisted session into the store.
    Restore(SessionRecord),
}

impl Mutation {
    /// Maps a message addressed to the coordinator onto a mutation intent.
    ///
    /// Messages that do not mutate a store (snapshot requests, keep-alives, snapshots) yield `None`.
    pub fn from_message(message: &Message) -> Option<Mutation> {
        match message {
            Message::ResponseCaptured { responses } => Some(Mutation::Capture(responses.clone())),
            Message::MockUpdate { custom_responses } => Some(Mutation::SetMocks(custom_responses.clone())),
            Message::SettingsUpdate { settings } => Some(Mutation::SetSettings(*settings)),
            Message::ClearAll => Some(Mutation::ClearAll),
            Message::SnapshotRequest | Message::Snapshot(_) | Message::KeepAlivePing => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Store {
    state: StoreState,
}

impl Store {
    /// Creates an empty store using the given settings.
    pub fn new(settings: Settings) -> Self {
        Store {
            state: StoreState {
                settings,
                ..StoreState::default()
            },
        }
    }

    pub fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::Capture(responses) => {
                for response in responses {
                    self.capture(response);
                }
            }
            Mutation::SetMocks(mocks) => self.set_mocks(mocks),
            Mutation::SetSettings(settings) => self.set_settings(settings),
            Mutation::ClearAll => self.clear_all(),
            Mutation::Restore(record) => self.restore(record),
        }
    }

    /// Records one captured response under its operation name.
    ///
    /// The list stays ordered newest first by timestamp and is truncated to [MAX_CAPTURED_PER_OPERATION].
    pub fn capture(&mut self, response: CapturedResponse) {
        let history = self.state.responses.entry(response.operation_name.clone()).or_default();

        let position = history
            .iter()
            .position(|existing| existing.timestamp <= response.timestamp)
            .unwrap_or(history.len());
        history.insert(position, response);
        history.truncate(MAX_CAPTURED_PER_OPERATION);
    }

    /// Replaces the entire mock table.
    pub fn set_mocks(&mut self, mocks: Vec<MockDefinition>) {
        self.state.custom_responses.clear();
        for mock in mocks {
            self.upsert_mock(mock);
        }
    }

    /// Inserts or replaces a single mock. A removal marker deletes the entry.
    pub fn upsert_mock(&mut self, mock: MockDefinition) {
        if mock.is_removal() {
            self.state.custom_responses.remove(&mock.operation_name);
        } else {
            self.state.custom_responses.insert(mock.operation_name.clone(), mock);
        }
    }

    pub fn set_settings(&mut self, settings: Settings) {
        self.state.settings = settings;
    }

    pub fn clear_all(&mut self) {
        self.state.responses.clear();
        self.state.custom_responses.clear();
    }

    /// Merges a persisted session. Accumulates instead of replacing.
    pub fn restore(&mut self, record: SessionRecord) {
        debug!(
            "restoring tab {}: {} operations, {} mocks",
            record.tab_id,
            record.responses.len(),
            record.custom_responses.len()
        );

        for response in record.responses.into_values().flatten() {
            self.capture(response);
        }
        for mock in record.custom_responses.into_values() {
            self.upsert_mock(mock);
        }
    }

    pub fn phase(&self) -> StorePhase {
        if self.state.responses.values().all(|history| history.is_empty()) && self.state.custom_responses.is_empty() {
            StorePhase::Empty
        } else {
            StorePhase::Populated
        }
    }

    /// Captured responses for an operation, newest first.
    pub fn responses(&self, operation_name: &str) -> &[CapturedResponse] {
        self.state.responses.get(operation_name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn mock(&self, operation_name: &str) -> Option<&MockDefinition> {
        self.state.custom_responses.get(operation_name)
    }

    pub fn settings(&self) -> &Settings {
        &self.state.settings
    }

    pub fn state(&self) -> &StoreState {
        &self.state
    }

    pub fn snapshot(&self) -> StoreState {
        self.state.clone()
    }

    pub fn badge(&self) -> Badge {
        Badge::compute(&self.state)
    }
}
