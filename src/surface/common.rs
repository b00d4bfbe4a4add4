use std::collections::BTreeMap;
use std::time::Duration;

use crate::connection::{ReconnectPolicy, KEEP_ALIVE_INTERVAL};
use crate::domain::{MockDefinition, Settings, StoreState, TabId};
use crate::messages::{ConnectionName, Envelope, Message, Role};
use crate::transfer::ExportFile;
use crate::Error;

/// Connection tuning for a UI surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceOptions {
    pub policy: ReconnectPolicy,
    pub keep_alive: Duration,
}

impl SurfaceOptions {
    pub fn policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = interval;
        self
    }
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            policy: ReconnectPolicy::default(),
            keep_alive: KEEP_ALIVE_INTERVAL,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceStatus {
    Connected,
    /// The connection dropped and reconnection attempts are under way.
    Reconnecting,
    /// Every reconnection attempt failed. The surface stays offline until reopened.
    GaveUp,
    Closed,
}

/// What a surface knows about its tab: the last snapshot and the working copy of mocks
/// that local edits build on until the next snapshot arrives.
#[derive(Debug)]
pub(crate) struct SurfaceModel {
    pub(crate) snapshot: Option<StoreState>,
    pub(crate) revision: u64,
    pub(crate) status: SurfaceStatus,
    mocks: BTreeMap<String, MockDefinition>,
    settings: Settings,
}

impl SurfaceModel {
    pub(crate) fn new() -> Self {
        Self {
            snapshot: None,
            revision: 0,
            status: SurfaceStatus::Connected,
            mocks: BTreeMap::new(),
            settings: Settings::default(),
        }
    }

    pub(crate) fn apply_snapshot(&mut self, state: StoreState) {
        self.mocks = state.custom_responses.clone();
        self.settings = state.settings;
        self.snapshot = Some(state);
        self.revision += 1;
    }

    pub(crate) fn settings(&self) -> Settings {
        self.settings
    }

    pub(crate) fn mock(&self, operation_name: &str) -> Option<&MockDefinition> {
        self.mocks.get(operation_name)
    }

    /// Mock updates carry the whole list, so they must start from the tab's real mocks.
    fn synchronized(&self) -> Result<(), Error> {
        match self.snapshot {
            Some(_) => Ok(()),
            None => Err(Error::NotSynchronized),
        }
    }

    /// Full replacement list with `mock` inserted or replaced.
    pub(crate) fn upsert(&mut self, mock: MockDefinition) -> Result<Message, Error> {
        self.synchronized()?;
        self.mocks.insert(mock.operation_name.clone(), mock);
        Ok(self.mock_update(None))
    }

    /// Full replacement list without `operation_name`, plus its removal marker.
    pub(crate) fn delete(&mut self, operation_name: &str) -> Result<Message, Error> {
        self.synchronized()?;
        self.mocks.remove(operation_name);
        Ok(self.mock_update(Some(MockDefinition::removal(operation_name))))
    }

    /// Flips activation of an existing mock. Returns the new flag with the update to send.
    pub(crate) fn toggle(&mut self, operation_name: &str) -> Result<Option<(bool, Message)>, Error> {
        self.synchronized()?;
        let Some(mock) = self.mocks.get_mut(operation_name) else {
            return Ok(None);
        };
        mock.activated = !mock.activated;
        let activated = mock.activated;
        Ok(Some((activated, self.mock_update(None))))
    }

    pub(crate) fn update_settings(&mut self, settings: Settings) -> Message {
        self.settings = settings;
        Message::SettingsUpdate { settings }
    }

    /// One upsert per imported entry, followed by the imported settings.
    pub(crate) fn import(&mut self, file: &ExportFile) -> Result<Vec<Message>, Error> {
        self.synchronized()?;
        let mut messages = Vec::with_capacity(file.custom_responses.len() + 1);
        for mock in &file.custom_responses {
            if mock.is_removal() {
                messages.push(self.delete(&mock.operation_name)?);
            } else {
                messages.push(self.upsert(mock.clone())?);
            }
        }
        messages.push(self.update_settings(file.settings));
        Ok(messages)
    }

    pub(crate) fn export(&self) -> ExportFile {
        let state = StoreState {
            custom_responses: self.mocks.clone(),
            settings: self.settings,
            ..StoreState::default()
        };
        ExportFile::new(&state)
    }

    fn mock_update(&self, marker: Option<MockDefinition>) -> Message {
        let mut custom_responses: Vec<MockDefinition> = self.mocks.values().cloned().collect();
        custom_responses.extend(marker);
        Message::MockUpdate { custom_responses }
    }
}

pub(crate) fn connection_name(tab_id: TabId) -> String {
    ConnectionName::ui_surface(tab_id).to_string()
}

pub(crate) fn envelope(msg: Message) -> Envelope {
    Envelope::to_coordinator(Role::UiSurface, msg)
}
