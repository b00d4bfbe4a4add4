//! Persistence of per-tab sessions and global settings.
//!
//! Two storage areas are involved. The session area holds one [SessionRecord] per tab and
//! is expected to be cleared when the browser session ends. The durable area holds only
//! the global [Settings].

use std::collections::BTreeMap;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::domain::{CapturedResponse, MockDefinition, Settings, StoreState, TabId};
use crate::Error;

mod storage;

pub use storage::{FileBackend, MemoryBackend, Storage, StorageBackend, StorageChange};

/// Key of the settings record in the durable area.
pub const SETTINGS_KEY: &str = "settings";

const SESSION_KEY_PREFIX: &str = "tab-";

/// Persisted state of one tab.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub tab_id: TabId,
    #[serde(default)]
    pub responses: BTreeMap<String, Vec<CapturedResponse>>,
    #[serde(default)]
    pub custom_responses: BTreeMap<String, MockDefinition>,
    #[serde(default)]
    pub settings: Settings,
}

impl SessionRecord {
    pub fn from_state(tab_id: TabId, state: &StoreState) -> Self {
        Self {
            tab_id,
            responses: state.responses.clone(),
            custom_responses: state.custom_responses.clone(),
            settings: state.settings,
        }
    }

    /// Storage key of a tab's session record.
    pub fn key(tab_id: TabId) -> String {
        format!("{SESSION_KEY_PREFIX}{tab_id}")
    }
}

/// Returns the tab id encoded in a session key.
pub fn parse_session_key(key: &str) -> Option<TabId> {
    key.strip_prefix(SESSION_KEY_PREFIX)?.parse().ok()
}

pub fn save_session(storage: &Storage, record: &SessionRecord) -> Result<(), Error> {
    let value = serde_json::to_value(record)?;
    storage.set(&SessionRecord::key(record.tab_id), &value)
}

pub fn remove_session(storage: &Storage, tab_id: TabId) -> Result<(), Error> {
    storage.remove(&SessionRecord::key(tab_id))
}

/// Ids of every tab with a persisted session.
pub fn session_tabs(storage: &Storage) -> Result<Vec<TabId>, Error> {
    Ok(storage.keys()?.iter().filter_map(|key| parse_session_key(key)).collect())
}

/// Loads every persisted session. Records that fail to decode are skipped.
pub fn load_sessions(storage: &Storage) -> Result<Vec<SessionRecord>, Error> {
    let mut records = Vec::new();

    for tab_id in session_tabs(storage)? {
        let Some(value) = storage.get(&SessionRecord::key(tab_id))? else {
            continue;
        };

        match serde_json::from_value::<SessionRecord>(value) {
            Ok(record) => records.push(record),
            Err(e) => warn!("skipping unreadable session record for tab {tab_id}: {e}"),
        }
    }

    Ok(records)
}

/// Loads the global settings. A missing record means first run and yields the defaults.
pub fn load_settings(storage: &Storage) -> Result<Settings, Error> {
    match storage.get(SETTINGS_KEY)? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(Settings::default()),
    }
}

pub fn save_settings(storage: &Storage, settings: &Settings) -> Result<(), Error> {
    storage.set(SETTINGS_KEY, &serde_json::to_value(settings)?)
}
