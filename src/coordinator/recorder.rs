//! The MessageRecorder logs every envelope the coordinator receives or sends.
//! Recording is enabled by setting the environment variable GQLMOCK_RECORDING_DIR
//! to the directory that should hold the recordings, e.g. /tmp/gqlmock
//! /tmp/gqlmock/2024-11-02-10-41-0/0001-inbound.json
//! /tmp/gqlmock/2024-11-02-10-41-0/0002-outbound.json

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::warn;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::messages::Envelope;
use crate::Error;

pub const RECORDING_DIR_VAR: &str = "GQLMOCK_RECORDING_DIR";

static RECORDING_SEQ: AtomicUsize = AtomicUsize::new(0);
static RECORDER_ID: AtomicUsize = AtomicUsize::new(0);

#[derive(Clone, Debug, Default)]
pub struct MessageRecorder {
    recording_dir: Option<PathBuf>,
}

impl MessageRecorder {
    /// A recorder writing under `recording_dir`, which must exist.
    pub fn new(recording_dir: impl Into<PathBuf>) -> Self {
        Self {
            recording_dir: Some(recording_dir.into()),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        match env::var(RECORDING_DIR_VAR) {
            Ok(dir) if !dir.is_empty() => match Self::create(Path::new(&dir)) {
                Ok(recorder) => recorder,
                Err(e) => {
                    warn!("message recording disabled, cannot prepare {dir}: {e}");
                    Self::disabled()
                }
            },
            _ => Self::disabled(),
        }
    }

    fn create(root: &Path) -> Result<Self, Error> {
        let format = format_description!("[year]-[month]-[day]-[hour]-[minute]");
        let now = OffsetDateTime::now_utc();
        let instance_id = RECORDER_ID.fetch_add(1, Ordering::SeqCst);

        let recording_dir = root.join(format!("{}-{}", now.format(&format)?, instance_id));
        fs::create_dir_all(&recording_dir)?;

        Ok(Self::new(recording_dir))
    }

    pub fn is_enabled(&self) -> bool {
        self.recording_dir.is_some()
    }

    pub fn recording_dir(&self) -> Option<&Path> {
        self.recording_dir.as_deref()
    }

    pub fn record_inbound(&self, envelope: &Envelope) {
        self.record(envelope, "inbound");
    }

    pub fn record_outbound(&self, envelope: &Envelope) {
        self.record(envelope, "outbound");
    }

    fn record(&self, envelope: &Envelope, direction: &str) {
        let Some(dir) = &self.recording_dir else {
            return;
        };

        let record_id = RECORDING_SEQ.fetch_add(1, Ordering::SeqCst);
        let path = dir.join(format!("{record_id:04}-{direction}.json"));

        let written = serde_json::to_vec_pretty(envelope)
            .map_err(Error::from)
            .and_then(|data| fs::write(&path, data).map_err(Error::from));
        if let Err(e) = written {
            warn!("failed to record {direction} message to {}: {e}", path.display());
        }
    }
}
