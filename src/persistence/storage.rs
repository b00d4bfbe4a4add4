//! Keyed JSON storage areas with change notification.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use log::debug;
use serde_json::Value;

use crate::broadcast::{Broadcast, SubscriptionId};
use crate::Error;

/// Raw key/value operations of a storage area.
pub trait StorageBackend: Send + Sync + fmt::Debug {
    fn get(&self, key: &str) -> Result<Option<Value>, Error>;
    fn set(&self, key: &str, value: &Value) -> Result<(), Error>;
    fn remove(&self, key: &str) -> Result<(), Error>;
    fn keys(&self) -> Result<Vec<String>, Error>;
}

/// Storage that lives as long as the process. Used for session scoped areas and in tests.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Value>, Error> {
        let entries = self.entries.read()?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), Error> {
        let mut entries = self.entries.write()?;
        entries.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        let mut entries = self.entries.write()?;
        entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, Error> {
        let entries = self.entries.read()?;
        Ok(entries.keys().cloned().collect())
    }
}

/// Storage persisted as one `<key>.json` file per entry under a directory.
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Opens (and creates if needed) a storage directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> Result<PathBuf, Error> {
        let valid = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(Error::Simple(format!("invalid storage key: {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl StorageBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<Value>, Error> {
        match fs::read_to_string(self.path(key)?) {
            Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), Error> {
        let path = self.path(key)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(value)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        match fs::remove_file(self.path(key)?) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>, Error> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Notification published after a key is written or removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
}

/// A storage area: a backend plus change notification.
#[derive(Debug)]
pub struct Storage {
    backend: Box<dyn StorageBackend>,
    changes: Broadcast<StorageChange>,
}

impl Storage {
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            changes: Broadcast::new(),
        }
    }

    /// In-memory area, shared behind an `Arc` so it can outlive a coordinator instance.
    pub fn memory() -> Arc<Storage> {
        Arc::new(Storage::new(MemoryBackend::new()))
    }

    /// File backed area rooted at `dir`.
    pub fn files(dir: impl AsRef<Path>) -> Result<Arc<Storage>, Error> {
        Ok(Arc::new(Storage::new(FileBackend::open(dir)?)))
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>, Error> {
        self.backend.get(key)
    }

    pub fn set(&self, key: &str, value: &Value) -> Result<(), Error> {
        self.backend.set(key, value)?;
        self.notify(key);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), Error> {
        self.backend.remove(key)?;
        self.notify(key);
        Ok(())
    }

    pub fn keys(&self) -> Result<Vec<String>, Error> {
        self.backend.keys()
    }

    /// Registers a listener for writes and removals.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&StorageChange) + Send + Sync + 'static,
    {
        self.changes.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.changes.unsubscribe(id)
    }

    fn notify(&self, key: &str) {
        debug!("storage changed: {key}");
        self.changes.publish(&StorageChange { key: key.to_string() });
    }
}
