// Persistent credential stores.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use pdm_api::{CredentialStore, Error};
use tracing::debug;

use crate::ConfigError;

/// Service name keyring entries are filed under.
pub const KEYRING_SERVICE: &str = "pdm";

// ── File ────────────────────────────────────────────────────────────

/// Flat TOML table on disk. Every write replaces the file atomically.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileCredentialStore {
    /// Open `path`, starting empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text).map_err(|source| ConfigError::CredentialFile {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string(entries).map_err(std::io::Error::other)?;
        let tmp = self.path.with_extension("toml.tmp");
        write_private(&tmp, text.as_bytes())?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), keys = entries.len(), "credential file written");
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), Error> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = entries.clone();
        apply(&mut next);
        if next == *entries {
            return Ok(());
        }
        self.persist(&next)
            .map_err(|e| Error::Store(format!("{}: {e}", self.path.display())))?;
        *entries = next;
        Ok(())
    }
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, bytes)
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.update(|entries| {
            entries.insert(key.to_owned(), value.to_owned());
        })
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

// ── Keyring ─────────────────────────────────────────────────────────

/// One system keyring entry per key.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, keyring::Error> {
        keyring::Entry::new(&self.service, key)
    }
}

fn store_error(key: &str, err: &keyring::Error) -> Error {
    Error::Store(format!("keyring entry '{key}': {err}"))
}

impl CredentialStore for KeyringCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.entry(key).and_then(|entry| entry.get_password()) {
            Ok(value) => Some(value),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                debug!(key, "keyring read failed: {e}");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.entry(key)
            .and_then(|entry| entry.set_password(value))
            .map_err(|e| store_error(key, &e))
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        match self.entry(key).and_then(|entry| entry.delete_credential()) {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(store_error(key, &e)),
        }
    }
}
