//! Small persisted key/value store for viewer preferences.
//!
//! Storage problems never reach callers: an unreadable or unwritable file
//! demotes the store to memory for the rest of the session.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
enum PrefsError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid preferences file: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Debug)]
enum Backing {
    File(PathBuf),
    Memory,
}

#[derive(Debug)]
pub struct Preferences {
    backing: Backing,
    values: BTreeMap<String, String>,
}

impl Preferences {
    pub fn in_memory() -> Self {
        Self {
            backing: Backing::Memory,
            values: BTreeMap::new(),
        }
    }

    /// Opens the store at `path`. A missing file is an empty store.
    pub fn open(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            return Self::in_memory();
        };
        match load(&path) {
            Ok(values) => {
                debug!(target = "botlog.prefs", path = %path.display(), count = values.len(), "loaded preferences");
                Self {
                    backing: Backing::File(path),
                    values,
                }
            }
            Err(err) => {
                warn!(target = "botlog.prefs", path = %path.display(), error = %err, "preferences unavailable; keeping them in memory");
                Self::in_memory()
            }
        }
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self.backing, Backing::File(_))
    }

    pub fn get_bool(&self, page: &str, name: &str, default: bool) -> bool {
        match self.values.get(&key(page, name)).map(String::as_str) {
            Some("true") => true,
            Some("false") => false,
            _ => default,
        }
    }

    pub fn set_bool(&mut self, page: &str, name: &str, value: bool) {
        self.values.insert(key(page, name), value.to_string());
        if let Backing::File(path) = &self.backing {
            if let Err(err) = store(path, &self.values) {
                warn!(target = "botlog.prefs", path = %path.display(), error = %err, "failed to save preferences; keeping them in memory");
                self.backing = Backing::Memory;
            }
        }
    }
}

fn key(page: &str, name: &str) -> String {
    format!("{page}:{name}")
}

fn load(path: &Path) -> Result<BTreeMap<String, String>, PrefsError> {
    match fs::read_to_string(path) {
        Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
        Ok(raw) => Ok(serde_json::from_str(&raw)?),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(err) => Err(err.into()),
    }
}

fn store(path: &Path, values: &BTreeMap<String, String>) -> Result<(), PrefsError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, serde_json::to_vec_pretty(values)?)?;
    Ok(())
}
