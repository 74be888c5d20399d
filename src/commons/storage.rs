//! Key-value storage for server state.
//!
//! A store is opened for a storage URI and a namespace. Values are JSON
//! documents addressed by a plain string key. Two backends are available:
//!
//! * `local:///some/path` (or `file:///some/path`) keeps each value in its
//!   own file below `<path>/<namespace>/`,
//! * `memory://<name>` keeps values in memory. Stores opened for the same
//!   name and namespace share their contents for the lifetime of the
//!   process.

use std::{fmt, io};
use std::collections::{BTreeMap, HashMap};
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use lazy_static::lazy_static;
use log::trace;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tempfile::NamedTempFile;
use url::Url;
use super::file;


//------------ Memory Locations ----------------------------------------------

type MemoryNamespace = Arc<Mutex<BTreeMap<String, Value>>>;

lazy_static! {
    static ref MEMORY: Mutex<HashMap<(String, String), MemoryNamespace>> = {
        Mutex::new(HashMap::new())
    };
}


//------------ KeyValueStore -------------------------------------------------

#[derive(Debug)]
pub struct KeyValueStore {
    backend: Backend,
}

#[derive(Debug)]
enum Backend {
    Disk(PathBuf),
    Memory(MemoryNamespace),
}

impl KeyValueStore {
    /// Opens the store for a namespace at the given storage URI.
    pub fn create(
        storage_uri: &Url, namespace: &str
    ) -> Result<Self, KeyValueError> {
        check_key(namespace)?;
        let backend = match storage_uri.scheme() {
            "local" | "file" => {
                if storage_uri.host_str().is_some_and(|h| !h.is_empty()) {
                    return Err(KeyValueError::UnknownLocation(
                        storage_uri.to_string()
                    ))
                }
                let root = PathBuf::from(storage_uri.path()).join(namespace);
                file::create_dir_all(&root).map_err(|err| {
                    KeyValueError::Io(err.to_string())
                })?;
                Backend::Disk(root)
            }
            "memory" => {
                let location = storage_uri.host_str().unwrap_or("").to_string();
                let mut memory = MEMORY.lock().expect("poisoned lock");
                Backend::Memory(
                    memory.entry(
                        (location, namespace.to_string())
                    ).or_default().clone()
                )
            }
            other => {
                return Err(KeyValueError::UnknownScheme(other.to_string()))
            }
        };
        Ok(KeyValueStore { backend })
    }

    /// Returns whether the store is empty.
    pub fn is_empty(&self) -> Result<bool, KeyValueError> {
        Ok(self.keys()?.is_empty())
    }

    /// Returns whether a value for the key exists.
    pub fn has(&self, key: &str) -> Result<bool, KeyValueError> {
        check_key(key)?;
        match &self.backend {
            Backend::Disk(root) => Ok(root.join(file_name(key)).exists()),
            Backend::Memory(map) => {
                Ok(map.lock().expect("poisoned lock").contains_key(key))
            }
        }
    }

    /// Returns the value stored under the key, if any.
    pub fn get<T: DeserializeOwned>(
        &self, key: &str
    ) -> Result<Option<T>, KeyValueError> {
        check_key(key)?;
        let value = match &self.backend {
            Backend::Disk(root) => {
                let path = root.join(file_name(key));
                match std::fs::read(&path) {
                    Ok(bytes) => {
                        serde_json::from_slice(&bytes).map_err(|err| {
                            KeyValueError::deserialize(key, err)
                        })?
                    }
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {
                        return Ok(None)
                    }
                    Err(err) => {
                        return Err(KeyValueError::Io(format!(
                            "cannot read '{}': {}", path.display(), err
                        )))
                    }
                }
            }
            Backend::Memory(map) => {
                match map.lock().expect("poisoned lock").get(key) {
                    Some(value) => value.clone(),
                    None => return Ok(None),
                }
            }
        };
        serde_json::from_value(value).map(Some).map_err(|err| {
            KeyValueError::deserialize(key, err)
        })
    }

    /// Stores a value, quietly overwriting an existing one.
    pub fn store<T: Serialize>(
        &self, key: &str, value: &T
    ) -> Result<(), KeyValueError> {
        check_key(key)?;
        match &self.backend {
            Backend::Disk(root) => {
                let path = root.join(file_name(key));

                // Write to a temporary file first so that a value is either
                // written entirely or not at all.
                let mut tmp_file = NamedTempFile::new_in(root).map_err(|err| {
                    KeyValueError::Io(format!(
                        "cannot create temp file for key '{key}': {err}"
                    ))
                })?;
                serde_json::to_writer_pretty(
                    BufWriter::new(&mut tmp_file), value
                ).map_err(|err| KeyValueError::serialize(key, err))?;
                tmp_file.persist(&path).map_err(|err| {
                    KeyValueError::Io(format!(
                        "cannot rename temp file to '{}': {}",
                        path.display(), err.error
                    ))
                })?;
                trace!("Stored key '{}' in {}", key, root.display());
            }
            Backend::Memory(map) => {
                let value = serde_json::to_value(value).map_err(|err| {
                    KeyValueError::serialize(key, err)
                })?;
                map.lock().expect("poisoned lock").insert(key.into(), value);
            }
        }
        Ok(())
    }

    /// Deletes the value for a key. Deleting a missing key is not an error.
    pub fn delete(&self, key: &str) -> Result<(), KeyValueError> {
        check_key(key)?;
        match &self.backend {
            Backend::Disk(root) => {
                let path = root.join(file_name(key));
                match std::fs::remove_file(&path) {
                    Ok(()) => Ok(()),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
                    Err(err) => Err(KeyValueError::Io(format!(
                        "cannot remove '{}': {}", path.display(), err
                    )))
                }
            }
            Backend::Memory(map) => {
                map.lock().expect("poisoned lock").remove(key);
                Ok(())
            }
        }
    }

    /// Returns all keys in the store, sorted.
    pub fn keys(&self) -> Result<Vec<String>, KeyValueError> {
        match &self.backend {
            Backend::Disk(root) => {
                let entries = std::fs::read_dir(root).map_err(|err| {
                    KeyValueError::Io(format!(
                        "cannot read dir '{}': {}", root.display(), err
                    ))
                })?;
                let mut res = Vec::new();
                for entry in entries {
                    let entry = entry.map_err(|err| {
                        KeyValueError::Io(err.to_string())
                    })?;
                    let name = entry.file_name();
                    if let Some(key) = name.to_str().and_then(|name| {
                        name.strip_suffix(".json")
                    }) {
                        res.push(key.to_string());
                    }
                }
                res.sort();
                Ok(res)
            }
            Backend::Memory(map) => {
                Ok(map.lock().expect("poisoned lock").keys().cloned().collect())
            }
        }
    }

    /// Returns all values in the store, ordered by key.
    pub fn values<T: DeserializeOwned>(&self) -> Result<Vec<T>, KeyValueError> {
        let mut res = Vec::new();
        for key in self.keys()? {
            if let Some(value) = self.get(&key)? {
                res.push(value)
            }
        }
        Ok(res)
    }
}

fn file_name(key: &str) -> String {
    format!("{key}.json")
}

/// Keys become file names, so they cannot contain path separators.
fn check_key(key: &str) -> Result<(), KeyValueError> {
    if key.is_empty()
        || key.starts_with('.')
        || key.contains(['/', '\\'])
        || key.chars().any(char::is_control)
    {
        Err(KeyValueError::InvalidKey(key.to_string()))
    }
    else {
        Ok(())
    }
}


//------------ KeyValueError -------------------------------------------------

#[derive(Debug)]
pub enum KeyValueError {
    UnknownScheme(String),
    UnknownLocation(String),
    InvalidKey(String),
    Io(String),
    Serialize { key: String, err: String },
    Deserialize { key: String, err: String },
}

impl KeyValueError {
    fn serialize(key: &str, err: impl fmt::Display) -> Self {
        KeyValueError::Serialize { key: key.into(), err: err.to_string() }
    }

    fn deserialize(key: &str, err: impl fmt::Display) -> Self {
        KeyValueError::Deserialize { key: key.into(), err: err.to_string() }
    }
}

impl fmt::Display for KeyValueError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KeyValueError::UnknownScheme(scheme) => {
                write!(f, "unknown storage scheme '{scheme}'")
            }
            KeyValueError::UnknownLocation(uri) => {
                write!(f, "unusable storage location '{uri}'")
            }
            KeyValueError::InvalidKey(key) => {
                write!(f, "invalid storage key '{key}'")
            }
            KeyValueError::Io(msg) => f.write_str(msg),
            KeyValueError::Serialize { key, err } => {
                write!(f, "failed to serialize value for key '{key}': {err}")
            }
            KeyValueError::Deserialize { key, err } => {
                write!(f, "failed to deserialize value for key '{key}': {err}")
            }
        }
    }
}

impl std::error::Error for KeyValueError {}


//============ Tests =========================================================
