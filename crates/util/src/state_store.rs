//! Client-local key/value state persistence.
//!
//! Session state that survives restarts (command history, per-mode logs, the
//! loaded script, preferences) is stored as JSON values keyed by name. Callers
//! only need "load previous value or default" and "persist on change", which
//! [`load_or_default`] and [`persist`] provide on top of any [`StateStore`].

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dirs_next::{config_dir, home_dir};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Environment variable controlling the state file location.
pub const STATE_PATH_ENV: &str = "SCLIPI_STATE_PATH";

/// Default filename for the persisted state.
pub const STATE_FILE_NAME: &str = "state.json";

pub const HISTORY_KEY: &str = "history";
pub const INTERACTIVE_LOG_KEY: &str = "interactiveLog";
pub const SCRIPT_LOG_KEY: &str = "scriptLog";
pub const SCRIPT_SOURCE_KEY: &str = "scriptSource";
pub const SCRIPT_ORIGIN_KEY: &str = "scriptOrigin";
pub const PREFERENCES_KEY: &str = "preferences";

/// Errors surfaced by state store operations.
#[derive(Debug, Error)]
pub enum StateStoreError {
    /// I/O failure while reading or writing the state file.
    #[error("state I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization or deserialization failure.
    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Shared trait implemented by state persistence backends.
pub trait StateStore: Send + Sync {
    /// Retrieve the raw value stored under `key`.
    fn get_value(&self, key: &str) -> Option<Value>;

    /// Store `value` under `key`, replacing any previous value.
    fn set_value(&self, key: &str, value: Value) -> Result<(), StateStoreError>;

    /// Remove the value stored under `key`.
    fn remove(&self, key: &str) -> Result<(), StateStoreError>;

    /// Remove every stored value.
    fn clear(&self) -> Result<(), StateStoreError>;
}

/// Load the value under `key`, falling back to `T::default()` when it is
/// missing or no longer decodes.
pub fn load_or_default<T>(store: &dyn StateStore, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    let Some(value) = store.get_value(key) else {
        return T::default();
    };
    match serde_json::from_value(value) {
        Ok(decoded) => decoded,
        Err(error) => {
            warn!(key, error = %error, "Stored value no longer decodes; using default");
            T::default()
        }
    }
}

/// Persist `value` under `key`.
pub fn persist<T>(store: &dyn StateStore, key: &str, value: &T) -> Result<(), StateStoreError>
where
    T: Serialize + ?Sized,
{
    store.set_value(key, serde_json::to_value(value)?)
}

/// JSON-backed state store persisted on disk.
pub struct JsonStateStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl JsonStateStore {
    /// Create a store at the provided path (or the default path when omitted).
    pub fn new<P: Into<Option<PathBuf>>>(path: P) -> Result<Self, StateStoreError> {
        let resolved_path = match path.into() {
            Some(path) => resolve_user_path(&path.to_string_lossy()),
            None => default_state_path(),
        };

        let values = load_state_file(&resolved_path)?;
        debug!(path = %resolved_path.display(), keys = values.len(), "loaded client state");
        Ok(Self {
            path: resolved_path,
            values: Mutex::new(values),
        })
    }

    /// Initialize a store using the default location.
    pub fn with_defaults() -> Result<Self, StateStoreError> {
        Self::new(None::<PathBuf>)
    }

    /// Access the underlying state path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save_locked(&self, values: &Map<String, Value>) -> Result<(), StateStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(values)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

impl StateStore for JsonStateStore {
    fn get_value(&self, key: &str) -> Option<Value> {
        let values = self.values.lock().expect("state lock poisoned");
        values.get(key).cloned()
    }

    fn set_value(&self, key: &str, value: Value) -> Result<(), StateStoreError> {
        let mut values = self.values.lock().expect("state lock poisoned");
        values.insert(key.to_string(), value);
        self.save_locked(&values)
    }

    fn remove(&self, key: &str) -> Result<(), StateStoreError> {
        let mut values = self.values.lock().expect("state lock poisoned");
        if values.remove(key).is_some() {
            self.save_locked(&values)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StateStoreError> {
        let mut values = self.values.lock().expect("state lock poisoned");
        values.clear();
        self.save_locked(&values)
    }
}

/// In-memory state store used for tests and when no config directory is available.
#[derive(Default)]
pub struct InMemoryStateStore {
    values: Mutex<Map<String, Value>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for InMemoryStateStore {
    fn get_value(&self, key: &str) -> Option<Value> {
        let values = self.values.lock().expect("state lock poisoned");
        values.get(key).cloned()
    }

    fn set_value(&self, key: &str, value: Value) -> Result<(), StateStoreError> {
        let mut values = self.values.lock().expect("state lock poisoned");
        values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StateStoreError> {
        let mut values = self.values.lock().expect("state lock poisoned");
        values.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StateStoreError> {
        let mut values = self.values.lock().expect("state lock poisoned");
        values.clear();
        Ok(())
    }
}

fn default_state_path() -> PathBuf {
    if let Ok(path) = env::var(STATE_PATH_ENV)
        && !path.trim().is_empty()
    {
        return resolve_user_path(&path);
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sclipi")
        .join(STATE_FILE_NAME)
}

/// Resolve a user-supplied state path, expanding a leading `~` or `~/`.
fn resolve_user_path(raw: &str) -> PathBuf {
    let raw = raw.trim();
    let rest = match raw {
        "~" => "",
        _ => match raw.strip_prefix("~/").or_else(|| raw.strip_prefix("~\\")) {
            Some(rest) => rest,
            None => return PathBuf::from(raw),
        },
    };
    match home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(raw),
    }
}

fn load_state_file(path: &Path) -> Result<Map<String, Value>, StateStoreError> {
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<Map<String, Value>>(&content) {
            Ok(values) => Ok(values),
            Err(error) => {
                warn!("Failed to parse state file at {}: {}", path.display(), error);
                Ok(Map::new())
            }
        },
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
        Err(error) => Err(StateStoreError::Io(error)),
    }
}
