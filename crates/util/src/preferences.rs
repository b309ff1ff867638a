//! Client preference persistence and validation.
//!
//! Preferences are small scalars and toggles (simulation, automatic error
//! readout, timeout, display options) stored in the client state under
//! [`PREFERENCES_KEY`]. Numeric inputs typed by the operator are validated here
//! before they are committed; rejected input never reaches the server.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::state_store::{PREFERENCES_KEY, StateStore, StateStoreError, load_or_default, persist};

pub const DEFAULT_TIMEOUT_SECONDS: u32 = 10;

/// Rejected preference input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreferenceError {
    #[error("{field} must be an integer, got '{input}'")]
    NotAnInteger { field: &'static str, input: String },
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
}

/// Persisted preference values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub simulated: bool,
    pub auto_syst_err: bool,
    pub wrap_log: bool,
    pub show_date: bool,
    pub timeout_seconds: u32,
    pub prefer_short_scpi: bool,
    pub scroll_to_new_log_output: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            simulated: false,
            auto_syst_err: true,
            wrap_log: true,
            show_date: false,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            prefer_short_scpi: false,
            scroll_to_new_log_output: true,
        }
    }
}

/// Thread-safe preferences handle writing through to a [`StateStore`].
pub struct PreferencesStore {
    store: Arc<dyn StateStore>,
    payload: Mutex<Preferences>,
}

impl PreferencesStore {
    /// Load preferences from `store`, using defaults for anything missing.
    pub fn load(store: Arc<dyn StateStore>) -> Self {
        let payload = load_or_default(store.as_ref(), PREFERENCES_KEY);
        Self {
            store,
            payload: Mutex::new(payload),
        }
    }

    pub fn current(&self) -> Preferences {
        self.payload.lock().expect("preferences lock poisoned").clone()
    }

    /// Apply `change` and persist the result.
    pub fn update(&self, change: impl FnOnce(&mut Preferences)) -> Result<Preferences, StateStoreError> {
        let mut payload = self.payload.lock().expect("preferences lock poisoned");
        change(&mut payload);
        persist(self.store.as_ref(), PREFERENCES_KEY, &*payload)?;
        Ok(payload.clone())
    }

    /// Restore every client preference to its default.
    pub fn reset(&self) -> Result<Preferences, StateStoreError> {
        self.update(|payload| *payload = Preferences::default())
    }
}

/// Validate an operator-typed SCPI socket port.
pub fn parse_port(input: &str) -> Result<u16, PreferenceError> {
    let value = parse_integer("port", input)?;
    check_range("port", value, 1, i64::from(u16::MAX)).map(|value| value as u16)
}

/// Validate an operator-typed timeout in whole seconds.
pub fn parse_timeout_seconds(input: &str) -> Result<u32, PreferenceError> {
    let value = parse_integer("timeout", input)?;
    check_range("timeout", value, 1, i64::from(u32::MAX)).map(|value| value as u32)
}

fn parse_integer(field: &'static str, input: &str) -> Result<i64, PreferenceError> {
    input.trim().parse::<i64>().map_err(|_| {
        warn!(field, input, "rejected non-integer preference input");
        PreferenceError::NotAnInteger {
            field,
            input: input.to_string(),
        }
    })
}

fn check_range(field: &'static str, value: i64, min: i64, max: i64) -> Result<i64, PreferenceError> {
    if (min..=max).contains(&value) {
        return Ok(value);
    }
    warn!(field, value, min, max, "rejected out-of-range preference input");
    Err(PreferenceError::OutOfRange { field, value, min, max })
}
