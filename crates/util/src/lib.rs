pub mod mnemonic;
pub mod preferences;
pub mod state_store;

pub use mnemonic::*;
pub use preferences::{PreferenceError, Preferences, PreferencesStore, parse_port, parse_timeout_seconds};
pub use state_store::{InMemoryStateStore, JsonStateStore, StateStore, StateStoreError, load_or_default, persist};
