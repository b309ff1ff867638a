//! Connection parameters and the preferences behind them.
//!
//! Port and address live on the server; simulation, automatic error readout
//! and the timeout are client preferences. Every accepted change is published
//! on a `watch` channel the [`SendPipeline`](crate::pipeline::SendPipeline)
//! reads before each dispatch.

use std::sync::Arc;

use sclipi_api::{ScpiTransport, TransportError};
use sclipi_types::ConnectionParams;
use sclipi_util::{PreferenceError, Preferences, PreferencesStore, parse_port, parse_timeout_seconds};
use tokio::sync::watch;
use tracing::{info, warn};

/// Result of committing an edited field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Commit {
    Changed,
    Unchanged,
}

pub struct ConnectionSettings {
    transport: Arc<dyn ScpiTransport>,
    preferences: Arc<PreferencesStore>,
    sender: watch::Sender<ConnectionParams>,
}

impl ConnectionSettings {
    /// Start from the stored preferences with no instrument selected.
    pub fn new(transport: Arc<dyn ScpiTransport>, preferences: Arc<PreferencesStore>) -> Self {
        let mut params = ConnectionParams::default();
        apply_preferences(&mut params, &preferences.current());
        let (sender, _) = watch::channel(params);
        Self {
            transport,
            preferences,
            sender,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionParams> {
        self.sender.subscribe()
    }

    pub fn params(&self) -> ConnectionParams {
        self.sender.borrow().clone()
    }

    pub fn preferences(&self) -> &Arc<PreferencesStore> {
        &self.preferences
    }

    /// Pull the server's stored port and address.
    pub async fn load_server_defaults(&self) -> Result<ConnectionParams, TransportError> {
        let port = self.transport.scpi_port().await?;
        let address = self.transport.scpi_address().await?;
        info!(port, %address, "loaded server connection defaults");
        self.sender.send_modify(|params| {
            params.port = port;
            params.address = address;
        });
        Ok(self.params())
    }

    /// Adjust this session's parameters without storing anything, locally or
    /// on the server.
    pub fn override_session(&self, change: impl FnOnce(&mut ConnectionParams)) {
        self.sender.send_modify(change);
    }

    /// Commit a typed port.
    ///
    /// Invalid input leaves the committed port in place. A changed port is
    /// published, then stored on the server; a failed store is only logged.
    pub async fn commit_port(&self, input: &str) -> Result<Commit, PreferenceError> {
        let port = parse_port(input)?;
        if self.params().port == port {
            return Ok(Commit::Unchanged);
        }
        self.sender.send_modify(|params| params.port = port);
        if let Err(error) = self.transport.set_scpi_port(port).await {
            warn!(port, error = %error, "failed to store port on server");
        }
        Ok(Commit::Changed)
    }

    /// Commit a typed address. Empty input is ignored.
    pub async fn commit_address(&self, input: &str) -> Commit {
        let address = input.trim();
        if address.is_empty() || self.params().address == address {
            return Commit::Unchanged;
        }
        self.sender.send_modify(|params| params.address = address.to_string());
        if let Err(error) = self.transport.set_scpi_address(address).await {
            warn!(%address, error = %error, "failed to store address on server");
        }
        Commit::Changed
    }

    /// Commit a typed timeout in seconds.
    pub fn commit_timeout(&self, input: &str) -> Result<Commit, PreferenceError> {
        let timeout_seconds = parse_timeout_seconds(input)?;
        if self.params().timeout_seconds == timeout_seconds {
            return Ok(Commit::Unchanged);
        }
        self.update_preferences(|preferences| preferences.timeout_seconds = timeout_seconds);
        Ok(Commit::Changed)
    }

    pub fn set_simulated(&self, simulated: bool) {
        self.update_preferences(|preferences| preferences.simulated = simulated);
    }

    pub fn set_auto_syst_err(&self, auto_syst_err: bool) {
        self.update_preferences(|preferences| preferences.auto_syst_err = auto_syst_err);
    }

    /// Drop server and client preferences and reload the server's defaults.
    pub async fn reset(&self) -> Result<ConnectionParams, TransportError> {
        self.transport.reset_preferences().await?;
        let restored = match self.preferences.reset() {
            Ok(preferences) => preferences,
            Err(error) => {
                warn!(error = %error, "failed to persist default preferences");
                Preferences::default()
            }
        };
        self.sender.send_modify(|params| apply_preferences(params, &restored));
        self.load_server_defaults().await
    }

    fn update_preferences(&self, change: impl FnOnce(&mut Preferences)) {
        let preferences = match self.preferences.update(change) {
            Ok(preferences) => preferences,
            Err(error) => {
                warn!(error = %error, "failed to persist preferences");
                self.preferences.current()
            }
        };
        self.sender.send_modify(|params| apply_preferences(params, &preferences));
    }
}

fn apply_preferences(params: &mut ConnectionParams, preferences: &Preferences) {
    params.simulated = preferences.simulated;
    params.auto_syst_err = preferences.auto_syst_err;
    params.timeout_seconds = preferences.timeout_seconds;
}
