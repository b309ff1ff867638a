//! Wiring the engine together for one CLI invocation.

use std::sync::Arc;

use anyhow::{Context, Result};
use sclipi_api::{ScpiClient, ScpiTransport};
use sclipi_engine::{
    CommandHistory, ConnectionSettings, Console, Grammar, LogStore, Notification, Notifier, ScriptBuffer, ScriptRunner,
    SendPipeline,
};
use sclipi_util::state_store::{INTERACTIVE_LOG_KEY, SCRIPT_LOG_KEY};
use sclipi_util::{JsonStateStore, PreferencesStore, StateStore, parse_port, parse_timeout_seconds};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};

use crate::Cli;

pub struct Session {
    pub transport: Arc<dyn ScpiTransport>,
    pub store: Arc<dyn StateStore>,
    pub preferences: Arc<PreferencesStore>,
    pub settings: ConnectionSettings,
    pub pipeline: Arc<SendPipeline>,
    pub grammar: Arc<Grammar>,
    pub notifier: Notifier,
}

impl Session {
    /// Open the state file, reach the server, and apply command-line overrides.
    ///
    /// The returned receiver carries operator notifications for the caller to print.
    pub async fn open(cli: &Cli) -> Result<(Self, UnboundedReceiver<Notification>)> {
        let store: Arc<dyn StateStore> = Arc::new(JsonStateStore::with_defaults().context("failed to open client state")?);
        let client = ScpiClient::new(cli.server.as_str()).context("invalid server URL")?;
        let transport: Arc<dyn ScpiTransport> = Arc::new(client);
        let preferences = Arc::new(PreferencesStore::load(store.clone()));
        let settings = ConnectionSettings::new(transport.clone(), preferences.clone());

        if let Err(error) = settings.load_server_defaults().await {
            warn!(error = %error, server = %cli.server, "could not load connection defaults from server");
        }
        apply_overrides(cli, &settings)?;

        let (notifier, notifications) = Notifier::channel();
        let pipeline = Arc::new(SendPipeline::new(transport.clone(), settings.subscribe(), notifier.clone()));
        let session = Self {
            transport,
            store,
            preferences,
            settings,
            pipeline,
            grammar: Arc::new(Grammar::new()),
            notifier,
        };
        Ok((session, notifications))
    }

    /// Fetch the instrument grammar; failures leave completion without a grammar.
    pub async fn load_grammar(&self) -> bool {
        match self.grammar.refresh(self.transport.as_ref(), &self.settings.params()).await {
            Ok(loaded) => loaded,
            Err(error) => {
                warn!(error = %error, "could not load instrument grammar");
                false
            }
        }
    }

    pub fn console(&self) -> Console {
        Console::new(
            self.pipeline.clone(),
            Arc::new(LogStore::load(self.store.clone(), INTERACTIVE_LOG_KEY)),
            self.grammar.clone(),
            self.preferences.clone(),
            CommandHistory::load(self.store.clone()),
        )
    }

    pub fn script_runner(&self) -> ScriptRunner {
        ScriptRunner::new(
            self.pipeline.clone(),
            Arc::new(LogStore::load(self.store.clone(), SCRIPT_LOG_KEY)),
        )
    }

    pub fn script_buffer(&self) -> ScriptBuffer {
        ScriptBuffer::load(self.store.clone(), self.notifier.clone())
    }
}

fn apply_overrides(cli: &Cli, settings: &ConnectionSettings) -> Result<()> {
    let port = cli.port.as_deref().map(parse_port).transpose().context("invalid --port")?;
    let timeout = cli
        .timeout
        .as_deref()
        .map(parse_timeout_seconds)
        .transpose()
        .context("invalid --timeout")?;

    settings.override_session(|params| {
        if let Some(port) = port {
            params.port = port;
        }
        if let Some(address) = cli.address.as_deref().map(str::trim).filter(|address| !address.is_empty()) {
            params.address = address.to_string();
        }
        if let Some(timeout) = timeout {
            params.timeout_seconds = timeout;
        }
        if cli.simulated {
            params.simulated = true;
        }
        if cli.no_auto_syst_err {
            params.auto_syst_err = false;
        }
    });
    let params = settings.params();
    debug!(port = params.port, address = %params.address, simulated = params.simulated, "session parameters");
    Ok(())
}
