//! Instrument grammar cache and identification.

use std::sync::{Arc, RwLock};

use sclipi_api::{ScpiTransport, TransportError};
use sclipi_types::{Commands, ConnectionParams, Idn};
use tracing::{debug, info};

/// The command trees for the current instrument, replaced wholesale on refetch.
#[derive(Default)]
pub struct Grammar {
    commands: RwLock<Option<Arc<Commands>>>,
}

impl Grammar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_commands(commands: Commands) -> Self {
        Self {
            commands: RwLock::new(Some(Arc::new(commands))),
        }
    }

    pub fn snapshot(&self) -> Option<Arc<Commands>> {
        self.commands.read().expect("grammar lock poisoned").clone()
    }

    pub fn replace(&self, commands: Option<Commands>) {
        *self.commands.write().expect("grammar lock poisoned") = commands.map(Arc::new);
    }

    /// Refetch the trees for the instrument in `params`.
    ///
    /// Without a port and address there is nothing to ask for; the cache is
    /// emptied and `Ok(false)` returned. A failed fetch keeps the old trees.
    pub async fn refresh(&self, transport: &dyn ScpiTransport, params: &ConnectionParams) -> Result<bool, TransportError> {
        if !params.is_addressable() {
            debug!("no instrument configured; grammar cleared");
            self.replace(None);
            return Ok(false);
        }
        let commands = transport.fetch_commands(params.port, &params.address).await?;
        info!(
            port = params.port,
            address = %params.address,
            common = commands.star_tree.children.len(),
            top_level = commands.colon_tree.children.len(),
            "loaded instrument grammar"
        );
        self.replace(Some(commands));
        Ok(true)
    }
}

/// Ask the instrument for `*IDN?`, without draining its error queue.
///
/// `Ok(None)` when the reply does not carry the four identification fields.
pub async fn identify(transport: &dyn ScpiTransport, params: &ConnectionParams) -> Result<Option<Idn>, TransportError> {
    let params = ConnectionParams {
        auto_syst_err: false,
        ..params.clone()
    };
    let reply = transport.send_scpi("*IDN?", &params).await?;
    let idn = Idn::parse(&reply.response);
    if idn.is_none() {
        debug!(response = %reply.response, "unrecognized *IDN? response");
    }
    Ok(idn)
}
