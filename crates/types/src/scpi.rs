use std::fmt;

use serde::{Deserialize, Serialize};

/// Payload returned by `POST /api/scpi`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScpiResponse {
    #[serde(default)]
    pub response: String,
    /// Errors drained from the instrument's error queue after the command.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub errors: Vec<String>,
    #[serde(default)]
    pub server_error: String,
}

/// Parameters attached to every dispatched command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionParams {
    pub simulated: bool,
    pub auto_syst_err: bool,
    pub timeout_seconds: u32,
    pub port: u16,
    pub address: String,
}

impl ConnectionParams {
    /// Whether enough is known to reach an instrument.
    pub fn is_addressable(&self) -> bool {
        self.port != 0 && !self.address.is_empty()
    }
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            simulated: false,
            auto_syst_err: true,
            timeout_seconds: 10,
            port: 0,
            address: String::new(),
        }
    }
}

/// Identification fields parsed from a `*IDN?` response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Idn {
    pub manufacturer: String,
    pub model: String,
    pub serial: String,
    pub version: String,
}

impl Idn {
    /// Parse `manufacturer,model,serial,version`.
    ///
    /// Anything with fewer than four non-empty fields yields `None`.
    pub fn parse(response: &str) -> Option<Self> {
        let mut fields = response.trim().split(',').map(str::trim);
        let mut next = || fields.next().filter(|field| !field.is_empty()).map(str::to_string);
        Some(Self {
            manufacturer: next()?,
            model: next()?,
            serial: next()?,
            version: next()?,
        })
    }
}

impl fmt::Display for Idn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Manufacturer: {}", self.manufacturer)?;
        writeln!(f, "Model: {}", self.model)?;
        writeln!(f, "Serial: {}", self.serial)?;
        write!(f, "Version: {}", self.version)
    }
}

/// Where the current script text came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptOrigin {
    #[default]
    File,
    Clipboard,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
