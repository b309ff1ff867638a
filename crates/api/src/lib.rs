//! Sclipi server client.
//!
//! The server owns the instrument connections; this crate only speaks its
//! small HTTP surface:
//!
//! - `GET /api/commands` for the command grammar
//! - `POST /api/scpi` to dispatch one SCPI string
//! - `GET /api/health`
//! - `GET`/`POST /api/scpiPort` and `/api/scpiAddress` for the server-side
//!   connection defaults, `DELETE /api/preferences` to reset them
//!
//! The engine depends on the [`ScpiTransport`] trait so tests can substitute a
//! scripted transport; [`ScpiClient`] is the `reqwest`-backed implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, header};
use sclipi_types::{Commands, ConnectionParams, ScpiResponse};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Environment variable overriding the server base URL.
pub const SERVER_URL_ENV: &str = "SCLIPI_SERVER";

/// Base URL used when nothing else is configured.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// Failure reaching or decoding the server.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Unexpected response from {path}: {detail}")]
    Decode { path: String, detail: String },
    #[error("Invalid server URL '{url}': {detail}")]
    InvalidBaseUrl { url: String, detail: String },
}

/// Operations the engine needs from the server.
#[async_trait]
pub trait ScpiTransport: Send + Sync {
    /// Dispatch one normalized SCPI string with the given connection parameters.
    async fn send_scpi(&self, scpi: &str, params: &ConnectionParams) -> Result<ScpiResponse, TransportError>;

    /// Fetch both grammar trees for the instrument at `address:port`.
    async fn fetch_commands(&self, port: u16, address: &str) -> Result<Commands, TransportError>;

    /// Server liveness payload.
    async fn health(&self) -> Result<String, TransportError>;

    async fn scpi_port(&self) -> Result<u16, TransportError>;

    async fn set_scpi_port(&self, port: u16) -> Result<(), TransportError>;

    async fn scpi_address(&self) -> Result<String, TransportError>;

    async fn set_scpi_address(&self, address: &str) -> Result<(), TransportError>;

    /// Reset server-side preference state.
    async fn reset_preferences(&self) -> Result<(), TransportError>;
}

#[derive(Debug, Clone)]
/// Thin wrapper around a configured `reqwest::Client` for the Sclipi server.
pub struct ScpiClient {
    pub base_url: String,
    pub http: Client,
    pub user_agent: String,
}

impl ScpiClient {
    /// Construct a client for `base_url` after validating it.
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        validate_base_url(&base_url)?;

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            base_url,
            http,
            user_agent: format!("sclipi/{}; {}", env!("CARGO_PKG_VERSION"), std::env::consts::OS),
        })
    }

    /// Construct a client from `SCLIPI_SERVER`, falling back to the local default.
    pub fn new_from_env() -> Result<Self, TransportError> {
        let base_url = std::env::var(SERVER_URL_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        Self::new(base_url)
    }

    /// Build a request for a server-relative path.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, %method, "building request");

        self.http
            .request(method, url)
            .header(header::USER_AGENT, &self.user_agent)
    }

    fn scpi_request(&self, scpi: &str, params: &ConnectionParams) -> RequestBuilder {
        self.request(Method::POST, "/api/scpi")
            .query(&[
                ("simulated", params.simulated.to_string()),
                ("autoSystErr", params.auto_syst_err.to_string()),
                ("timeoutSeconds", params.timeout_seconds.to_string()),
                ("port", params.port.to_string()),
                ("address", params.address.clone()),
            ])
            .header(header::CONTENT_TYPE, "text/plain")
            .body(scpi.to_string())
    }

    fn commands_request(&self, port: u16, address: &str) -> RequestBuilder {
        self.request(Method::GET, "/api/commands")
            .query(&[("port", port.to_string()), ("address", address.to_string())])
    }

    async fn send_text(&self, builder: RequestBuilder) -> Result<String, TransportError> {
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        ensure_success(status, text)
    }
}

#[async_trait]
impl ScpiTransport for ScpiClient {
    async fn send_scpi(&self, scpi: &str, params: &ConnectionParams) -> Result<ScpiResponse, TransportError> {
        let text = self.send_text(self.scpi_request(scpi, params)).await?;
        decode_json("/api/scpi", &text)
    }

    async fn fetch_commands(&self, port: u16, address: &str) -> Result<Commands, TransportError> {
        let text = self.send_text(self.commands_request(port, address)).await?;
        decode_json("/api/commands", &text)
    }

    async fn health(&self) -> Result<String, TransportError> {
        self.send_text(self.request(Method::GET, "/api/health")).await
    }

    async fn scpi_port(&self) -> Result<u16, TransportError> {
        let text = self.send_text(self.request(Method::GET, "/api/scpiPort")).await?;
        parse_port_text(&text)
    }

    async fn set_scpi_port(&self, port: u16) -> Result<(), TransportError> {
        let text = self
            .send_text(self.request(Method::POST, "/api/scpiPort").body(port.to_string()))
            .await?;
        debug!(port, response = %text.trim(), "stored server port");
        Ok(())
    }

    async fn scpi_address(&self) -> Result<String, TransportError> {
        let text = self.send_text(self.request(Method::GET, "/api/scpiAddress")).await?;
        Ok(text.trim().to_string())
    }

    async fn set_scpi_address(&self, address: &str) -> Result<(), TransportError> {
        let text = self
            .send_text(self.request(Method::POST, "/api/scpiAddress").body(address.to_string()))
            .await?;
        debug!(address, response = %text.trim(), "stored server address");
        Ok(())
    }

    async fn reset_preferences(&self) -> Result<(), TransportError> {
        self.send_text(self.request(Method::DELETE, "/api/preferences")).await?;
        Ok(())
    }
}

fn ensure_success(status: StatusCode, text: String) -> Result<String, TransportError> {
    if status.is_success() {
        Ok(text)
    } else {
        Err(TransportError::Status {
            status: status.as_u16(),
            body: text,
        })
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(path: &str, text: &str) -> Result<T, TransportError> {
    serde_json::from_str(text).map_err(|error| TransportError::Decode {
        path: path.to_string(),
        detail: error.to_string(),
    })
}

/// The port endpoint answers with plain text; an empty body means "unset".
fn parse_port_text(text: &str) -> Result<u16, TransportError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed.parse().map_err(|_| TransportError::Decode {
        path: "/api/scpiPort".to_string(),
        detail: format!("'{trimmed}' is not a port number"),
    })
}

/// Validate that a base URL is acceptable for use by the client.
///
/// Rules: `http` or `https` scheme, and a host.
fn validate_base_url(base: &str) -> Result<(), TransportError> {
    let invalid = |detail: String| TransportError::InvalidBaseUrl {
        url: base.to_string(),
        detail,
    };
    let parsed = Url::parse(base).map_err(|error| invalid(error.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
    }
    if parsed.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConnectionParams {
        ConnectionParams {
            simulated: true,
            auto_syst_err: false,
            timeout_seconds: 5,
            port: 5025,
            address: "10.0.0.7".to_string(),
        }
    }

    #[test]
    fn base_url_validation() {
        assert!(validate_base_url("http://localhost:8080").is_ok());
        assert!(validate_base_url("https://lab.example.com").is_ok());
        assert!(validate_base_url("ftp://localhost").is_err());
        assert!(validate_base_url("not a url").is_err());
    }

    #[test]
    fn scpi_request_carries_parameters_and_raw_body() {
        let client = ScpiClient::new("http://localhost:8080/").unwrap();
        let request = client.scpi_request(":MEAS:VOLT?", &params()).build().unwrap();

        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.url().path(), "/api/scpi");
        let query: Vec<(String, String)> = request.url().query_pairs().into_owned().collect();
        assert!(query.contains(&("simulated".into(), "true".into())));
        assert!(query.contains(&("autoSystErr".into(), "false".into())));
        assert!(query.contains(&("timeoutSeconds".into(), "5".into())));
        assert!(query.contains(&("port".into(), "5025".into())));
        assert!(query.contains(&("address".into(), "10.0.0.7".into())));
        let body = request.body().and_then(|body| body.as_bytes()).unwrap();
        assert_eq!(body, b":MEAS:VOLT?");
    }

    #[test]
    fn commands_request_targets_instrument() {
        let client = ScpiClient::new("http://localhost:8080").unwrap();
        let request = client.commands_request(5025, "inst-1").build().unwrap();
        assert_eq!(request.url().as_str(), "http://localhost:8080/api/commands?port=5025&address=inst-1");
    }

    #[test]
    fn port_text_parsing() {
        assert_eq!(parse_port_text("5025\n").unwrap(), 5025);
        assert_eq!(parse_port_text("").unwrap(), 0);
        assert!(parse_port_text("abc").is_err());
    }

    #[test]
    fn non_success_status_is_an_error() {
        let error = ensure_success(StatusCode::BAD_GATEWAY, "instrument unreachable".into()).unwrap_err();
        assert_eq!(error.to_string(), "HTTP 502: instrument unreachable");
    }

    #[test]
    fn env_override_selects_server() {
        temp_env::with_var(SERVER_URL_ENV, Some("http://bench-7:9000"), || {
            let client = ScpiClient::new_from_env().unwrap();
            assert_eq!(client.base_url, "http://bench-7:9000");
        });
    }
}
