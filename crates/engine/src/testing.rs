//! Scripted transport for engine tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use sclipi_api::{ScpiTransport, TransportError};
use sclipi_types::{Commands, ConnectionParams, ScpiResponse};

type SendHook = Box<dyn FnMut(&str) + Send>;

/// Replays queued replies and records every call.
///
/// With the reply queue empty, sends succeed with the response `ok`.
#[derive(Default)]
pub(crate) struct MockTransport {
    replies: Mutex<VecDeque<Result<ScpiResponse, TransportError>>>,
    after_send: Mutex<Option<SendHook>>,
    pub sent: Mutex<Vec<(String, ConnectionParams)>>,
    pub commands: Mutex<Option<Commands>>,
    pub fetches: Mutex<Vec<(u16, String)>>,
    pub server_port: Mutex<u16>,
    pub server_address: Mutex<String>,
    pub posted_ports: Mutex<Vec<u16>>,
    pub posted_addresses: Mutex<Vec<String>>,
    pub resets: Mutex<usize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, response: &str, errors: &[&str]) {
        self.replies.lock().unwrap().push_back(Ok(ScpiResponse {
            response: response.to_string(),
            errors: errors.iter().map(|error| error.to_string()).collect(),
            server_error: String::new(),
        }));
    }

    pub fn reply_server_error(&self, server_error: &str) {
        self.replies.lock().unwrap().push_back(Ok(ScpiResponse {
            server_error: server_error.to_string(),
            ..ScpiResponse::default()
        }));
    }

    pub fn fail(&self, status: u16, body: &str) {
        self.replies.lock().unwrap().push_back(Err(TransportError::Status {
            status,
            body: body.to_string(),
        }));
    }

    /// Run `hook` with the command text after each send completes.
    pub fn after_send(&self, hook: impl FnMut(&str) + Send + 'static) {
        *self.after_send.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn sent_scpi(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(scpi, _)| scpi.clone()).collect()
    }
}

#[async_trait]
impl ScpiTransport for MockTransport {
    async fn send_scpi(&self, scpi: &str, params: &ConnectionParams) -> Result<ScpiResponse, TransportError> {
        self.sent.lock().unwrap().push((scpi.to_string(), params.clone()));
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(ScpiResponse {
                response: "ok".to_string(),
                ..ScpiResponse::default()
            })
        });
        if let Some(hook) = self.after_send.lock().unwrap().as_mut() {
            hook(scpi);
        }
        reply
    }

    async fn fetch_commands(&self, port: u16, address: &str) -> Result<Commands, TransportError> {
        self.fetches.lock().unwrap().push((port, address.to_string()));
        self.commands.lock().unwrap().clone().ok_or_else(|| TransportError::Status {
            status: 404,
            body: "no grammar".to_string(),
        })
    }

    async fn health(&self) -> Result<String, TransportError> {
        Ok("healthy".to_string())
    }

    async fn scpi_port(&self) -> Result<u16, TransportError> {
        Ok(*self.server_port.lock().unwrap())
    }

    async fn set_scpi_port(&self, port: u16) -> Result<(), TransportError> {
        self.posted_ports.lock().unwrap().push(port);
        *self.server_port.lock().unwrap() = port;
        Ok(())
    }

    async fn scpi_address(&self) -> Result<String, TransportError> {
        Ok(self.server_address.lock().unwrap().clone())
    }

    async fn set_scpi_address(&self, address: &str) -> Result<(), TransportError> {
        self.posted_addresses.lock().unwrap().push(address.to_string());
        *self.server_address.lock().unwrap() = address.to_string();
        Ok(())
    }

    async fn reset_preferences(&self) -> Result<(), TransportError> {
        *self.resets.lock().unwrap() += 1;
        *self.server_port.lock().unwrap() = 0;
        self.server_address.lock().unwrap().clear();
        Ok(())
    }
}
