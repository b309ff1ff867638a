//! Dispatching SCPI commands and recording them in a session log.
//!
//! The pipeline owns the busy flag, the single gate that keeps one command in
//! flight per session. Interactive submission and the script runner both take
//! a [`BusyGuard`] before calling [`SendPipeline::dispatch`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use sclipi_api::ScpiTransport;
use sclipi_types::{ConnectionParams, LogEntry, LogEntryId, ScpiResponse};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::log::LogStore;
use crate::notify::{Notification, Notifier};

/// Prefix `:` unless the command already starts with `:` or `*`.
pub fn normalize_scpi(scpi: &str) -> String {
    if scpi.starts_with(':') || scpi.starts_with('*') {
        scpi.to_string()
    } else {
        format!(":{scpi}")
    }
}

/// What happened to one dispatched command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Entry created for the command.
    pub entry_id: LogEntryId,
    pub scpi: String,
    pub response: String,
    /// Transport failure or server-reported error.
    pub is_server_error: bool,
    /// Synthetic `:SYST:ERR?` entries added after the command.
    pub instrument_errors: usize,
}

/// Held while a command or script is in flight; clears the busy flag on drop.
#[derive(Debug)]
pub struct BusyGuard<'a> {
    busy: &'a AtomicBool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

pub struct SendPipeline {
    transport: Arc<dyn ScpiTransport>,
    connection: watch::Receiver<ConnectionParams>,
    notifier: Notifier,
    busy: AtomicBool,
}

impl SendPipeline {
    pub fn new(
        transport: Arc<dyn ScpiTransport>,
        connection: watch::Receiver<ConnectionParams>,
        notifier: Notifier,
    ) -> Self {
        Self {
            transport,
            connection,
            notifier,
            busy: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Claim the pipeline, or `None` when something is already in flight.
    pub fn try_begin(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard { busy: &self.busy })
    }

    pub fn transport(&self) -> &Arc<dyn ScpiTransport> {
        &self.transport
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Parameters the next dispatch will use.
    pub fn connection(&self) -> ConnectionParams {
        self.connection.borrow().clone()
    }

    /// Send `scpi` and record it in `log`.
    ///
    /// The entry is appended before the request goes out and settled exactly
    /// once afterwards. Transport failures end up on the entry and the
    /// notification channel, never as an error to the caller.
    pub async fn dispatch(&self, log: &LogStore, scpi: &str) -> DispatchOutcome {
        self.dispatch_with(log, scpi, self.connection()).await
    }

    /// [`dispatch`](Self::dispatch) with explicit connection parameters.
    pub async fn dispatch_with(&self, log: &LogStore, scpi: &str, params: ConnectionParams) -> DispatchOutcome {
        let scpi = normalize_scpi(scpi);
        let entry = LogEntry::pending(scpi.clone());
        let entry_id = entry.unique_id;
        log.append(entry);

        debug!(%scpi, port = params.port, address = %params.address, simulated = params.simulated, "dispatching");
        let started = Instant::now();
        let result = self.transport.send_scpi(&scpi, &params).await;
        let elapsed = started.elapsed();

        match result {
            Ok(reply) => {
                let (response, is_server_error) = settle_response(&reply);
                log.update(entry_id, |entry| {
                    entry.response = Some(response.clone());
                    entry.is_server_error = is_server_error;
                    entry.elapsed = elapsed;
                });
                let synthetic: Vec<LogEntry> = reply.errors.iter().map(LogEntry::instrument_error).collect();
                let instrument_errors = synthetic.len();
                log.insert_after(entry_id, synthetic);
                debug!(%scpi, elapsed_ms = elapsed.as_millis() as u64, instrument_errors, "settled");

                DispatchOutcome {
                    entry_id,
                    scpi,
                    response,
                    is_server_error,
                    instrument_errors,
                }
            }
            Err(error) => {
                let message = error.to_string();
                warn!(%scpi, error = %message, "dispatch failed");
                log.update(entry_id, |entry| {
                    entry.response = Some(message.clone());
                    entry.is_server_error = true;
                    entry.elapsed = elapsed;
                });
                self.notifier.notify(Notification::TransportFailure {
                    scpi: scpi.clone(),
                    message: message.clone(),
                });

                DispatchOutcome {
                    entry_id,
                    scpi,
                    response: message,
                    is_server_error: true,
                    instrument_errors: 0,
                }
            }
        }
    }
}

/// An empty response with a server error shows the server error instead.
///
/// With both empty the command simply produced no output (`*RST`, `OUTP ON`)
/// and settles as a success with an empty response.
fn settle_response(reply: &ScpiResponse) -> (String, bool) {
    if reply.response.is_empty() && !reply.server_error.is_empty() {
        (reply.server_error.clone(), true)
    } else {
        (reply.response.clone(), false)
    }
}
