//! Script mode: a loaded batch of commands run one after another.
//!
//! A run owns the pipeline for its whole duration. Cancellation is checked
//! once before each line; the command in flight is always allowed to finish.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sclipi_types::ScriptOrigin;
use sclipi_util::state_store::{SCRIPT_ORIGIN_KEY, SCRIPT_SOURCE_KEY};
use sclipi_util::{StateStore, load_or_default, persist};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::log::LogStore;
use crate::notify::{Notification, Notifier};
use crate::pipeline::SendPipeline;

#[derive(Debug, Error)]
pub enum ScriptLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("clipboard unavailable: {0}")]
    Clipboard(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScriptRunError {
    #[error("a command is already in flight")]
    Busy,
}

/// Script text and where it came from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Script {
    pub source: String,
    pub origin: ScriptOrigin,
}

impl Script {
    pub fn new(source: impl Into<String>, origin: ScriptOrigin) -> Self {
        Self {
            source: source.into(),
            origin,
        }
    }

    pub async fn from_file(path: &Path) -> Result<Self, ScriptLoadError> {
        let source = tokio::fs::read_to_string(path).await.map_err(|source| ScriptLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(source, ScriptOrigin::File))
    }

    /// Commands to send, trimmed, with blank lines left out.
    pub fn lines(&self) -> Vec<String> {
        self.source
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// The current script, restored from and written back to the state store.
pub struct ScriptBuffer {
    current: Script,
    store: Arc<dyn StateStore>,
    notifier: Notifier,
}

impl ScriptBuffer {
    pub fn load(store: Arc<dyn StateStore>, notifier: Notifier) -> Self {
        let current = Script {
            source: load_or_default(store.as_ref(), SCRIPT_SOURCE_KEY),
            origin: load_or_default(store.as_ref(), SCRIPT_ORIGIN_KEY),
        };
        Self {
            current,
            store,
            notifier,
        }
    }

    pub fn current(&self) -> &Script {
        &self.current
    }

    /// Replace the current script with a freshly loaded one.
    ///
    /// A failed load is reported on the notification channel and the current
    /// script stays as it was. Returns whether the script changed.
    pub fn replace(&mut self, loaded: Result<Script, ScriptLoadError>) -> bool {
        let script = match loaded {
            Ok(script) => script,
            Err(error) => {
                warn!(error = %error, "script load failed");
                self.notifier.notify(Notification::ScriptLoadFailure {
                    message: error.to_string(),
                });
                return false;
            }
        };

        let stored = persist(self.store.as_ref(), SCRIPT_SOURCE_KEY, &script.source)
            .and_then(|_| persist(self.store.as_ref(), SCRIPT_ORIGIN_KEY, &script.origin));
        if let Err(error) = stored {
            warn!(error = %error, "failed to persist script");
        }
        self.current = script;
        true
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScriptStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
}

/// How a run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptReport {
    pub status: ScriptStatus,
    pub dispatched: usize,
    pub skipped: usize,
    /// Dispatched commands that came back as server errors.
    pub failed: usize,
}

impl ScriptReport {
    pub fn summary(&self) -> String {
        match self.status {
            ScriptStatus::Cancelled => format!(
                "Script cancelled: {} sent, {} skipped",
                self.dispatched, self.skipped
            ),
            _ if self.failed > 0 => format!("Script completed: {} sent, {} failed", self.dispatched, self.failed),
            _ => format!("Script completed: {} sent", self.dispatched),
        }
    }
}

pub struct ScriptRunner {
    pipeline: Arc<SendPipeline>,
    log: Arc<LogStore>,
    status: watch::Sender<ScriptStatus>,
    progress: watch::Sender<f64>,
}

impl ScriptRunner {
    /// `log` is the script-mode log; it is cleared at the start of every run.
    pub fn new(pipeline: Arc<SendPipeline>, log: Arc<LogStore>) -> Self {
        Self {
            pipeline,
            log,
            status: watch::channel(ScriptStatus::Idle).0,
            progress: watch::channel(0.0).0,
        }
    }

    pub fn log(&self) -> &Arc<LogStore> {
        &self.log
    }

    pub fn status(&self) -> watch::Receiver<ScriptStatus> {
        self.status.subscribe()
    }

    /// Percentage of lines dispatched in the current run, `0.0..=100.0`.
    pub fn progress(&self) -> watch::Receiver<f64> {
        self.progress.subscribe()
    }

    pub fn is_running(&self) -> bool {
        *self.status.borrow() == ScriptStatus::Running
    }

    /// Run every line of `script` in order.
    ///
    /// Refused while anything else holds the pipeline. Script commands are not
    /// added to the command history.
    pub async fn run(&self, script: &Script, cancel: &CancellationToken) -> Result<ScriptReport, ScriptRunError> {
        let Some(_busy) = self.pipeline.try_begin() else {
            return Err(ScriptRunError::Busy);
        };

        let lines = script.lines();
        self.log.clear();
        self.progress.send_replace(0.0);
        self.status.send_replace(ScriptStatus::Running);
        info!(lines = lines.len(), origin = ?script.origin, "script started");

        let mut dispatched = 0;
        let mut failed = 0;
        for line in &lines {
            if cancel.is_cancelled() {
                break;
            }
            let outcome = self.pipeline.dispatch(&self.log, line).await;
            dispatched += 1;
            if outcome.is_server_error {
                failed += 1;
            }
            self.progress
                .send_replace(100.0 * dispatched as f64 / lines.len() as f64);
        }

        let skipped = lines.len() - dispatched;
        let status = if skipped > 0 {
            ScriptStatus::Cancelled
        } else {
            self.progress.send_replace(100.0);
            ScriptStatus::Completed
        };
        self.status.send_replace(status);

        let report = ScriptReport {
            status,
            dispatched,
            skipped,
            failed,
        };
        info!(dispatched, skipped, failed, "{}", report.summary());
        if status == ScriptStatus::Cancelled {
            self.pipeline
                .notifier()
                .notify(Notification::ScriptCancelled { dispatched, skipped });
        }
        Ok(report)
    }
}
