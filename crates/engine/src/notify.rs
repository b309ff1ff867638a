//! Operator-facing notifications (the toast channel).

use std::fmt;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    /// The server could not be reached or rejected the request.
    TransportFailure { scpi: String, message: String },
    /// A script could not be read; the previous script is still loaded.
    ScriptLoadFailure { message: String },
    /// A script run stopped early.
    ScriptCancelled { dispatched: usize, skipped: usize },
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::TransportFailure { scpi, message } => write!(f, "{scpi} failed: {message}"),
            Notification::ScriptLoadFailure { message } => write!(f, "Could not load script: {message}"),
            Notification::ScriptCancelled { dispatched, skipped } => {
                write!(f, "Script cancelled after {dispatched} commands, {skipped} skipped")
            }
        }
    }
}

/// Sending half of the notification channel. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct Notifier {
    sender: Option<UnboundedSender<Notification>>,
}

impl Notifier {
    pub fn channel() -> (Self, UnboundedReceiver<Notification>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender: Some(sender) }, receiver)
    }

    /// Notifier that discards everything.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn notify(&self, notification: Notification) {
        let Some(sender) = &self.sender else {
            return;
        };
        if let Err(error) = sender.send(notification) {
            debug!(notification = %error.0, "notification receiver closed");
        }
    }
}
