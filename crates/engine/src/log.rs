//! Session log storage and export.
//!
//! Every change publishes a fresh immutable snapshot over a `watch` channel,
//! so readers hold an `Arc<Vec<LogEntry>>` that never changes under them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sclipi_types::{LogEntry, LogEntryId};
use sclipi_util::{StateStore, load_or_default, persist};
use tokio::sync::watch;
use tracing::warn;

pub type LogSnapshot = Arc<Vec<LogEntry>>;

/// Ordered, append-only log for one console mode.
pub struct LogStore {
    sender: watch::Sender<LogSnapshot>,
    persistence: Option<(Arc<dyn StateStore>, &'static str)>,
}

impl LogStore {
    /// Log kept only in memory.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            sender,
            persistence: None,
        }
    }

    /// Restore the log stored under `key` and write every change back to it.
    pub fn load(store: Arc<dyn StateStore>, key: &'static str) -> Self {
        let entries: Vec<LogEntry> = load_or_default(store.as_ref(), key);
        if let Some(last) = entries.iter().map(|entry| entry.unique_id).max() {
            LogEntryId::reserve_through(last);
        }
        let (sender, _) = watch::channel(Arc::new(entries));
        Self {
            sender,
            persistence: Some((store, key)),
        }
    }

    pub fn snapshot(&self) -> LogSnapshot {
        self.sender.borrow().clone()
    }

    /// Receiver notified on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<LogSnapshot> {
        self.sender.subscribe()
    }

    pub fn len(&self) -> usize {
        self.sender.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn append(&self, entry: LogEntry) {
        self.publish(|entries| entries.push(entry));
    }

    /// Insert `children` directly after the entry `parent`, or at the end if it is gone.
    pub fn insert_after(&self, parent: LogEntryId, children: Vec<LogEntry>) {
        if children.is_empty() {
            return;
        }
        self.publish(|entries| {
            let at = entries
                .iter()
                .position(|entry| entry.unique_id == parent)
                .map_or(entries.len(), |index| index + 1);
            entries.splice(at..at, children);
        });
    }

    /// Replace the entry `id` with a modified copy. Returns whether it was found.
    pub fn update(&self, id: LogEntryId, change: impl FnOnce(&mut LogEntry)) -> bool {
        let mut found = false;
        self.publish(|entries| {
            if let Some(entry) = entries.iter_mut().find(|entry| entry.unique_id == id) {
                change(entry);
                found = true;
            }
        });
        found
    }

    pub fn set_minimized(&self, id: LogEntryId, minimized: bool) -> bool {
        self.update(id, |entry| entry.minimized = minimized)
    }

    pub fn clear(&self) {
        self.publish(Vec::clear);
    }

    fn publish(&self, change: impl FnOnce(&mut Vec<LogEntry>)) {
        self.sender.send_modify(|snapshot| {
            let mut next = snapshot.as_ref().clone();
            change(&mut next);
            *snapshot = Arc::new(next);
        });

        if let Some((store, key)) = &self.persistence {
            let snapshot = self.snapshot();
            if let Err(error) = persist(store.as_ref(), key, snapshot.as_slice()) {
                warn!(key, error = %error, "failed to persist log");
            }
        }
    }
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new()
    }
}

/// What an export contains.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportKind {
    /// Timestamp, command and response of every entry.
    FullLog,
    /// Just the commands, ready to be replayed as a script.
    CommandsOnly,
}

impl ExportKind {
    fn file_tag(self) -> &'static str {
        match self {
            ExportKind::FullLog => "log",
            ExportKind::CommandsOnly => "commands",
        }
    }
}

/// Render `entries` as export text, one line per entry.
pub fn export_text(entries: &[LogEntry], kind: ExportKind) -> String {
    let mut lines: Vec<String> = Vec::with_capacity(entries.len());
    for entry in entries {
        match kind {
            ExportKind::FullLog => {
                let timestamp = entry.time.format("%Y-%m-%d %H:%M:%S%.3f");
                let response = entry.response.as_deref().unwrap_or_default();
                let line = format!("[{timestamp}] {} {response}", entry.scpi);
                lines.push(line.trim_end().to_string());
            }
            // Synthetic error readouts were never typed.
            ExportKind::CommandsOnly if entry.hide_time => {}
            ExportKind::CommandsOnly => lines.push(entry.scpi.clone()),
        }
    }
    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    text
}

/// `sclipi-<kind>-<YYYYMMDDTHHMMSS>.txt`
pub fn export_file_name(kind: ExportKind, now: DateTime<Utc>) -> String {
    format!("sclipi-{}-{}.txt", kind.file_tag(), now.format("%Y%m%dT%H%M%S"))
}
