use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

static NEXT_LOG_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique identifier of a log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogEntryId(u64);

impl LogEntryId {
    /// Allocate a fresh identifier.
    pub fn next() -> Self {
        Self(NEXT_LOG_ENTRY_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Ensure identifiers allocated from now on are greater than `id`.
    ///
    /// Called after restoring persisted entries so new ids never collide with them.
    pub fn reserve_through(id: LogEntryId) {
        NEXT_LOG_ENTRY_ID.fetch_max(id.0.saturating_add(1), Ordering::Relaxed);
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Command,
    Query,
}

impl LogKind {
    /// Queries are recognized purely by the presence of a `?`.
    pub fn classify(scpi: &str) -> Self {
        if scpi.contains('?') { Self::Query } else { Self::Command }
    }
}

/// One dispatched command (or synthetic error readout) in a session log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub scpi: String,
    /// `None` while the request is in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub elapsed: Duration,
    #[serde(default)]
    pub is_server_error: bool,
    pub unique_id: LogEntryId,
    #[serde(default)]
    pub hide_time: bool,
    #[serde(default)]
    pub minimized: bool,
}

impl LogEntry {
    /// New in-flight entry for `scpi`.
    pub fn pending(scpi: impl Into<String>) -> Self {
        let scpi = scpi.into();
        Self {
            kind: LogKind::classify(&scpi),
            scpi,
            response: None,
            time: Utc::now(),
            elapsed: Duration::ZERO,
            is_server_error: false,
            unique_id: LogEntryId::next(),
            hide_time: false,
            minimized: false,
        }
    }

    /// Synthetic `:SYST:ERR?` readout carrying one instrument-reported error.
    pub fn instrument_error(error: impl Into<String>) -> Self {
        Self {
            response: Some(error.into()),
            hide_time: true,
            ..Self::pending(":SYST:ERR?")
        }
    }

    pub fn is_pending(&self) -> bool {
        self.response.is_none()
    }
}
