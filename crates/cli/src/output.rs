use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sclipi_engine::{ExportKind, LogStore, export_file_name, export_text};
use sclipi_types::LogEntry;

/// One log entry as a terminal line.
pub fn format_entry(entry: &LogEntry, show_date: bool) -> String {
    let response = entry.response.as_deref().unwrap_or("…");
    let marker = if entry.is_server_error { "!" } else { "" };
    if entry.hide_time {
        return format!("    {} {marker}{response}", entry.scpi);
    }
    let time = if show_date {
        entry.time.format("%Y-%m-%d %H:%M:%S")
    } else {
        entry.time.format("%H:%M:%S")
    };
    format!(
        "[{time}] {} {marker}{response} ({} ms)",
        entry.scpi,
        entry.elapsed.as_millis()
    )
}

/// Print settled entries from `printed` onwards, stopping at the first one still in flight.
pub fn print_settled(entries: &[LogEntry], printed: &mut usize, show_date: bool) {
    while let Some(entry) = entries.get(*printed) {
        if entry.is_pending() {
            break;
        }
        println!("{}", format_entry(entry, show_date));
        *printed += 1;
    }
}

/// Write an export of `log` into `directory`, returning the file written.
pub fn write_export(log: &LogStore, kind: ExportKind, directory: &Path) -> Result<PathBuf> {
    let path = directory.join(export_file_name(kind, chrono::Utc::now()));
    std::fs::write(&path, export_text(&log.snapshot(), kind))
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
