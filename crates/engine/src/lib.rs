//! # Sclipi Engine
//!
//! Everything the console does between a keystroke and the log, independent
//! of any front end:
//!
//! - **`autocomplete`** / **`completion`**: grammar-driven candidates and how an
//!   accepted candidate rewrites the input line
//! - **`history`**: most-recent-first command history with Up/Down browsing
//! - **`pipeline`**: one-at-a-time dispatch through the server transport into a
//!   session log
//! - **`console`**: the interactive input line tying the above together
//! - **`script`**: loading and running command scripts with cancellation
//! - **`log`** / **`selection`**: log snapshots, export, and drag selection
//! - **`settings`** / **`grammar`**: connection parameters, the cached command
//!   trees, and instrument identification

pub mod autocomplete;
pub mod completion;
pub mod console;
pub mod grammar;
pub mod history;
pub mod keys;
pub mod log;
pub mod notify;
pub mod pipeline;
pub mod script;
pub mod selection;
pub mod settings;

#[cfg(test)]
mod testing;

pub use autocomplete::{AutocompleteEngine, Candidate, CompletionRequest, StickyContext};
pub use completion::{AppliedCompletion, apply_completion};
pub use console::{Console, SubmitOutcome};
pub use grammar::{Grammar, identify};
pub use history::{CommandHistory, HISTORY_CAP};
pub use keys::Key;
pub use log::{ExportKind, LogSnapshot, LogStore, export_file_name, export_text};
pub use notify::{Notification, Notifier};
pub use pipeline::{BusyGuard, DispatchOutcome, SendPipeline, normalize_scpi};
pub use script::{Script, ScriptBuffer, ScriptLoadError, ScriptReport, ScriptRunError, ScriptRunner, ScriptStatus};
pub use selection::{DragState, LogSelection};
pub use settings::{Commit, ConnectionSettings};
