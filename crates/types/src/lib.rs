//! Shared type definitions for the Sclipi workspace.
//!
//! The grammar model ([`Commands`], [`CommandTreeNode`], [`MnemonicNode`]) is
//! decoded from the server's `/api/commands` payload. Log and response types
//! describe what flows through the send pipeline.

mod log;
mod scpi;
mod tree;

pub use log::{LogEntry, LogEntryId, LogKind};
pub use scpi::{ConnectionParams, Idn, ScpiResponse, ScriptOrigin};
pub use tree::{CommandTreeNode, Commands, MnemonicNode};
