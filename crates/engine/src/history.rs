//! Command history with Up/Down browsing.
//!
//! The list is most-recent-first. While browsing, the input mirrors
//! `entries[index]`; the text that was in the input when browsing started is
//! kept aside and restored when the operator walks back past the newest entry.

use std::sync::Arc;

use sclipi_util::state_store::HISTORY_KEY;
use sclipi_util::{StateStore, load_or_default, persist};
use tracing::warn;

use crate::keys::Key;

/// Oldest entries are dropped beyond this many.
pub const HISTORY_CAP: usize = 500;

pub struct CommandHistory {
    entries: Vec<String>,
    index: Option<usize>,
    unsent: String,
    store: Option<Arc<dyn StateStore>>,
}

impl CommandHistory {
    /// History that lives only for this process.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: None,
            unsent: String::new(),
            store: None,
        }
    }

    /// Restore persisted history; every later mutation writes back to `store`.
    pub fn load(store: Arc<dyn StateStore>) -> Self {
        let mut entries: Vec<String> = load_or_default(store.as_ref(), HISTORY_KEY);
        entries.truncate(HISTORY_CAP);
        Self {
            entries,
            index: None,
            unsent: String::new(),
            store: Some(store),
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn is_browsing(&self) -> bool {
        self.index.is_some()
    }

    /// Record a submitted command. Repeating the newest entry is a no-op.
    pub fn add(&mut self, scpi: &str) {
        if self.entries.first().map(String::as_str) == Some(scpi) {
            return;
        }
        self.entries.insert(0, scpi.to_string());
        self.entries.truncate(HISTORY_CAP);
        self.save();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.reset_cursor();
        self.save();
    }

    /// Step one entry older. Returns the text the input should now show.
    ///
    /// Browsing only starts from an empty input.
    pub fn up(&mut self, input: &str) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        let next = match self.index {
            None if !input.is_empty() => return None,
            None => {
                self.unsent = input.to_string();
                0
            }
            Some(index) => (index + 1).min(self.entries.len() - 1),
        };
        self.index = Some(next);
        Some(self.entries[next].clone())
    }

    /// Step one entry newer, restoring the unsent input past the newest entry.
    pub fn down(&mut self) -> Option<String> {
        match self.index? {
            0 => {
                self.index = None;
                Some(std::mem::take(&mut self.unsent))
            }
            index => {
                self.index = Some(index - 1);
                Some(self.entries[index - 1].clone())
            }
        }
    }

    /// Editing the recalled text ends browsing.
    pub fn on_key(&mut self, key: Key) {
        if key.is_edit() {
            self.reset_cursor();
        }
    }

    pub fn reset_cursor(&mut self) {
        self.index = None;
        self.unsent.clear();
    }

    fn save(&self) {
        if let Some(store) = &self.store
            && let Err(error) = persist(store.as_ref(), HISTORY_KEY, &self.entries)
        {
            warn!(%error, "failed to persist command history");
        }
    }
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use sclipi_util::InMemoryStateStore;

    use super::*;

    fn history_of(entries: &[&str]) -> CommandHistory {
        let mut history = CommandHistory::new();
        for entry in entries.iter().rev() {
            history.add(entry);
        }
        history
    }

    #[test]
    fn add_dedups_adjacent_repeats_only() {
        let mut history = CommandHistory::new();
        history.add("*IDN?");
        history.add("*IDN?");
        history.add(":MEAS:VOLT?");
        history.add("*IDN?");
        assert_eq!(history.entries(), ["*IDN?", ":MEAS:VOLT?", "*IDN?"]);
    }

    #[test]
    fn up_from_empty_input_enters_browsing_and_down_restores() {
        let mut history = history_of(&["*IDN?", ":MEAS:VOLT?"]);

        assert_eq!(history.up("").as_deref(), Some("*IDN?"));
        assert_eq!(history.index(), Some(0));
        assert_eq!(history.down().as_deref(), Some(""));
        assert_eq!(history.index(), None);
    }

    #[test]
    fn up_is_refused_with_pending_input() {
        let mut history = history_of(&["*IDN?"]);
        assert_eq!(history.up(":SYST"), None);
        assert!(!history.is_browsing());
    }

    #[test]
    fn up_is_bounded_by_the_oldest_entry() {
        let mut history = history_of(&["a", "b"]);
        history.up("");
        assert_eq!(history.up("a").as_deref(), Some("b"));
        assert_eq!(history.up("b").as_deref(), Some("b"));
        assert_eq!(history.index(), Some(1));
        assert_eq!(history.down().as_deref(), Some("a"));
        assert_eq!(history.index(), Some(0));
    }

    #[test]
    fn down_without_browsing_does_nothing() {
        let mut history = history_of(&["a"]);
        assert_eq!(history.down(), None);
    }

    #[test]
    fn edit_keys_reset_the_cursor() {
        let mut history = history_of(&["a", "b"]);
        history.up("");
        history.on_key(Key::Left);
        assert!(history.is_browsing());
        history.on_key(Key::Char('x'));
        assert!(!history.is_browsing());
    }

    #[test]
    fn list_is_capped() {
        let mut history = CommandHistory::new();
        for n in 0..(HISTORY_CAP + 10) {
            history.add(&format!("*CMD{n}"));
        }
        assert_eq!(history.entries().len(), HISTORY_CAP);
        assert_eq!(history.entries()[0], format!("*CMD{}", HISTORY_CAP + 9));
    }

    #[test]
    fn mutations_are_persisted() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let mut history = CommandHistory::load(store.clone());
        history.add("*RST");
        history.add("*IDN?");
        assert_eq!(CommandHistory::load(store.clone()).entries(), ["*IDN?", "*RST"]);

        history.clear();
        assert!(CommandHistory::load(store).entries().is_empty());
    }
}
