//! Log entry selection driven by pointer gestures.

use std::collections::BTreeSet;

use sclipi_types::LogEntry;

use crate::log::LogStore;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        anchor: usize,
    },
}

/// Selected log indices plus the drag gesture in progress.
#[derive(Clone, Debug, Default)]
pub struct LogSelection {
    selected: BTreeSet<usize>,
    drag: DragState,
}

impl LogSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pointer pressed on `index`.
    ///
    /// A plain press selects only that entry and starts a drag; a toggle press
    /// (ctrl/cmd) flips that entry and leaves the rest alone.
    pub fn press(&mut self, index: usize, toggle: bool) {
        if toggle {
            if !self.selected.remove(&index) {
                self.selected.insert(index);
            }
            self.drag = DragState::Idle;
            return;
        }
        self.selected.clear();
        self.selected.insert(index);
        self.drag = DragState::Dragging { anchor: index };
    }

    /// Pointer moved over `index`; while dragging the selection spans anchor to here.
    pub fn drag_to(&mut self, index: usize) {
        if let DragState::Dragging { anchor } = self.drag {
            self.selected = (anchor.min(index)..=anchor.max(index)).collect();
        }
    }

    pub fn release(&mut self) {
        self.drag = DragState::Idle;
    }

    pub fn drag_state(&self) -> DragState {
        self.drag
    }

    pub fn select_all(&mut self, len: usize) {
        self.selected = (0..len).collect();
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.drag = DragState::Idle;
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }

    /// Selected indices in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.selected.iter().copied()
    }

    /// The selected index when exactly one entry is selected.
    pub fn single(&self) -> Option<usize> {
        let mut indices = self.selected.iter();
        match (indices.next(), indices.next()) {
            (Some(index), None) => Some(*index),
            _ => None,
        }
    }

    /// Copies of the selected entries, skipping indices past the end of `entries`.
    pub fn selected_entries(&self, entries: &[LogEntry]) -> Vec<LogEntry> {
        self.indices().filter_map(|index| entries.get(index).cloned()).collect()
    }

    /// Minimize or maximize the single selected entry. Returns `false` when the
    /// selection is not exactly one existing entry.
    pub fn set_minimized(&self, log: &LogStore, minimized: bool) -> bool {
        let Some(index) = self.single() else {
            return false;
        };
        let Some(id) = log.snapshot().get(index).map(|entry| entry.unique_id) else {
            return false;
        };
        log.set_minimized(id, minimized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(selection: &LogSelection) -> Vec<usize> {
        selection.indices().collect()
    }

    #[test]
    fn drag_selects_a_contiguous_range_in_either_direction() {
        let mut selection = LogSelection::new();
        selection.press(5, false);
        selection.drag_to(7);
        assert_eq!(indices(&selection), [5, 6, 7]);
        selection.drag_to(3);
        assert_eq!(indices(&selection), [3, 4, 5]);
        selection.release();
        assert_eq!(selection.drag_state(), DragState::Idle);

        selection.drag_to(9);
        assert_eq!(indices(&selection), [3, 4, 5]);
    }

    #[test]
    fn toggle_press_flips_one_entry() {
        let mut selection = LogSelection::new();
        selection.press(1, false);
        selection.release();
        selection.press(4, true);
        assert_eq!(indices(&selection), [1, 4]);
        selection.press(1, true);
        assert_eq!(indices(&selection), [4]);
        assert_eq!(selection.single(), Some(4));
    }

    #[test]
    fn minimize_requires_a_single_selection() {
        let log = LogStore::new();
        log.append(LogEntry::pending("*IDN?"));
        log.append(LogEntry::pending("*RST"));

        let mut selection = LogSelection::new();
        selection.select_all(2);
        assert!(!selection.set_minimized(&log, true));

        selection.press(1, false);
        assert!(selection.set_minimized(&log, true));
        let snapshot = log.snapshot();
        assert!(!snapshot[0].minimized);
        assert!(snapshot[1].minimized);

        selection.press(9, false);
        assert!(!selection.set_minimized(&log, true));
    }
}
