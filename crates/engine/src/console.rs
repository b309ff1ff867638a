//! Interactive console: the input line, its completion state and submission.

use std::sync::{Arc, Mutex};

use sclipi_util::PreferencesStore;
use tracing::debug;

use crate::autocomplete::{AutocompleteEngine, Candidate, CompletionRequest, StickyContext};
use crate::completion::apply_completion;
use crate::grammar::Grammar;
use crate::history::CommandHistory;
use crate::keys::Key;
use crate::log::LogStore;
use crate::pipeline::{DispatchOutcome, SendPipeline};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Nothing sendable was typed.
    Rejected,
    /// Another command was still in flight.
    Dropped,
    Sent(DispatchOutcome),
}

struct InputState {
    text: String,
    sticky: StickyContext,
    history: CommandHistory,
}

pub struct Console {
    pipeline: Arc<SendPipeline>,
    log: Arc<LogStore>,
    grammar: Arc<Grammar>,
    preferences: Arc<PreferencesStore>,
    state: Mutex<InputState>,
}

impl Console {
    pub fn new(
        pipeline: Arc<SendPipeline>,
        log: Arc<LogStore>,
        grammar: Arc<Grammar>,
        preferences: Arc<PreferencesStore>,
        history: CommandHistory,
    ) -> Self {
        Self {
            pipeline,
            log,
            grammar,
            preferences,
            state: Mutex::new(InputState {
                text: String::new(),
                sticky: StickyContext::default(),
                history,
            }),
        }
    }

    pub fn log(&self) -> &Arc<LogStore> {
        &self.log
    }

    pub fn input(&self) -> String {
        self.lock().text.clone()
    }

    pub fn sticky(&self) -> StickyContext {
        self.lock().sticky
    }

    pub fn history(&self) -> Vec<String> {
        self.lock().history.entries().to_vec()
    }

    pub fn history_index(&self) -> Option<usize> {
        self.lock().history.index()
    }

    pub fn clear_history(&self) {
        self.lock().history.clear();
    }

    /// Apply one keystroke to the input line.
    ///
    /// Up/Down browse history, printable characters append, backspace deletes
    /// the last character. Cursor movement is left to the front end.
    pub fn handle_key(&self, key: Key) {
        let mut guard = self.lock();
        let state = &mut *guard;
        match key {
            Key::Up => {
                if let Some(text) = state.history.up(&state.text) {
                    state.text = text;
                }
            }
            Key::Down => {
                if let Some(text) = state.history.down() {
                    state.text = text;
                }
            }
            Key::Char(c) if !c.is_control() => state.text.push(c),
            Key::Backspace => {
                state.text.pop();
            }
            _ => {}
        }
        state.history.on_key(key);
        if !key.keeps_completion_context() {
            state.sticky = StickyContext::default();
        }
    }

    /// Clear the input line and its completion state, returning what was typed.
    pub fn take_input(&self) -> String {
        let mut state = self.lock();
        state.sticky = StickyContext::default();
        state.history.reset_cursor();
        std::mem::take(&mut state.text)
    }

    /// Type `text` one character at a time.
    pub fn type_text(&self, text: &str) {
        for c in text.chars() {
            self.handle_key(Key::Char(c));
        }
    }

    /// Completion candidates for the current input.
    pub fn candidates(&self) -> Vec<Candidate> {
        let commands = self.grammar.snapshot();
        let state = self.lock();
        AutocompleteEngine::build(&CompletionRequest {
            text: &state.text,
            commands: commands.as_deref(),
            browsing_history: state.history.is_browsing(),
            sticky: state.sticky,
        })
    }

    pub fn accept(&self, candidate: &Candidate) {
        let prefer_short = self.preferences.current().prefer_short_scpi;
        let mut state = self.lock();
        let applied = apply_completion(&state.text, candidate, prefer_short);
        state.text = applied.text;
        state.sticky = applied.sticky;
    }

    /// Send the current input.
    pub async fn submit(&self) -> SubmitOutcome {
        let text = self.input();
        self.submit_text(&text).await
    }

    /// Send `text` as if it had been typed and submitted.
    ///
    /// The input is cleared and the history cursor reset once the command is
    /// accepted; it joins the history after the dispatch settles.
    pub async fn submit_text(&self, text: &str) -> SubmitOutcome {
        let scpi = text.trim();
        if scpi.is_empty() || scpi == ":" || scpi == "*" {
            return SubmitOutcome::Rejected;
        }
        let Some(_busy) = self.pipeline.try_begin() else {
            debug!(%scpi, "dropped submission while busy");
            return SubmitOutcome::Dropped;
        };

        {
            let mut state = self.lock();
            state.text.clear();
            state.sticky = StickyContext::default();
            state.history.reset_cursor();
        }

        let outcome = self.pipeline.dispatch(&self.log, scpi).await;
        self.lock().history.add(scpi);
        SubmitOutcome::Sent(outcome)
    }

    /// Read one entry of the instrument error queue.
    pub async fn read_error_queue(&self) -> SubmitOutcome {
        self.submit_text(":SYST:ERR?").await
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InputState> {
        self.state.lock().expect("console input lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use sclipi_types::ConnectionParams;
    use sclipi_util::{InMemoryStateStore, StateStore};
    use tokio::sync::watch;

    use super::*;
    use crate::autocomplete::tests::sample_commands;
    use crate::notify::Notifier;
    use crate::testing::MockTransport;

    fn console(transport: Arc<MockTransport>) -> Console {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let (_sender, connection) = watch::channel(ConnectionParams::default());
        let pipeline = Arc::new(SendPipeline::new(transport, connection, Notifier::silent()));
        Console::new(
            pipeline,
            Arc::new(LogStore::new()),
            Arc::new(Grammar::with_commands(sample_commands())),
            Arc::new(PreferencesStore::load(store.clone())),
            CommandHistory::load(store),
        )
    }

    #[tokio::test]
    async fn rejects_empty_and_bare_separators() {
        let transport = Arc::new(MockTransport::new());
        let console = console(transport.clone());
        for text in ["", "   ", ":", "*"] {
            assert_eq!(console.submit_text(text).await, SubmitOutcome::Rejected);
        }
        assert!(transport.sent_scpi().is_empty());
        assert!(console.log().is_empty());
    }

    #[tokio::test]
    async fn drops_submissions_while_busy() {
        let transport = Arc::new(MockTransport::new());
        let console = console(transport.clone());
        let busy = console.pipeline.try_begin().unwrap();

        assert_eq!(console.submit_text("*IDN?").await, SubmitOutcome::Dropped);
        drop(busy);

        assert!(matches!(console.submit_text("*IDN?").await, SubmitOutcome::Sent(_)));
        assert_eq!(transport.sent_scpi(), ["*IDN?"]);
    }

    #[tokio::test]
    async fn submission_clears_input_and_records_history() {
        let transport = Arc::new(MockTransport::new());
        let console = console(transport.clone());
        console.type_text("meas:volt?");

        let SubmitOutcome::Sent(outcome) = console.submit().await else {
            panic!("expected the command to be sent");
        };
        assert_eq!(outcome.scpi, ":meas:volt?");
        assert_eq!(console.input(), "");
        assert_eq!(console.history(), ["meas:volt?"]);
        assert!(!console.pipeline.is_busy());
    }

    #[tokio::test]
    async fn history_browsing_through_keys() {
        let transport = Arc::new(MockTransport::new());
        let console = console(transport);
        console.submit_text("*RST").await;
        console.submit_text("*IDN?").await;

        console.handle_key(Key::Up);
        assert_eq!(console.input(), "*IDN?");
        assert_eq!(console.history_index(), Some(0));
        assert!(console.candidates().is_empty());

        console.handle_key(Key::Up);
        assert_eq!(console.input(), "*RST");
        console.handle_key(Key::Down);
        console.handle_key(Key::Down);
        assert_eq!(console.input(), "");
        assert_eq!(console.history_index(), None);

        console.handle_key(Key::Up);
        console.handle_key(Key::Backspace);
        assert_eq!(console.input(), "*IDN");
        assert_eq!(console.history_index(), None);
    }

    #[tokio::test]
    async fn completion_flow_through_a_suffixed_mnemonic() {
        let console = console(Arc::new(MockTransport::new()));
        console.type_text(":CH");

        let candidates = console.candidates();
        let suffixed = candidates
            .iter()
            .find(|c| matches!(c, Candidate::Mnemonic { node, .. } if node.suffixed))
            .unwrap()
            .clone();
        console.accept(&suffixed);
        assert_eq!(console.input(), ":CHANnel");
        assert!(console.sticky().has_suffix);

        console.handle_key(Key::Char('1'));
        assert!(console.sticky().has_suffix);
        let range = console.candidates();
        assert_eq!(range.first(), Some(&Candidate::Cardinality("1".into())));
        assert_eq!(range.len(), 8);

        console.accept(&Candidate::Cardinality("12".into()));
        assert_eq!(console.input(), ":CHANnel12");
        console.handle_key(Key::Char(':'));
        let labels: Vec<String> = console.candidates().iter().map(|c| c.label(false)).collect();
        assert_eq!(labels, ["OFFSet", "SCALe"]);
    }

    #[tokio::test]
    async fn non_digit_keys_reset_the_sticky_context() {
        let console = console(Arc::new(MockTransport::new()));
        console.accept(&Candidate::Mnemonic {
            node: sclipi_types::MnemonicNode::ranged("CHANnel", 1, 16),
            has_children: true,
        });
        console.handle_key(Key::Left);
        assert!(console.sticky().has_suffix);
        console.handle_key(Key::Char('x'));
        assert_eq!(console.sticky(), StickyContext::default());
    }

    #[tokio::test]
    async fn short_form_preference_applies_on_accept() {
        let console = console(Arc::new(MockTransport::new()));
        console.preferences.update(|p| p.prefer_short_scpi = true).unwrap();
        console.type_text(":me");
        let candidate = console.candidates().remove(0);
        console.accept(&candidate);
        assert_eq!(console.input(), ":MEAS:");
    }

    #[tokio::test]
    async fn short_form_preference_covers_the_suffixed_flow() {
        let console = console(Arc::new(MockTransport::new()));
        console.preferences.update(|p| p.prefer_short_scpi = true).unwrap();
        console.type_text(":ch");
        let suffixed = console
            .candidates()
            .into_iter()
            .find(|c| matches!(c, Candidate::Mnemonic { node, .. } if node.suffixed))
            .unwrap();
        console.accept(&suffixed);
        assert_eq!(console.input(), ":CHAN");

        console.handle_key(Key::Char('4'));
        assert_eq!(console.candidates(), vec![Candidate::Cardinality("4".into())]);
        console.accept(&Candidate::Cardinality("4".into()));
        assert_eq!(console.input(), ":CHAN4");
    }

    #[tokio::test]
    async fn take_input_clears_the_line_and_leaves_browsing() {
        let console = console(Arc::new(MockTransport::new()));
        console.submit_text("*RST").await;
        console.handle_key(Key::Up);
        assert_eq!(console.history_index(), Some(0));

        assert_eq!(console.take_input(), "*RST");
        assert_eq!(console.input(), "");
        assert_eq!(console.history_index(), None);
        assert_eq!(console.history(), ["*RST"]);
    }
}
