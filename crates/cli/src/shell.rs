//! Interactive console.
//!
//! On a terminal the shell reads raw key events: completions for the input
//! are shown beside the prompt, Tab picks one, Up and Down browse history.
//! Piped input is read line by line instead. Either way each line is sent as
//! one SCPI command, and lines starting with `!` are shell directives.

use std::io::{IsTerminal, Write};
use std::path::Path;

use anyhow::{Context, Result};
use crossterm::cursor::{MoveToColumn, RestorePosition, SavePosition};
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::queue;
use crossterm::style::{Print, PrintStyledContent, Stylize};
use crossterm::terminal::{Clear, ClearType, disable_raw_mode, enable_raw_mode};
use futures_util::StreamExt;
use sclipi_engine::{
    AutocompleteEngine, CompletionRequest, Console, ExportKind, Key, Notification, StickyContext, SubmitOutcome,
    identify,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::drain_notifications;
use crate::output::{print_settled, write_export};
use crate::session::Session;

const PROMPT: &str = "sclipi> ";
const SHOWN_CANDIDATES: usize = 8;

const HELP: &str = "\
Type an SCPI command to send it, e.g. `*IDN?` or `MEAS:VOLT?`.
Tab completes, Up and Down cycle through your command history.
  !complete <text>   list completions for <text>
  !history           show command history
  !clear-history     forget command history
  !clear             clear the log
  !err               read the instrument error queue
  !idn               identify the instrument
  !export [commands] write the log (or just its commands) to a file
  !help              show this help
  !quit              leave the shell";

#[derive(Debug, PartialEq, Eq)]
enum Directive<'a> {
    Send(&'a str),
    Complete(&'a str),
    History,
    ClearHistory,
    ClearLog,
    ErrorQueue,
    Identify,
    Export(ExportKind),
    Help,
    Quit,
    Unknown(&'a str),
}

fn parse_line(line: &str) -> Directive<'_> {
    let line = line.trim();
    let Some(directive) = line.strip_prefix('!') else {
        return Directive::Send(line);
    };
    let (name, argument) = directive.split_once(' ').unwrap_or((directive, ""));
    match name {
        "complete" => Directive::Complete(argument.trim_start()),
        "history" => Directive::History,
        "clear-history" => Directive::ClearHistory,
        "clear" => Directive::ClearLog,
        "err" => Directive::ErrorQueue,
        "idn" => Directive::Identify,
        "export" if argument.trim() == "commands" => Directive::Export(ExportKind::CommandsOnly),
        "export" => Directive::Export(ExportKind::FullLog),
        "help" | "?" => Directive::Help,
        "quit" | "exit" => Directive::Quit,
        _ => Directive::Unknown(line),
    }
}

/// What a terminal key event asks the prompt to do.
#[derive(Debug, PartialEq, Eq)]
enum Action {
    Edit(Key),
    Complete,
    Submit,
    /// Ctrl-C: drop the input, or leave when there is none.
    Interrupt,
    Quit,
    Ignore,
}

fn translate(event: &KeyEvent) -> Action {
    if event.kind == KeyEventKind::Release {
        return Action::Ignore;
    }
    if event.modifiers.contains(KeyModifiers::CONTROL) {
        return match event.code {
            KeyCode::Char('c') => Action::Interrupt,
            KeyCode::Char('d') => Action::Quit,
            _ => Action::Ignore,
        };
    }
    let key = match event.code {
        KeyCode::Tab => return Action::Complete,
        KeyCode::Enter => return Action::Submit,
        KeyCode::Char(c) => Key::Char(c),
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Delete => Key::Delete,
        KeyCode::Left => Key::Left,
        KeyCode::Right => Key::Right,
        KeyCode::Up => Key::Up,
        KeyCode::Down => Key::Down,
        KeyCode::Home => Key::Home,
        KeyCode::End => Key::End,
        KeyCode::Esc => Key::Escape,
        _ => return Action::Ignore,
    };
    Action::Edit(key)
}

/// Tab with several candidates moves the highlight; Enter then accepts it.
fn next_highlight(highlight: Option<usize>, candidates: usize) -> Option<usize> {
    match (highlight, candidates) {
        (_, 0) => None,
        (None, _) => Some(0),
        (Some(index), count) => Some((index + 1) % count),
    }
}

enum Flow {
    Continue,
    Quit,
}

pub async fn run(session: &Session, notifications: UnboundedReceiver<Notification>) -> Result<()> {
    if !session.load_grammar().await {
        println!("No instrument grammar loaded; completion is unavailable.");
    }
    let console = session.console();
    if std::io::stdin().is_terminal() {
        run_prompt(session, &console, notifications).await
    } else {
        run_lines(session, &console, notifications).await
    }
}

async fn run_lines(
    session: &Session,
    console: &Console,
    mut notifications: UnboundedReceiver<Notification>,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{PROMPT}");
        std::io::stdout().flush().context("failed to flush stdout")?;
        let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
            break;
        };
        let flow = execute(session, console, &line).await?;
        drain_notifications(&mut notifications);
        if let Flow::Quit = flow {
            break;
        }
    }
    Ok(())
}

/// Restores cooked mode when the prompt exits, including on error.
struct RawMode;

impl RawMode {
    fn enable() -> Result<Self> {
        enable_raw_mode().context("failed to enable raw terminal mode")?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

async fn run_prompt(
    session: &Session,
    console: &Console,
    mut notifications: UnboundedReceiver<Notification>,
) -> Result<()> {
    let mut stdout = std::io::stdout();
    let mut events = EventStream::new();
    let mut highlight: Option<usize> = None;
    let _raw = RawMode::enable()?;
    redraw(session, console, highlight)?;

    while let Some(event) = events.next().await {
        let Event::Key(key) = event.context("failed to read terminal input")? else {
            continue;
        };
        match translate(&key) {
            Action::Ignore => continue,
            Action::Quit => break,
            Action::Interrupt => {
                highlight = None;
                if console.take_input().is_empty() {
                    break;
                }
            }
            Action::Edit(key) => {
                highlight = None;
                console.handle_key(key);
            }
            Action::Complete => {
                let candidates = console.candidates();
                if let [only] = candidates.as_slice() {
                    console.accept(only);
                    highlight = None;
                } else {
                    highlight = next_highlight(highlight, candidates.len());
                }
            }
            Action::Submit => {
                if let Some(index) = highlight.take() {
                    if let Some(candidate) = console.candidates().get(index) {
                        console.accept(candidate);
                    }
                } else {
                    let line = console.take_input();
                    render(&mut stdout, &line, &[], None)?;
                    queue!(stdout, Print("\r\n")).context("failed to write to terminal")?;
                    stdout.flush().context("failed to flush stdout")?;

                    disable_raw_mode().context("failed to leave raw terminal mode")?;
                    let flow = execute(session, console, &line).await;
                    drain_notifications(&mut notifications);
                    enable_raw_mode().context("failed to enable raw terminal mode")?;
                    if let Flow::Quit = flow? {
                        break;
                    }
                }
            }
        }
        redraw(session, console, highlight)?;
    }

    queue!(stdout, Print("\r\n")).context("failed to write to terminal")?;
    stdout.flush().context("failed to flush stdout")?;
    Ok(())
}

fn redraw(session: &Session, console: &Console, highlight: Option<usize>) -> Result<()> {
    let prefer_short = session.preferences.current().prefer_short_scpi;
    let labels: Vec<String> = console
        .candidates()
        .iter()
        .map(|candidate| candidate.label(prefer_short))
        .collect();
    render(&mut std::io::stdout(), &console.input(), &labels, highlight)
}

/// Draw the prompt line with a window of candidates after the input.
fn render(out: &mut impl Write, input: &str, labels: &[String], highlight: Option<usize>) -> Result<()> {
    queue!(out, MoveToColumn(0), Clear(ClearType::UntilNewLine), Print(PROMPT), Print(input))
        .context("failed to write to terminal")?;
    if !labels.is_empty() {
        let start = highlight.map_or(0, |index| (index + 1).saturating_sub(SHOWN_CANDIDATES));
        queue!(out, SavePosition, Print("   ")).context("failed to write to terminal")?;
        for (index, label) in labels.iter().enumerate().skip(start).take(SHOWN_CANDIDATES) {
            let styled = if Some(index) == highlight {
                label.as_str().reverse()
            } else {
                label.as_str().dark_grey()
            };
            queue!(out, PrintStyledContent(styled), Print(" ")).context("failed to write to terminal")?;
        }
        if labels.len() > start + SHOWN_CANDIDATES {
            queue!(out, Print("…")).context("failed to write to terminal")?;
        }
        queue!(out, RestorePosition).context("failed to write to terminal")?;
    }
    out.flush().context("failed to flush stdout")?;
    Ok(())
}

async fn execute(session: &Session, console: &Console, line: &str) -> Result<Flow> {
    match parse_line(line) {
        Directive::Send(scpi) => submit(session, console, console.submit_text(scpi).await),
        Directive::ErrorQueue => submit(session, console, console.read_error_queue().await),
        Directive::Complete(text) => print_completions(session, text),
        Directive::History => {
            for (index, entry) in console.history().iter().enumerate() {
                println!("{index:>4}  {entry}");
            }
        }
        Directive::ClearHistory => console.clear_history(),
        Directive::ClearLog => console.log().clear(),
        Directive::Identify => match identify(session.transport.as_ref(), &session.settings.params()).await {
            Ok(Some(idn)) => println!("{idn}"),
            Ok(None) => println!("The instrument did not identify itself."),
            Err(error) => println!("*IDN? failed: {error}"),
        },
        Directive::Export(kind) => {
            let path = write_export(console.log(), kind, Path::new("."))?;
            println!("Wrote {}", path.display());
        }
        Directive::Help => println!("{HELP}"),
        Directive::Quit => return Ok(Flow::Quit),
        Directive::Unknown(line) => println!("Unknown directive {line}; try !help"),
    }
    Ok(Flow::Continue)
}

fn submit(session: &Session, console: &Console, outcome: SubmitOutcome) {
    match outcome {
        SubmitOutcome::Sent(outcome) => {
            let entries = console.log().snapshot();
            let Some(start) = entries.iter().position(|entry| entry.unique_id == outcome.entry_id) else {
                return;
            };
            let mut printed = start;
            print_settled(&entries, &mut printed, session.preferences.current().show_date);
        }
        SubmitOutcome::Dropped => println!("Busy; command dropped."),
        SubmitOutcome::Rejected => {}
    }
}

fn print_completions(session: &Session, text: &str) {
    let commands = session.grammar.snapshot();
    let candidates = AutocompleteEngine::build(&CompletionRequest {
        text,
        commands: commands.as_deref(),
        browsing_history: false,
        sticky: StickyContext::default(),
    });
    let prefer_short = session.preferences.current().prefer_short_scpi;
    for candidate in candidates {
        println!("{}", candidate.label(prefer_short));
    }
}
