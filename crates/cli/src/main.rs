mod output;
mod session;
mod shell;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use sclipi_api::DEFAULT_SERVER_URL;
use sclipi_engine::{
    AutocompleteEngine, CompletionRequest, ExportKind, LogStore, Notification, Script, ScriptLoadError, StickyContext,
    SubmitOutcome, identify,
};
use sclipi_types::ScriptOrigin;
use sclipi_util::state_store::{INTERACTIVE_LOG_KEY, SCRIPT_LOG_KEY};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::output::{print_settled, write_export};
use crate::session::Session;

#[derive(Debug, Parser)]
#[command(name = "sclipi", version, about = "Console client for SCPI instruments behind a sclipi server")]
pub struct Cli {
    /// Base URL of the sclipi server.
    #[arg(long, env = "SCLIPI_SERVER", default_value = DEFAULT_SERVER_URL)]
    pub server: String,

    /// Instrument address, overriding the server's stored value for this run.
    #[arg(short, long, env = "SCLIPI_ADDRESS")]
    pub address: Option<String>,

    /// Instrument SCPI socket port, overriding the server's stored value for this run.
    #[arg(short, long, env = "SCLIPI_PORT")]
    pub port: Option<String>,

    /// Per-command timeout in seconds.
    #[arg(short, long, env = "SCLIPI_TIMEOUT")]
    pub timeout: Option<String>,

    /// Talk to the server's simulated instrument.
    #[arg(long)]
    pub simulated: bool,

    /// Do not drain the instrument error queue after each command.
    #[arg(long)]
    pub no_auto_syst_err: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send commands one after another and print the responses.
    Send {
        #[arg(required = true)]
        scpi: Vec<String>,
    },
    /// Run a script from a file, the clipboard, or the last loaded script.
    Script {
        file: Option<PathBuf>,
        #[arg(long, conflicts_with = "file")]
        clipboard: bool,
    },
    /// List completions for a partial command.
    Complete {
        text: String,
        /// Treat the text as ending in a just-accepted suffixed mnemonic.
        #[arg(long)]
        suffix: bool,
        /// The just-accepted mnemonic was a query.
        #[arg(long, requires = "suffix")]
        query: bool,
    },
    /// Interactive line shell (the default).
    Shell,
    /// Show or clear the command history.
    History {
        #[arg(long)]
        clear: bool,
    },
    /// Write the stored log to a file.
    Export {
        /// Only the commands, one per line.
        #[arg(long)]
        commands_only: bool,
        /// Export the script log instead of the interactive log.
        #[arg(long)]
        script: bool,
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// Check that the server is up.
    Health,
    /// Identify the instrument.
    Idn,
    /// Reset server and client preferences.
    ResetPreferences,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let (session, mut notifications) = Session::open(&cli).await?;

    let result = match cli.command.as_ref().unwrap_or(&Command::Shell) {
        Command::Shell => return shell::run(&session, notifications).await,
        Command::Send { scpi } => send(&session, scpi).await,
        Command::Script { file, clipboard } => run_script(&session, file.as_deref(), *clipboard).await,
        Command::Complete { text, suffix, query } => complete(&session, text, *suffix, *query).await,
        Command::History { clear } => {
            let console = session.console();
            if *clear {
                console.clear_history();
            }
            for entry in console.history() {
                println!("{entry}");
            }
            Ok(())
        }
        Command::Export {
            commands_only,
            script,
            output,
        } => {
            let key = if *script { SCRIPT_LOG_KEY } else { INTERACTIVE_LOG_KEY };
            let kind = if *commands_only { ExportKind::CommandsOnly } else { ExportKind::FullLog };
            let path = write_export(&LogStore::load(session.store.clone(), key), kind, output)?;
            println!("{}", path.display());
            Ok(())
        }
        Command::Health => {
            let health = session.transport.health().await.context("health check failed")?;
            println!("{}", health.trim());
            Ok(())
        }
        Command::Idn => match identify(session.transport.as_ref(), &session.settings.params()).await? {
            Some(idn) => {
                println!("{idn}");
                Ok(())
            }
            None => bail!("the instrument did not return a recognizable *IDN? response"),
        },
        Command::ResetPreferences => {
            let params = session.settings.reset().await.context("failed to reset preferences")?;
            println!("Preferences reset; server port {} address '{}'", params.port, params.address);
            Ok(())
        }
    };
    drain_notifications(&mut notifications);
    result
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Print every queued notification to stderr.
pub(crate) fn drain_notifications(notifications: &mut UnboundedReceiver<Notification>) {
    while let Ok(notification) = notifications.try_recv() {
        eprintln!("! {notification}");
    }
}

async fn send(session: &Session, commands: &[String]) -> Result<()> {
    let console = session.console();
    let show_date = session.preferences.current().show_date;
    for scpi in commands {
        match console.submit_text(scpi).await {
            SubmitOutcome::Sent(outcome) => {
                let entries = console.log().snapshot();
                let mut printed = entries
                    .iter()
                    .position(|entry| entry.unique_id == outcome.entry_id)
                    .unwrap_or(entries.len());
                print_settled(&entries, &mut printed, show_date);
            }
            SubmitOutcome::Rejected => bail!("'{scpi}' is not a command"),
            SubmitOutcome::Dropped => bail!("another command is still in flight"),
        }
    }
    Ok(())
}

async fn run_script(session: &Session, file: Option<&std::path::Path>, clipboard: bool) -> Result<()> {
    let mut buffer = session.script_buffer();
    let loaded = match (file, clipboard) {
        (Some(path), _) => Some(Script::from_file(path).await),
        (None, true) => Some(read_clipboard()),
        (None, false) => None,
    };
    if let Some(loaded) = loaded
        && !buffer.replace(loaded)
    {
        bail!("script not loaded");
    }
    let script = buffer.current().clone();
    if script.lines().is_empty() {
        bail!("no script loaded; pass a file or --clipboard");
    }

    let runner = session.script_runner();
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; stopping after the current command");
            on_interrupt.cancel();
        }
    });

    let show_date = session.preferences.current().show_date;
    let mut updates = runner.log().subscribe();
    let mut printed = 0;
    let run = runner.run(&script, &cancel);
    tokio::pin!(run);
    let report = loop {
        tokio::select! {
            report = &mut run => break report?,
            changed = updates.changed() => {
                if changed.is_ok() {
                    print_settled(&updates.borrow_and_update(), &mut printed, show_date);
                }
            }
        }
    };
    print_settled(&runner.log().snapshot(), &mut printed, show_date);
    println!("{}", report.summary());
    Ok(())
}

fn read_clipboard() -> Result<Script, ScriptLoadError> {
    let text = arboard::Clipboard::new()
        .and_then(|mut clipboard| clipboard.get_text())
        .map_err(|error| ScriptLoadError::Clipboard(error.to_string()))?;
    Ok(Script::new(text, ScriptOrigin::Clipboard))
}

async fn complete(session: &Session, text: &str, suffix: bool, query: bool) -> Result<()> {
    if !session.load_grammar().await {
        bail!("no instrument grammar available; set --port and --address");
    }
    let commands = session.grammar.snapshot();
    let candidates = AutocompleteEngine::build(&CompletionRequest {
        text,
        commands: commands.as_deref(),
        browsing_history: false,
        sticky: StickyContext {
            has_suffix: suffix,
            is_query: query,
        },
    });
    let prefer_short = session.preferences.current().prefer_short_scpi;
    for candidate in candidates {
        println!("{}", candidate.label(prefer_short));
    }
    Ok(())
}
