//! Larder
//!
//! Reads one utterance per line (from a speech recognizer piped into stdin,
//! or typed), applies it to the inventory and prints each outcome as a JSON
//! line on stdout. Logs go to stderr.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use larder::command::CommandInterpreter;
use larder::config::LarderConfig;
use larder::diagnostics;
use larder::display::{ConsoleDisplay, DisplayRefresher};
use larder::feedback::{AudioOutput, FeedbackDispatcher, ProcessAudio};
use larder::listener::{self, Heard, LineSource};
use larder::logging;
use larder::orchestrator::InventoryOrchestrator;
use larder::store::{InventoryStore, SqliteInventoryStore};

/// `--config <path>` or `--config=<path>`, else `LARDER_CONFIG`.
fn config_path() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    std::env::var_os("LARDER_CONFIG").map(PathBuf::from)
}

// ──────────────────────────────────────────────────────────────────────────────
// MAIN ENTRY POINT
// ──────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config = LarderConfig::load(config_path().as_deref()).context("failed to load configuration")?;
    let _log_guard = logging::init_logging(&config.system)?;
    info!("Larder v{} starting", env!("CARGO_PKG_VERSION"));

    let report = diagnostics::verify_environment(&config);
    report.log();
    if !report.passed() {
        bail!("critical startup checks failed");
    }

    // Migration failures abort startup here.
    let store: Arc<dyn InventoryStore> = Arc::new(
        SqliteInventoryStore::open(
            &config.database.path,
            Duration::from_secs(config.database.commit_timeout_secs),
        )
        .context("failed to initialize inventory database")?,
    );
    match store.last_mutation() {
        Ok(Some(record)) => info!(
            "Undo target from last session: {} '{}' ({} -> {})",
            record.operation_kind, record.canonical_name, record.previous_quantity, record.new_quantity
        ),
        Ok(None) => {}
        Err(e) => warn!("Could not read mutation history: {}", e),
    }

    let interpreter = CommandInterpreter::from_config(&config.commands)?;
    info!("Verb tagger: {}", interpreter.tagger_name());

    let audio: Arc<dyn AudioOutput> = Arc::new(ProcessAudio::from_config(&config.feedback));
    let feedback = Arc::new(FeedbackDispatcher::start(&config.feedback, audio));

    let mut orchestrator = InventoryOrchestrator::new(interpreter, Arc::clone(&store)).with_feedback(Arc::clone(&feedback));
    let display = if config.display.enabled {
        let refresher = Arc::new(DisplayRefresher::start(
            Arc::clone(&store),
            Arc::new(ConsoleDisplay::new(&config.display)),
        ));
        refresher.request();
        orchestrator = orchestrator.with_display(Arc::clone(&refresher));
        Some(refresher)
    } else {
        None
    };
    let orchestrator = Arc::new(orchestrator);

    let (tx, mut rx) = mpsc::channel(8);
    std::thread::spawn(move || listener::pump(LineSource::stdin(), tx));
    info!("Listening for commands");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, shutting down");
                break;
            }
            heard = rx.recv() => {
                let Some(heard) = heard else { break };
                let orchestrator = Arc::clone(&orchestrator);
                let outcome = tokio::task::spawn_blocking(move || match heard {
                    Heard::Utterance(text) => orchestrator.process_command(&text),
                    Heard::Unintelligible => orchestrator.report_unintelligible(),
                })
                .await?;
                println!("{}", serde_json::to_string(&outcome)?);
            }
        }
    }

    feedback.shutdown().await;
    if let Some(display) = display {
        display.shutdown().await;
    }
    info!("Larder stopped");
    Ok(())
}
