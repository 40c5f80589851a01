//! End-to-end scenarios through `InventoryOrchestrator`, with a real
//! on-disk store and the feedback/display workers attached.

use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::NamedTempFile;

use larder::command::CommandInterpreter;
use larder::config::{CommandConfig, DisplayConfig, FeedbackConfig};
use larder::display::{ConsoleDisplay, DisplayRefresher};
use larder::feedback::{AudioOutput, FeedbackDispatcher, SoundKind};
use larder::orchestrator::{CommandOutcome, InventoryOrchestrator, UNDONE};
use larder::store::{InventoryStore, SqliteInventoryStore};

#[derive(Default)]
struct CapturedAudio {
    spoken: Mutex<Vec<String>>,
    sounds: Mutex<Vec<SoundKind>>,
}

impl AudioOutput for CapturedAudio {
    fn speak(&self, text: &str) -> Result<()> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn play_sound(&self, kind: SoundKind) -> Result<()> {
        self.sounds.lock().unwrap().push(kind);
        Ok(())
    }
}

fn orchestrator(store: Arc<dyn InventoryStore>) -> InventoryOrchestrator {
    let interpreter = CommandInterpreter::from_config(&CommandConfig::default()).unwrap();
    InventoryOrchestrator::new(interpreter, store)
}

fn temp_store(file: &NamedTempFile) -> Arc<SqliteInventoryStore> {
    Arc::new(SqliteInventoryStore::open(file.path(), Duration::from_secs(5)).unwrap())
}

#[test]
fn test_add_chicken_tenders() {
    let file = NamedTempFile::new().unwrap();
    let orch = orchestrator(temp_store(&file));
    assert_eq!(
        orch.process_command("Add 3 chicken tenders"),
        CommandOutcome::succeeded("chicken tenders now has 3 in inventory.")
    );
}

#[test]
fn test_set_tilapia_lands_on_white_fish() {
    let file = NamedTempFile::new().unwrap();
    let store = temp_store(&file);
    let orch = orchestrator(store.clone());
    assert_eq!(
        orch.process_command("Set tilapia to 3"),
        CommandOutcome::succeeded("white fish now has 3 in inventory.")
    );
    assert_eq!(store.quantity("white fish").unwrap(), 3);
    assert_eq!(store.quantity("tilapia").unwrap(), 0);
}

#[test]
fn test_undo_with_empty_history() {
    let file = NamedTempFile::new().unwrap();
    let orch = orchestrator(temp_store(&file));
    let outcome = orch.process_command("Undo");
    assert!(!outcome.success);
    assert!(outcome.feedback.to_lowercase().contains("nothing to undo"));
}

#[test]
fn test_unrecognized_records_nothing() {
    let file = NamedTempFile::new().unwrap();
    let store = temp_store(&file);
    let orch = orchestrator(store.clone());
    let outcome = orch.process_command("Fly to the moon");
    assert_eq!(
        outcome,
        CommandOutcome::failed("Command not recognized. Please try again with a valid command.")
    );
    assert!(store.last_mutation().unwrap().is_none());
    assert!(store.list_all().unwrap().is_empty());
}

#[test]
fn test_to_and_two_in_one_session() {
    let file = NamedTempFile::new().unwrap();
    let store = temp_store(&file);
    let orch = orchestrator(store.clone());
    assert!(orch.process_command("set salmon to 3").success);
    assert_eq!(store.quantity("salmon").unwrap(), 3);
    assert!(orch.process_command("add two salmon").success);
    assert_eq!(store.quantity("salmon").unwrap(), 5);
}

#[test]
fn test_round_trip_and_floor() {
    let file = NamedTempFile::new().unwrap();
    let store = temp_store(&file);
    let orch = orchestrator(store.clone());

    orch.process_command("add 4 steaks");
    orch.process_command("add 6 steaks");
    orch.process_command("remove 6 steaks");
    assert_eq!(store.quantity("steak").unwrap(), 4);

    let outcome = orch.process_command("remove 10 steaks");
    assert_eq!(outcome.feedback, "steak has been removed from inventory.");
    assert_eq!(store.quantity("steak").unwrap(), 0);
}

#[test]
fn test_state_and_undo_target_survive_restart() {
    let file = NamedTempFile::new().unwrap();
    {
        let orch = orchestrator(temp_store(&file));
        orch.process_command("add 2 ice cream");
        orch.process_command("add 12 chicken nuggets");
    }

    let store = temp_store(&file);
    let orch = orchestrator(store.clone());
    assert_eq!(store.quantity("ice cream").unwrap(), 2);
    assert_eq!(orch.process_command("undo").feedback, UNDONE);
    assert_eq!(store.quantity("ice cream").unwrap(), 2);
    assert!(!orch.process_command("undo").success);
}

#[test]
fn test_commit_timeout_reports_failure_and_keeps_state() {
    let file = NamedTempFile::new().unwrap();
    let store = Arc::new(SqliteInventoryStore::open(file.path(), Duration::from_millis(50)).unwrap());
    let orch = orchestrator(store.clone());
    assert!(orch.process_command("add 3 salmon").success);

    let other = rusqlite::Connection::open(file.path()).unwrap();
    other.execute_batch("BEGIN IMMEDIATE;").unwrap();
    assert_eq!(
        orch.process_command("add 2 salmon"),
        CommandOutcome::failed("Command failed to execute. Please try again.")
    );
    other.execute_batch("ROLLBACK;").unwrap();

    assert_eq!(store.quantity("salmon").unwrap(), 3);
    assert_eq!(orch.process_command("undo").feedback, UNDONE);
    assert_eq!(store.quantity("salmon").unwrap(), 0);
}

#[tokio::test]
async fn test_feedback_and_display_are_fire_and_forget() {
    let file = NamedTempFile::new().unwrap();
    let store = temp_store(&file);
    let audio = Arc::new(CapturedAudio::default());
    let feedback = Arc::new(FeedbackDispatcher::start(&FeedbackConfig::default(), audio.clone()));
    let display = Arc::new(DisplayRefresher::start(
        store.clone(),
        Arc::new(ConsoleDisplay::new(&DisplayConfig::default())),
    ));
    let interpreter = CommandInterpreter::from_config(&CommandConfig::default()).unwrap();
    let orch = InventoryOrchestrator::new(interpreter, store.clone())
        .with_feedback(feedback.clone())
        .with_display(display.clone());

    assert!(orch.process_command("add 3 salmon").success);
    assert!(!orch.process_command("fly to the moon").success);
    orch.report_unintelligible();

    feedback.shutdown().await;
    display.shutdown().await;

    assert_eq!(
        *audio.spoken.lock().unwrap(),
        vec![
            "salmon now has 3 in inventory.",
            "Command not recognized. Please try again with a valid command.",
            "Could not understand audio. Please try again.",
        ]
    );
    assert_eq!(
        *audio.sounds.lock().unwrap(),
        vec![SoundKind::Success, SoundKind::Error, SoundKind::Error]
    );
}
