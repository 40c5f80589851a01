//! Inventory Orchestrator
//!
//! Composes the interpreter and the store behind `process_command`, the one
//! externally meaningful entry point. Collaborators are injected at
//! construction; announcing results and refreshing the display are
//! fire-and-forget and never change the outcome of a command.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::command::{CommandInterpreter, Operation};
use crate::display::DisplayRefresher;
use crate::error::{InventoryError, StoreError};
use crate::feedback::{FeedbackDispatcher, SoundKind};
use crate::safety::truncate_for_log;
use crate::store::InventoryStore;
use crate::types::{InventoryEntry, ItemQuantity, MutationKind};

pub const UNDONE: &str = "Last change has been undone.";
pub const UNINTELLIGIBLE: &str = "Could not understand audio. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub success: bool,
    pub feedback: String,
}

impl CommandOutcome {
    pub fn succeeded(feedback: impl Into<String>) -> Self {
        Self {
            success: true,
            feedback: feedback.into(),
        }
    }

    pub fn failed(feedback: impl Into<String>) -> Self {
        Self {
            success: false,
            feedback: feedback.into(),
        }
    }
}

/// The line announced after a mutation leaves `item` at `quantity`.
pub fn quantity_feedback(item: &str, quantity: u32) -> String {
    if quantity == 0 {
        format!("{} has been removed from inventory.", item)
    } else {
        format!("{} now has {} in inventory.", item, quantity)
    }
}

pub struct InventoryOrchestrator {
    interpreter: CommandInterpreter,
    store: Arc<dyn InventoryStore>,
    feedback: Option<Arc<FeedbackDispatcher>>,
    display: Option<Arc<DisplayRefresher>>,
}

impl InventoryOrchestrator {
    pub fn new(interpreter: CommandInterpreter, store: Arc<dyn InventoryStore>) -> Self {
        Self {
            interpreter,
            store,
            feedback: None,
            display: None,
        }
    }

    pub fn with_feedback(mut self, feedback: Arc<FeedbackDispatcher>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn with_display(mut self, display: Arc<DisplayRefresher>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn interpreter(&self) -> &CommandInterpreter {
        &self.interpreter
    }

    pub fn inventory(&self) -> Result<Vec<InventoryEntry>, StoreError> {
        self.store.list_all()
    }

    /// Interpret and apply one utterance, announce the result and request a
    /// display refresh when the inventory changed.
    pub fn process_command(&self, text: &str) -> CommandOutcome {
        info!("Processing command: '{}'", truncate_for_log(text, 120));
        let outcome = match self.execute(text) {
            Ok(feedback) => CommandOutcome::succeeded(feedback),
            Err(e) => {
                match &e {
                    InventoryError::Store(source) => warn!("Command failed: {}", source),
                    other => info!("Command not applied: {}", other),
                }
                CommandOutcome::failed(e.feedback())
            }
        };

        self.announce(&outcome);
        if outcome.success {
            if let Some(display) = &self.display {
                display.request();
            }
        }
        outcome
    }

    /// Report a listening session that produced no usable text.
    pub fn report_unintelligible(&self) -> CommandOutcome {
        let outcome = CommandOutcome::failed(UNINTELLIGIBLE);
        self.announce(&outcome);
        outcome
    }

    /// The command pipeline without side channels.
    pub fn execute(&self, text: &str) -> Result<String, InventoryError> {
        self.interpreter
            .guard()
            .check(text)
            .map_err(|rejection| InventoryError::InputRejected(rejection.to_string()))?;

        match self.interpreter.interpret(text) {
            Operation::Add(target) => self.apply(MutationKind::Add, &target),
            Operation::Remove(target) => self.apply(MutationKind::Remove, &target),
            Operation::Set(target) => self.apply(MutationKind::Set, &target),
            Operation::Undo => match self.store.undo()? {
                Some(_) => Ok(UNDONE.to_string()),
                None => Err(InventoryError::UndoUnavailable),
            },
            Operation::Unrecognized => Err(InventoryError::Unrecognized),
            Operation::Incomplete { kind, reason } => {
                info!("Incomplete {} command: {}", kind, reason);
                Err(InventoryError::ValidationFailed(reason))
            }
        }
    }

    fn apply(&self, kind: MutationKind, target: &ItemQuantity) -> Result<String, InventoryError> {
        let record = match kind {
            MutationKind::Add => self.store.add(&target.item, target.quantity)?,
            MutationKind::Remove => self.store.remove(&target.item, target.quantity)?,
            MutationKind::Set => self.store.set(&target.item, target.quantity)?,
        };
        info!(item = %record.canonical_name, quantity = record.new_quantity, "Applied {}", kind);
        Ok(quantity_feedback(&record.canonical_name, record.new_quantity))
    }

    fn announce(&self, outcome: &CommandOutcome) {
        let Some(feedback) = &self.feedback else {
            return;
        };
        feedback.speak(outcome.feedback.clone());
        feedback.play_sound(if outcome.success { SoundKind::Success } else { SoundKind::Error });
    }
}
