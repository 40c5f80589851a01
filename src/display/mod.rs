//! Inventory display collaborator and the worker that refreshes it.
//!
//! Refresh requests coalesce: while one is pending, further requests are
//! absorbed, and the next render always reads the store fresh.

use anyhow::Result;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::DisplayConfig;
use crate::store::InventoryStore;
use crate::types::InventoryEntry;

pub trait InventoryDisplay: Send + Sync {
    fn render(&self, items: &[InventoryEntry]) -> Result<()>;
}

/// Plain-text rendering to stdout.
#[derive(Debug, Clone)]
pub struct ConsoleDisplay {
    low_stock_threshold: u32,
}

impl ConsoleDisplay {
    pub fn new(config: &DisplayConfig) -> Self {
        Self {
            low_stock_threshold: config.low_stock_threshold,
        }
    }

    pub fn is_low(&self, entry: &InventoryEntry) -> bool {
        entry.quantity <= self.low_stock_threshold
    }

    pub fn format(&self, items: &[InventoryEntry]) -> String {
        if items.is_empty() {
            return "Inventory is empty.".to_string();
        }
        let width = items.iter().map(|e| e.canonical_name.chars().count()).max().unwrap_or(0);
        let mut out = String::from("Inventory\n");
        out.push_str(&"─".repeat(width + 12));
        for entry in items {
            out.push('\n');
            out.push_str(&format!("{:<width$}  {:>5}", entry.canonical_name, entry.quantity, width = width));
            if self.is_low(entry) {
                out.push_str("  (low)");
            }
        }
        out
    }
}

impl InventoryDisplay for ConsoleDisplay {
    fn render(&self, items: &[InventoryEntry]) -> Result<()> {
        println!("\n{}\n", self.format(items));
        Ok(())
    }
}

pub struct DisplayRefresher {
    requests: mpsc::Sender<()>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DisplayRefresher {
    /// Spawn the refresh worker on the current tokio runtime.
    pub fn start(store: Arc<dyn InventoryStore>, display: Arc<dyn InventoryDisplay>) -> Self {
        let (requests, rx) = mpsc::channel(1);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(run(rx, shutdown_rx, store, display));
        Self {
            requests,
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Fire-and-forget. A request already pending absorbs this one.
    pub fn request(&self) {
        match self.requests.try_send(()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(())) => debug!("Display refresh already pending"),
            Err(mpsc::error::TrySendError::Closed(())) => debug!("Display refresher stopped"),
        }
    }

    /// Render any pending refresh, then stop.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let worker = self.worker.lock().ok().and_then(|mut slot| slot.take());
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("Display refresher ended abnormally: {}", e);
            }
        }
    }
}

async fn run(
    mut rx: mpsc::Receiver<()>,
    mut shutdown: watch::Receiver<bool>,
    store: Arc<dyn InventoryStore>,
    display: Arc<dyn InventoryDisplay>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            request = rx.recv() => match request {
                Some(()) => refresh(&store, &display).await,
                None => break,
            },
        }
    }

    rx.close();
    if rx.try_recv().is_ok() {
        refresh(&store, &display).await;
    }
    info!("Display refresher stopped");
}

async fn refresh(store: &Arc<dyn InventoryStore>, display: &Arc<dyn InventoryDisplay>) {
    let store = Arc::clone(store);
    let display = Arc::clone(display);
    let result = tokio::task::spawn_blocking(move || -> Result<()> {
        let items = store.list_all()?;
        display.render(&items)
    })
    .await;

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Display refresh failed: {:#}", e),
        Err(e) => warn!("Display refresh panicked: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteInventoryStore;

    #[derive(Default)]
    struct RecordingDisplay {
        frames: Mutex<Vec<Vec<InventoryEntry>>>,
    }

    impl InventoryDisplay for RecordingDisplay {
        fn render(&self, items: &[InventoryEntry]) -> Result<()> {
            self.frames.lock().unwrap().push(items.to_vec());
            Ok(())
        }
    }

    fn entry(name: &str, quantity: u32) -> InventoryEntry {
        InventoryEntry {
            canonical_name: name.to_string(),
            quantity,
        }
    }

    #[test]
    fn test_console_format_marks_low_stock() {
        let display = ConsoleDisplay::new(&DisplayConfig::default());
        let text = display.format(&[entry("salmon", 2), entry("steak", 8)]);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[2].starts_with("salmon") && lines[2].ends_with("(low)"));
        assert!(!lines[3].contains("(low)"));
        assert_eq!(display.format(&[]), "Inventory is empty.");
    }

    #[tokio::test]
    async fn test_refresh_renders_current_store() {
        let store = Arc::new(SqliteInventoryStore::open_in_memory().unwrap());
        let display = Arc::new(RecordingDisplay::default());
        let refresher = DisplayRefresher::start(store.clone(), display.clone());

        store.add("salmon", 3).unwrap();
        refresher.request();
        refresher.request();
        refresher.request();
        refresher.shutdown().await;

        let frames = display.frames.lock().unwrap();
        assert!(!frames.is_empty() && frames.len() <= 2);
        assert_eq!(frames.last().unwrap(), &vec![entry("salmon", 3)]);
    }
}
