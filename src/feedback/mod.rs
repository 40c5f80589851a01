//! Feedback Dispatcher
//!
//! An owned background worker that drains a bounded queue into an
//! `AudioOutput`. Enqueueing never blocks: a full queue drops the message.
//! Speech and sound each sit behind their own circuit breaker, so a flaky
//! device degrades to log lines instead of stalling command processing.

mod audio;
mod breaker;

pub use audio::{AudioOutput, LogAudio, ProcessAudio, SoundKind};
pub use breaker::CircuitBreaker;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::FeedbackConfig;
use crate::safety::truncate_for_log;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackMessage {
    Speech(String),
    Sound(SoundKind),
}

struct Channels {
    sink: Arc<dyn AudioOutput>,
    speech: Arc<CircuitBreaker>,
    sound: Arc<CircuitBreaker>,
}

impl Channels {
    async fn deliver(&self, message: FeedbackMessage) {
        let sink = Arc::clone(&self.sink);
        let outcome = match message {
            FeedbackMessage::Speech(text) => {
                let breaker = Arc::clone(&self.speech);
                tokio::task::spawn_blocking(move || breaker.call(|| sink.speak(&text))).await
            }
            FeedbackMessage::Sound(kind) => {
                let breaker = Arc::clone(&self.sound);
                tokio::task::spawn_blocking(move || breaker.call(|| sink.play_sound(kind))).await
            }
        };
        if let Err(e) = outcome {
            warn!("Feedback delivery panicked: {}", e);
        }
    }
}

pub struct FeedbackDispatcher {
    queue: mpsc::Sender<FeedbackMessage>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    sink: Arc<dyn AudioOutput>,
    speech: Arc<CircuitBreaker>,
    sound: Arc<CircuitBreaker>,
    shutdown_timeout: Duration,
    dropped: AtomicU64,
}

impl FeedbackDispatcher {
    /// Spawn the worker on the current tokio runtime.
    pub fn start(config: &FeedbackConfig, sink: Arc<dyn AudioOutput>) -> Self {
        let (queue, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let speech = Arc::new(CircuitBreaker::new("speech", config.failure_threshold));
        let sound = Arc::new(CircuitBreaker::new("sound", config.failure_threshold));

        let channels = Channels {
            sink: Arc::clone(&sink),
            speech: Arc::clone(&speech),
            sound: Arc::clone(&sound),
        };
        let worker = tokio::spawn(run(rx, shutdown_rx, channels));
        info!("Feedback dispatcher started (queue capacity {})", config.queue_capacity);

        Self {
            queue,
            shutdown,
            worker: Mutex::new(Some(worker)),
            sink,
            speech,
            sound,
            shutdown_timeout: Duration::from_millis(config.shutdown_timeout_ms),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn speak(&self, text: impl Into<String>) -> bool {
        self.enqueue(FeedbackMessage::Speech(text.into()))
    }

    pub fn play_sound(&self, kind: SoundKind) -> bool {
        self.enqueue(FeedbackMessage::Sound(kind))
    }

    /// Non-blocking. Returns false when the message was dropped.
    pub fn enqueue(&self, message: FeedbackMessage) -> bool {
        match self.queue.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(message)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Feedback queue full, dropping {}", describe(&message));
                false
            }
            Err(mpsc::error::TrySendError::Closed(message)) => {
                debug!("Feedback dispatcher stopped, dropping {}", describe(&message));
                false
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn speech_enabled(&self) -> bool {
        !self.speech.is_open()
    }

    pub fn sound_enabled(&self) -> bool {
        !self.sound.is_open()
    }

    /// Stop the worker, draining what is queued within the shutdown timeout
    /// and cancelling the rest, then release the audio device. Idempotent.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let worker = self.worker.lock().ok().and_then(|mut slot| slot.take());
        let Some(mut worker) = worker else {
            return;
        };

        match tokio::time::timeout(self.shutdown_timeout, &mut worker).await {
            Ok(_) => info!("Feedback dispatcher stopped"),
            Err(_) => {
                warn!(
                    "Feedback dispatcher did not drain within {:?}, cancelling",
                    self.shutdown_timeout
                );
                worker.abort();
            }
        }

        let sink = Arc::clone(&self.sink);
        if let Err(e) = tokio::task::spawn_blocking(move || sink.close()).await {
            warn!("Closing audio output failed: {}", e);
        }
    }
}

async fn run(
    mut rx: mpsc::Receiver<FeedbackMessage>,
    mut shutdown: watch::Receiver<bool>,
    channels: Channels,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            message = rx.recv() => match message {
                Some(message) => channels.deliver(message).await,
                None => break,
            },
        }
    }

    rx.close();
    while let Ok(message) = rx.try_recv() {
        channels.deliver(message).await;
    }
}

fn describe(message: &FeedbackMessage) -> String {
    match message {
        FeedbackMessage::Speech(text) => format!("speech '{}'", truncate_for_log(text, 60)),
        FeedbackMessage::Sound(kind) => format!("{:?} sound", kind),
    }
}
