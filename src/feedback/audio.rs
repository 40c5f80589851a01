//! Audio collaborators. Everything here is allowed to fail; callers wrap each
//! channel in a `CircuitBreaker`.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::info;

use crate::config::{FeedbackConfig, SoundFiles};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundKind {
    Success,
    Error,
    Warning,
}

impl SoundKind {
    pub fn path(self, sounds: &SoundFiles) -> &Path {
        match self {
            SoundKind::Success => &sounds.success,
            SoundKind::Error => &sounds.error,
            SoundKind::Warning => &sounds.warning,
        }
    }
}

/// Text-to-speech and sound-effect output. Calls block; the dispatcher runs
/// them off the async workers.
pub trait AudioOutput: Send + Sync {
    fn speak(&self, text: &str) -> Result<()>;
    fn play_sound(&self, kind: SoundKind) -> Result<()>;

    /// Release the underlying device. Called once at shutdown.
    fn close(&self) {}
}

/// Writes feedback to the log instead of a device.
#[derive(Debug, Default)]
pub struct LogAudio;

impl AudioOutput for LogAudio {
    fn speak(&self, text: &str) -> Result<()> {
        info!("🔊 {}", text);
        Ok(())
    }

    fn play_sound(&self, kind: SoundKind) -> Result<()> {
        info!("🔔 {:?} sound", kind);
        Ok(())
    }
}

/// Shells out to an external TTS program (`<cmd> <text>`) and an external
/// player (`<cmd> <file>`). A missing command degrades that channel to logging.
#[derive(Debug, Clone)]
pub struct ProcessAudio {
    speech_command: Option<Vec<String>>,
    sound_command: Option<Vec<String>>,
    sounds: SoundFiles,
}

impl ProcessAudio {
    pub fn from_config(config: &FeedbackConfig) -> Self {
        let split = |cmd: &Option<String>| {
            cmd.as_deref()
                .map(|c| c.split_whitespace().map(str::to_string).collect::<Vec<_>>())
                .filter(|parts| !parts.is_empty())
        };
        Self {
            speech_command: split(&config.speech_command),
            sound_command: split(&config.sound_command),
            sounds: config.sounds.clone(),
        }
    }

    fn run(command: &[String], arg: &str) -> Result<()> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow!("empty audio command"))?;
        let status = Command::new(program)
            .args(args)
            .arg(arg)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("failed to spawn {}", program))?;
        if !status.success() {
            bail!("{} exited with {}", program, status);
        }
        Ok(())
    }

    pub fn sound_path(&self, kind: SoundKind) -> PathBuf {
        kind.path(&self.sounds).to_path_buf()
    }
}

impl AudioOutput for ProcessAudio {
    fn speak(&self, text: &str) -> Result<()> {
        let clean = text.replace(['\n', '\r'], " ");
        if clean.trim().is_empty() {
            return Ok(());
        }
        match &self.speech_command {
            Some(command) => Self::run(command, &clean),
            None => LogAudio.speak(&clean),
        }
    }

    fn play_sound(&self, kind: SoundKind) -> Result<()> {
        let Some(command) = &self.sound_command else {
            return LogAudio.play_sound(kind);
        };
        let path = kind.path(&self.sounds);
        if !path.exists() {
            bail!("sound file {} not found", path.display());
        }
        Self::run(command, &path.to_string_lossy())
    }
}
