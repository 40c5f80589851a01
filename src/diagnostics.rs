//! Startup Diagnostics
//!
//! Environment checks run before the store opens. A critical failure stops
//! startup; everything else only degrades a channel and is logged as a
//! warning.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::config::LarderConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Ok,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct Check {
    pub name: &'static str,
    pub severity: Severity,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiagnosticsReport {
    pub checks: Vec<Check>,
}

impl DiagnosticsReport {
    fn push(&mut self, name: &'static str, severity: Severity, detail: impl Into<String>) {
        self.checks.push(Check {
            name,
            severity,
            detail: detail.into(),
        });
    }

    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.severity != Severity::Critical)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|c| c.severity == Severity::Warning)
    }

    pub fn log(&self) {
        for check in &self.checks {
            match check.severity {
                Severity::Ok => info!("✅ {}: {}", check.name, check.detail),
                Severity::Warning => warn!("⚠️  {}: {}", check.name, check.detail),
                Severity::Critical => error!("❌ {}: {}", check.name, check.detail),
            }
        }
    }
}

/// Run every startup check against the loaded configuration.
pub fn verify_environment(config: &LarderConfig) -> DiagnosticsReport {
    info!("🛡️  Diagnostics: verifying environment...");
    let mut report = DiagnosticsReport::default();

    check_database_dir(&config.database.path, &mut report);

    let feedback = &config.feedback;
    check_command("speech_command", feedback.speech_command.as_deref(), &mut report);
    check_command("sound_command", feedback.sound_command.as_deref(), &mut report);
    if feedback.sound_command.is_some() {
        for (name, path) in [
            ("success_sound", &feedback.sounds.success),
            ("error_sound", &feedback.sounds.error),
            ("warning_sound", &feedback.sounds.warning),
        ] {
            if path.exists() {
                report.push(name, Severity::Ok, path.display().to_string());
            } else {
                report.push(name, Severity::Warning, format!("{} not found", path.display()));
            }
        }
    }

    if let Some(path) = &config.commands.nlp.tokenizer_path {
        if !path.exists() {
            report.push(
                "tokenizer",
                Severity::Warning,
                format!("{} not found, verb tagging falls back to rules", path.display()),
            );
        }
    }

    report
}

/// Critical: the database directory must exist and be writable.
fn check_database_dir(db_path: &str, report: &mut DiagnosticsReport) {
    if db_path == ":memory:" {
        report.push("database", Severity::Warning, "in-memory database, nothing will persist");
        return;
    }

    let dir = match Path::new(db_path).parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    match std::fs::metadata(&dir) {
        Ok(meta) if meta.is_dir() && !meta.permissions().readonly() => {
            report.push("database", Severity::Ok, format!("{} is writable", dir.display()));
        }
        Ok(_) => report.push(
            "database",
            Severity::Critical,
            format!("{} is not a writable directory", dir.display()),
        ),
        Err(e) => report.push(
            "database",
            Severity::Critical,
            format!("{} is not accessible: {}", dir.display(), e),
        ),
    }
}

/// Warning: a configured external program should resolve on PATH.
fn check_command(name: &'static str, command: Option<&str>, report: &mut DiagnosticsReport) {
    let Some(program) = command.and_then(|c| c.split_whitespace().next()) else {
        report.push(name, Severity::Ok, "not configured, logging only");
        return;
    };
    match resolve_program(program) {
        Some(path) => report.push(name, Severity::Ok, path.display().to_string()),
        None => report.push(name, Severity::Warning, format!("'{}' not found on PATH", program)),
    }
}

fn resolve_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(program))
            .find(|p| p.is_file())
    })
}
