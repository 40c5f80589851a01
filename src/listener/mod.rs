//! Speech-to-text collaborator.
//!
//! The core only consumes recognized text. `LineSource` stands in for a
//! recognizer by reading one utterance per line, which is also how the
//! binary is driven from a terminal or a pipe.

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, IsTerminal, Stdin, Write};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// What one listening session produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Heard {
    Utterance(String),
    /// Audio was captured but nothing intelligible came out of it.
    Unintelligible,
}

pub trait SpeechSource: Send {
    /// Run one listening session. `Ok(None)` means nothing intelligible was
    /// heard.
    fn listen(&mut self) -> Result<Option<String>>;

    /// True once the source can produce nothing more.
    fn is_closed(&self) -> bool {
        false
    }
}

pub struct LineSource<R> {
    reader: R,
    prompt: Option<String>,
    closed: bool,
}

impl LineSource<BufReader<Stdin>> {
    /// Prompts only when attached to a terminal.
    pub fn stdin() -> Self {
        let stdin = std::io::stdin();
        let interactive = stdin.is_terminal();
        let source = Self::new(BufReader::new(stdin));
        if interactive {
            source.with_prompt("🎙️  > ")
        } else {
            source
        }
    }
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            prompt: None,
            closed: false,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

impl<R: BufRead + Send> SpeechSource for LineSource<R> {
    fn listen(&mut self) -> Result<Option<String>> {
        if let Some(prompt) = &self.prompt {
            print!("{}", prompt);
            std::io::stdout().flush().ok();
        }

        let mut line = String::new();
        let read = self.reader.read_line(&mut line).context("failed to read input line")?;
        if read == 0 {
            self.closed = true;
            return Ok(None);
        }

        let text = line.trim();
        if text.is_empty() {
            return Ok(None);
        }
        Ok(Some(text.to_string()))
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Drive a source on the calling (blocking) thread, forwarding results until
/// the source closes or the receiver goes away.
pub fn pump<S: SpeechSource>(mut source: S, tx: mpsc::Sender<Heard>) {
    loop {
        let heard = match source.listen() {
            Ok(Some(text)) => Heard::Utterance(text),
            Ok(None) if source.is_closed() => break,
            Ok(None) => Heard::Unintelligible,
            Err(e) => {
                warn!("Listening failed: {:#}", e);
                Heard::Unintelligible
            }
        };
        if tx.blocking_send(heard).is_err() {
            debug!("Listener receiver dropped");
            break;
        }
    }
    info!("Speech source closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_line_source() {
        let mut source = LineSource::new(Cursor::new("Add 3 salmon\n\n  set steak to 2  \n"));
        assert_eq!(source.listen().unwrap(), Some("Add 3 salmon".to_string()));
        assert_eq!(source.listen().unwrap(), None);
        assert!(!source.is_closed());
        assert_eq!(source.listen().unwrap(), Some("set steak to 2".to_string()));
        assert_eq!(source.listen().unwrap(), None);
        assert!(source.is_closed());
    }

    #[test]
    fn test_pump_forwards_until_closed() {
        let (tx, mut rx) = mpsc::channel(8);
        pump(LineSource::new(Cursor::new("undo\n\nremove 1 steak\n")), tx);

        let mut heard = Vec::new();
        while let Ok(h) = rx.try_recv() {
            heard.push(h);
        }
        assert_eq!(
            heard,
            vec![
                Heard::Utterance("undo".into()),
                Heard::Unintelligible,
                Heard::Utterance("remove 1 steak".into()),
            ]
        );
    }
}
