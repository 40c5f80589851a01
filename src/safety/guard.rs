//! Input Guard
//!
//! Text produced here is only ever matched against regexes and bound as SQL
//! parameters, but it is still scrubbed of metacharacters so no downstream
//! adapter can interpolate it unescaped.

use regex::Regex;
use thiserror::Error;

/// Why an utterance was refused before interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("empty command")]
    Empty,
    #[error("command too long ({len} characters, max {max})")]
    TooLong { len: usize, max: usize },
}

pub struct InputGuard {
    max_len: usize,
    metacharacters: Regex,
    punctuation: Regex,
}

impl InputGuard {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            metacharacters: Regex::new(r"[;|&$`<>\\]").unwrap(),
            punctuation: Regex::new(r"[.,!?]").unwrap(),
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Length check only, counted in characters.
    pub fn check(&self, raw: &str) -> Result<(), Rejection> {
        if raw.trim().is_empty() {
            return Err(Rejection::Empty);
        }
        let len = raw.chars().count();
        if len > self.max_len {
            return Err(Rejection::TooLong { len, max: self.max_len });
        }
        Ok(())
    }

    /// Lowercase, strip metacharacters, treat sentence punctuation as
    /// whitespace and collapse runs of whitespace.
    pub fn sanitize(&self, raw: &str) -> Result<String, Rejection> {
        self.check(raw)?;
        let lowered = raw.trim().to_lowercase();
        let stripped = self.metacharacters.replace_all(&lowered, "");
        let spaced = self.punctuation.replace_all(&stripped, " ");
        let clean = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
        if clean.is_empty() {
            return Err(Rejection::Empty);
        }
        Ok(clean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_and_oversized() {
        let guard = InputGuard::new(500);
        assert_eq!(guard.sanitize("   "), Err(Rejection::Empty));
        assert_eq!(guard.sanitize(";|&"), Err(Rejection::Empty));

        let long = "a".repeat(501);
        assert_eq!(guard.sanitize(&long), Err(Rejection::TooLong { len: 501, max: 500 }));
        assert!(guard.sanitize(&"a".repeat(500)).is_ok());
    }

    #[test]
    fn test_strips_metacharacters() {
        let guard = InputGuard::new(500);
        assert_eq!(guard.sanitize("Add 3 salmon; rm -rf /").unwrap(), "add 3 salmon rm -rf /");
        assert_eq!(guard.sanitize("add `whoami` $HOME").unwrap(), "add whoami home");
    }

    #[test]
    fn test_punctuation_and_whitespace() {
        let guard = InputGuard::new(500);
        assert_eq!(guard.sanitize("  Add   three Salmon.  ").unwrap(), "add three salmon");
        assert_eq!(guard.sanitize("Set ice-cream to 5!").unwrap(), "set ice-cream to 5");
    }
}
