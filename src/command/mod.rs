//! Command Interpreter
//!
//! Turns one utterance into a typed `Operation`. Stateless per call: the only
//! state is what was built at construction (guard, parsers, verb tagger).

pub mod canonical;
pub mod quantity;
pub mod tagger;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, info};

use crate::config::CommandConfig;
use crate::safety::{truncate_for_log, InputGuard};
use crate::types::{ItemQuantity, MutationKind};

pub use canonical::{Canonicalizer, SynonymTable};
pub use quantity::QuantityParser;
pub use tagger::{select_tagger, VerbMatch, VerbSets, VerbTagger};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Add(ItemQuantity),
    Remove(ItemQuantity),
    Set(ItemQuantity),
    Undo,
    Unrecognized,
    /// A verb matched but no valid item or quantity could be extracted.
    Incomplete { kind: MutationKind, reason: String },
}

impl Operation {
    fn mutation(kind: MutationKind, target: ItemQuantity) -> Self {
        match kind {
            MutationKind::Add => Operation::Add(target),
            MutationKind::Remove => Operation::Remove(target),
            MutationKind::Set => Operation::Set(target),
        }
    }

    pub fn kind(&self) -> Option<MutationKind> {
        match self {
            Operation::Add(_) => Some(MutationKind::Add),
            Operation::Remove(_) => Some(MutationKind::Remove),
            Operation::Set(_) => Some(MutationKind::Set),
            Operation::Incomplete { kind, .. } => Some(*kind),
            Operation::Undo | Operation::Unrecognized => None,
        }
    }
}

pub struct CommandInterpreter {
    guard: InputGuard,
    quantities: QuantityParser,
    canonicalizer: Canonicalizer,
    tagger: Box<dyn VerbTagger>,
    verbs: VerbSets,
    undo: Option<Regex>,
    repeat: Option<Regex>,
    max_item_name_length: usize,
}

impl CommandInterpreter {
    pub fn new(config: &CommandConfig, tagger: Box<dyn VerbTagger>) -> Result<Self> {
        Ok(Self {
            guard: InputGuard::new(config.max_command_length),
            quantities: QuantityParser::from_config(config),
            canonicalizer: Canonicalizer::new(SynonymTable::default(), config.similarity_threshold),
            tagger,
            verbs: VerbSets::from_config(&config.verbs),
            undo: phrase_pattern(&config.undo_words)?,
            repeat: phrase_pattern(&config.repeat_words)?,
            max_item_name_length: config.max_item_name_length,
        })
    }

    /// Build with whichever verb tagger the configuration selects.
    pub fn from_config(config: &CommandConfig) -> Result<Self> {
        Self::new(config, select_tagger(config)?)
    }

    pub fn guard(&self) -> &InputGuard {
        &self.guard
    }

    pub fn canonicalizer(&self) -> &Canonicalizer {
        &self.canonicalizer
    }

    pub fn tagger_name(&self) -> &'static str {
        self.tagger.name()
    }

    pub fn interpret(&self, raw: &str) -> Operation {
        let text = match self.guard.sanitize(raw) {
            Ok(text) => text,
            Err(rejection) => {
                debug!("Rejected command '{}': {}", truncate_for_log(raw, 80), rejection);
                return Operation::Unrecognized;
            }
        };

        if self.undo.as_ref().is_some_and(|re| re.is_match(&text)) {
            info!("Undo command detected: {}", text);
            return Operation::Undo;
        }
        if self.repeat.as_ref().is_some_and(|re| re.is_match(&text)) {
            info!("Repeat command detected but currently disabled");
            return Operation::Unrecognized;
        }

        let Some(VerbMatch { kind, verb }) = self.tagger.classify(&text) else {
            debug!("No command verb in '{}'", text);
            return Operation::Unrecognized;
        };

        let extracted = match kind {
            MutationKind::Set => self.extract_set(&text, &verb),
            _ => None,
        };
        let (item, quantity) = extracted.unwrap_or_else(|| self.scan(&text, &verb));

        let item = self.strip_verbs(&item);
        if item.is_empty() {
            info!("Could not extract item name from: {}", text);
            return Operation::Incomplete {
                kind,
                reason: "no item name was heard".to_string(),
            };
        }
        if item.chars().count() > self.max_item_name_length {
            return Operation::Incomplete {
                kind,
                reason: format!("item name is longer than {} characters", self.max_item_name_length),
            };
        }
        let quantity = match u32::try_from(quantity).ok().filter(|n| self.quantities.in_bounds(*n)) {
            Some(n) => n,
            None => {
                let (min, max) = self.quantities.bounds();
                info!(item = %item, quantity, "Quantity out of bounds");
                return Operation::Incomplete {
                    kind,
                    reason: format!("quantity must be between {} and {}", min, max),
                };
            }
        };

        let canonical = self.canonicalizer.canonicalize(&item);
        debug!(verb = %verb, item = %item, canonical = %canonical, quantity, "Interpreted {}", kind);
        Operation::mutation(kind, ItemQuantity::new(canonical, quantity))
    }

    /// `<verb> <item> to <qty>`, then `<verb> <item> <qty>`. The "to" anchor is
    /// matched literally, so it is never read as "two".
    fn extract_set(&self, text: &str, verb: &str) -> Option<(String, i64)> {
        let verb = regex::escape(verb);
        let anchored = Regex::new(&format!(r"\b{}\s+(.+?)\s+to\s+(\S+)", verb)).ok()?;
        let trailing = Regex::new(&format!(r"\b{}\s+(.+?)\s+(\S+)$", verb)).ok()?;

        for re in [&anchored, &trailing] {
            if let Some(caps) = re.captures(text) {
                if let Some(quantity) = self.quantities.parse_raw(&caps[2]) {
                    return Some((caps[1].trim().to_string(), quantity));
                }
            }
        }
        None
    }

    /// Drop the verb word, take the first word that reads as a quantity and
    /// keep the rest as the item. No quantity word means a count of one.
    fn scan(&self, text: &str, verb: &str) -> (String, i64) {
        let mut words: Vec<&str> = text.split_whitespace().collect();
        if let Some(pos) = words.iter().position(|w| *w == verb) {
            words.remove(pos);
        }

        let mut quantity = None;
        let mut item = Vec::with_capacity(words.len());
        for word in words {
            if quantity.is_none() {
                if let Some(n) = self.quantities.parse_raw(word) {
                    quantity = Some(n);
                    continue;
                }
            }
            item.push(word);
        }
        (item.join(" "), quantity.unwrap_or(1))
    }

    fn strip_verbs(&self, item: &str) -> String {
        item.split_whitespace()
            .filter(|w| !self.verbs.is_verb(w))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Word-boundary alternation over phrases; multi-word phrases tolerate any
/// run of whitespace between words.
fn phrase_pattern(phrases: &[String]) -> Result<Option<Regex>> {
    let alternation: Vec<String> = phrases
        .iter()
        .map(|p| p.split_whitespace().map(regex::escape).collect::<Vec<_>>().join(r"\s+"))
        .filter(|p| !p.is_empty())
        .collect();
    if alternation.is_empty() {
        return Ok(None);
    }
    Ok(Some(Regex::new(&format!(r"\b(?:{})\b", alternation.join("|")))?))
}
