//! Verb Tagging
//!
//! Decides which mutation an utterance asks for. Two implementations sit
//! behind `VerbTagger`, chosen once at construction by `select_tagger`:
//! `RegexTagger` (word-boundary alternation, add > remove > set) and
//! `LemmaTagger`, which splits words with an optional tokenizer model and
//! matches de-inflected forms, so "took" and "adding" are recognized too.

use anyhow::{anyhow, Result};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use tokenizers::pre_tokenizers::PreTokenizerWrapper;
use tokenizers::{OffsetReferential, OffsetType, PreTokenizedString, PreTokenizer, Tokenizer};
use tracing::{info, warn};

use crate::config::{CommandConfig, VerbConfig};
use crate::types::MutationKind;

/// A classified verb and the word that carried it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerbMatch {
    pub kind: MutationKind,
    pub verb: String,
}

pub trait VerbTagger: Send + Sync {
    fn name(&self) -> &'static str;

    /// Classify already-sanitized text; `None` when no command verb is present.
    fn classify(&self, text: &str) -> Option<VerbMatch>;
}

/// Configured surface forms per kind, in classification priority order.
#[derive(Debug, Clone)]
pub struct VerbSets {
    sets: Vec<(MutationKind, Vec<String>)>,
}

impl VerbSets {
    pub fn from_config(config: &VerbConfig) -> Self {
        let lower = |v: &Vec<String>| -> Vec<String> {
            v.iter().map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()).collect()
        };
        Self {
            sets: vec![
                (MutationKind::Add, lower(&config.add)),
                (MutationKind::Remove, lower(&config.remove)),
                (MutationKind::Set, lower(&config.set)),
            ],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (MutationKind, &[String])> {
        self.sets.iter().map(|(kind, verbs)| (*kind, verbs.as_slice()))
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.sets.iter().flat_map(|(_, verbs)| verbs.iter().map(String::as_str))
    }

    pub fn is_verb(&self, word: &str) -> bool {
        self.words().any(|v| v == word)
    }
}

pub struct RegexTagger {
    patterns: Vec<(MutationKind, Regex)>,
}

impl RegexTagger {
    pub fn new(verbs: &VerbSets) -> Result<Self> {
        let mut patterns = Vec::new();
        for (kind, words) in verbs.iter() {
            if words.is_empty() {
                continue;
            }
            let alternation = words.iter().map(|w| regex::escape(w)).collect::<Vec<_>>().join("|");
            patterns.push((kind, Regex::new(&format!(r"\b(?:{})\b", alternation))?));
        }
        Ok(Self { patterns })
    }
}

impl VerbTagger for RegexTagger {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn classify(&self, text: &str) -> Option<VerbMatch> {
        self.patterns.iter().find_map(|(kind, re)| {
            re.find(text).map(|m| VerbMatch {
                kind: *kind,
                verb: m.as_str().to_string(),
            })
        })
    }
}

const IRREGULAR: &[(&str, &str)] = &[
    ("ate", "eat"), ("eaten", "eat"), ("bought", "buy"), ("got", "get"), ("gotten", "get"),
    ("took", "take"), ("taken", "take"), ("had", "have"), ("has", "have"), ("made", "make"),
    ("threw", "throw"), ("thrown", "throw"), ("put", "put"), ("set", "set"),
];

fn irregular_base(word: &str) -> Option<&'static str> {
    IRREGULAR.iter().find(|(form, _)| *form == word).map(|(_, base)| *base)
}

fn is_consonant(c: char) -> bool {
    c.is_ascii_alphabetic() && !"aeiou".contains(c)
}

fn push_stem(stem: &str, out: &mut Vec<String>) {
    if stem.len() < 2 {
        return;
    }
    out.push(stem.to_string());
    out.push(format!("{}e", stem));
    let mut chars = stem.chars().rev();
    if let (Some(a), Some(b)) = (chars.next(), chars.next()) {
        if a == b && is_consonant(a) {
            out.push(stem[..stem.len() - 1].to_string());
        }
    }
}

/// Possible base forms of `word`, the word itself first.
pub fn lemma_candidates(word: &str) -> Vec<String> {
    let mut out = vec![word.to_string()];
    if let Some(base) = irregular_base(word) {
        out.push(base.to_string());
    }

    if let Some(stem) = word.strip_suffix("ies").or_else(|| word.strip_suffix("ied")) {
        out.push(format!("{}y", stem));
    } else if let Some(stem) = word.strip_suffix("ing") {
        push_stem(stem, &mut out);
    } else if let Some(stem) = word.strip_suffix("ed") {
        push_stem(stem, &mut out);
    } else if let Some(stem) = word.strip_suffix("es") {
        out.push(stem.to_string());
        out.push(format!("{}e", stem));
    } else if let Some(stem) = word.strip_suffix('s') {
        if !stem.ends_with('s') {
            out.push(stem.to_string());
        }
    }

    out.dedup();
    out
}

pub struct LemmaTagger {
    index: HashMap<String, MutationKind>,
    pre_tokenizer: Option<PreTokenizerWrapper>,
}

impl LemmaTagger {
    /// Whitespace word splitting with rule-based lemmas.
    pub fn new(verbs: &VerbSets) -> Self {
        let mut index = HashMap::new();
        for (kind, words) in verbs.iter() {
            for word in words.iter().filter(|w| !w.contains(' ')) {
                index.entry(word.clone()).or_insert(kind);
                if let Some(base) = irregular_base(word) {
                    index.entry(base.to_string()).or_insert(kind);
                }
            }
        }
        Self {
            index,
            pre_tokenizer: None,
        }
    }

    /// Use the pre-tokenizer of a pretrained `tokenizer.json` for word splitting.
    pub fn from_tokenizer_file(path: &Path, verbs: &VerbSets) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| anyhow!("failed to load tokenizer {}: {}", path.display(), e))?;
        let mut tagger = Self::new(verbs);
        tagger.pre_tokenizer = tokenizer.get_pre_tokenizer().cloned();
        if tagger.pre_tokenizer.is_none() {
            warn!("Tokenizer {} has no pre-tokenizer; splitting on whitespace", path.display());
        }
        Ok(tagger)
    }

    fn words(&self, text: &str) -> Vec<String> {
        let raw: Vec<String> = match &self.pre_tokenizer {
            Some(pt) => {
                let mut pretok = PreTokenizedString::from(text);
                match pt.pre_tokenize(&mut pretok) {
                    Ok(()) => pretok
                        .get_splits(OffsetReferential::Original, OffsetType::Char)
                        .into_iter()
                        .map(|(piece, _, _)| piece.to_string())
                        .collect(),
                    Err(e) => {
                        warn!("Pre-tokenization failed, splitting on whitespace: {}", e);
                        text.split_whitespace().map(str::to_string).collect()
                    }
                }
            }
            None => text.split_whitespace().map(str::to_string).collect(),
        };

        raw.into_iter()
            .map(|piece| {
                // Byte-level and metaspace models mark word starts with these.
                piece
                    .replace(['Ġ', '▁'], "")
                    .trim_matches(|c: char| !c.is_alphanumeric() && c != '-')
                    .to_lowercase()
            })
            .filter(|w| !w.is_empty())
            .collect()
    }
}

impl VerbTagger for LemmaTagger {
    fn name(&self) -> &'static str {
        "lemma"
    }

    fn classify(&self, text: &str) -> Option<VerbMatch> {
        self.words(text).into_iter().find_map(|word| {
            lemma_candidates(&word)
                .iter()
                .find_map(|lemma| self.index.get(lemma).copied())
                .map(|kind| VerbMatch { kind, verb: word })
        })
    }
}

/// Pick the tagger once, at construction. Any failure to bring up the lemma
/// tagger degrades to the regex tagger.
pub fn select_tagger(config: &CommandConfig) -> Result<Box<dyn VerbTagger>> {
    let verbs = VerbSets::from_config(&config.verbs);
    if config.nlp.enabled {
        match &config.nlp.tokenizer_path {
            Some(path) => match LemmaTagger::from_tokenizer_file(path, &verbs) {
                Ok(tagger) => {
                    info!("Verb tagging: lemma tagger with tokenizer {}", path.display());
                    return Ok(Box::new(tagger));
                }
                Err(e) => warn!("Tokenizer unavailable, falling back to rule-based parsing: {}", e),
            },
            None => {
                info!("Verb tagging: lemma tagger with whitespace splitting");
                return Ok(Box::new(LemmaTagger::new(&verbs)));
            }
        }
    }
    info!("Verb tagging: regex rules");
    Ok(Box::new(RegexTagger::new(&verbs)?))
}
