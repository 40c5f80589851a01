//! Quantity Parser
//!
//! Turns one token into a count: a numeral, a configured alias ("dozen"), or a
//! spelled-out number ("twenty-five"). Aliases are consulted before generic
//! number words so domain-specific meanings win.

use std::collections::HashMap;
use tracing::debug;

use crate::config::CommandConfig;

#[derive(Debug, Clone)]
pub struct QuantityParser {
    aliases: HashMap<String, u32>,
    min: u32,
    max: u32,
}

impl QuantityParser {
    pub fn new(aliases: HashMap<String, u32>, min: u32, max: u32) -> Self {
        let aliases = aliases.into_iter().map(|(k, v)| (k.to_lowercase(), v)).collect();
        Self { aliases, min, max }
    }

    pub fn from_config(config: &CommandConfig) -> Self {
        let aliases = config
            .special_quantities
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        Self::new(aliases, config.min_quantity, config.max_quantity)
    }

    pub fn bounds(&self) -> (u32, u32) {
        (self.min, self.max)
    }

    pub fn in_bounds(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }

    /// `None` means "not a quantity", including parsed values out of bounds.
    pub fn parse(&self, token: &str) -> Option<u32> {
        self.parse_raw(token).and_then(|n| self.bounded(n, token))
    }

    /// The value a token spells, ignoring bounds.
    pub fn parse_raw(&self, token: &str) -> Option<i64> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        if let Ok(n) = token.parse::<i64>() {
            return Some(n);
        }
        let lower = token.to_lowercase();
        if let Some(&n) = self.aliases.get(&lower) {
            return Some(i64::from(n));
        }
        parse_number_words(&lower)
    }

    fn bounded(&self, n: i64, token: &str) -> Option<u32> {
        if n < i64::from(self.min) || n > i64::from(self.max) {
            debug!("Quantity '{}' outside [{}, {}]", token, self.min, self.max);
            return None;
        }
        u32::try_from(n).ok()
    }
}

const LARGEST_SPOKEN: i64 = u32::MAX as i64;

fn unit_value(word: &str) -> Option<i64> {
    let n = match word {
        "zero" => 0, "one" => 1, "two" => 2, "three" => 3, "four" => 4,
        "five" => 5, "six" => 6, "seven" => 7, "eight" => 8, "nine" => 9,
        "ten" => 10, "eleven" => 11, "twelve" => 12, "thirteen" => 13,
        "fourteen" => 14, "fifteen" => 15, "sixteen" => 16, "seventeen" => 17,
        "eighteen" => 18, "nineteen" => 19,
        _ => return None,
    };
    Some(n)
}

fn tens_value(word: &str) -> Option<i64> {
    let n = match word {
        "twenty" => 20, "thirty" => 30, "forty" => 40, "fifty" => 50,
        "sixty" => 60, "seventy" => 70, "eighty" => 80, "ninety" => 90,
        _ => return None,
    };
    Some(n)
}

/// Spelled-out English cardinal to integer, e.g. "two hundred and five" or
/// "thirty-one". Returns `None` for anything that is not entirely number words,
/// and for values above `u32::MAX` ("hundred-hundred-hundred-...").
pub fn parse_number_words(text: &str) -> Option<i64> {
    let words: Vec<&str> = text
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|w| !w.is_empty() && *w != "and")
        .collect();
    if words.is_empty() {
        return None;
    }

    let mut total: i64 = 0;
    let mut current: i64 = 0;
    // Reject "one two": a unit may follow only a tens word or a scale.
    let mut last_was_unit = false;
    let mut last_was_tens = false;

    for word in words {
        if let Some(n) = unit_value(word) {
            if last_was_unit || (last_was_tens && n >= 10) {
                return None;
            }
            current = current.checked_add(n)?;
            last_was_unit = true;
            last_was_tens = false;
        } else if let Some(n) = tens_value(word) {
            if last_was_unit || last_was_tens {
                return None;
            }
            current = current.checked_add(n)?;
            last_was_tens = true;
            last_was_unit = false;
        } else if word == "hundred" {
            current = current.max(1).checked_mul(100)?;
            last_was_unit = false;
            last_was_tens = false;
        } else if word == "thousand" {
            total = total.checked_add(current.max(1).checked_mul(1_000)?)?;
            current = 0;
            last_was_unit = false;
            last_was_tens = false;
        } else {
            return None;
        }
        if total.checked_add(current)? > LARGEST_SPOKEN {
            return None;
        }
    }

    Some(total + current)
}
