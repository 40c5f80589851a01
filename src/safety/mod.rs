//! Safety Module
//!
//! Guards applied to raw utterances before any interpretation: a length cap,
//! stripping of shell-metacharacter-like symbols, and log-safe truncation.

mod guard;
mod truncate;

pub use guard::{InputGuard, Rejection};
pub use truncate::truncate_for_log;
