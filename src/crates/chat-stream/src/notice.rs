//! User-visible fallback text appended to the transcript when a turn fails.

use serde::{Deserialize, Serialize};

use crate::error::AssemblerError;

const DEFAULT_RATE_LIMITED: &str =
    "I'm receiving too many requests right now. Please wait a moment and try again.";
const DEFAULT_TRANSIENT: &str =
    "I'm having trouble reaching the assistant service. Please try again in a few seconds.";
const DEFAULT_GENERIC: &str = "Sorry, something went wrong while preparing an answer. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct FailureNotices {
    pub rate_limited: String,
    pub transient: String,
    pub generic: String,
}

impl Default for FailureNotices {
    fn default() -> Self {
        Self {
            rate_limited: DEFAULT_RATE_LIMITED.to_string(),
            transient: DEFAULT_TRANSIENT.to_string(),
            generic: DEFAULT_GENERIC.to_string(),
        }
    }
}

impl FailureNotices {
    /// Notice for a terminal error. Cancellation is silent.
    pub fn for_error(&self, error: &AssemblerError) -> Option<&str> {
        match error {
            AssemblerError::Cancelled => None,
            AssemblerError::RateLimited { .. } => Some(&self.rate_limited),
            AssemblerError::TransientNetwork(_) => Some(&self.transient),
            _ => Some(&self.generic),
        }
    }
}
