//! Tunables for the submission driver.

use serde::{Deserialize, Serialize};

/// How many times a recoverable kick failure is retried through a resubmit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_resubmits: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_resubmits: 2 }
    }
}

impl RetryPolicy {
    /// Never retries; the first recoverable failure abandons the slot.
    pub const NONE: Self = Self { max_resubmits: 0 };
}

/// Number of Incomplete answers tolerated per submission before it is
/// declared hung.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    pub max_queries: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self { max_queries: 64 }
    }
}
