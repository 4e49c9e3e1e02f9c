//! Transport error taxonomy.
//!
//! Callers branch on the variant: `RateLimited` means pause and retry on the
//! next tick, `Disconnected` means the session is mid-reconnect and derived
//! state is about to be reset, everything else is logged and skipped.

use std::time::Duration;

use thiserror::Error;

/// Classified failure of a node RPC call.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The node rejected the call with a rate-limit response.
    #[error("node rate-limited the request")]
    RateLimited,
    /// No live session; a reconnect is in progress.
    #[error("node session is not live")]
    Disconnected,
    /// The call did not complete within the per-RPC budget.
    #[error("rpc call timed out after {0:?}")]
    Timeout(Duration),
    /// Any other transport or RPC failure.
    #[error("rpc failure: {0}")]
    Rpc(String),
}

impl NodeError {
    /// Classifies a transport-layer error, detecting rate limiting by
    /// status 429 or known error-message substrings.
    pub fn classify(err: impl std::fmt::Display) -> Self {
        let msg = err.to_string();
        let lower = msg.to_lowercase();
        if lower.contains("429")
            || lower.contains("rate limit")
            || lower.contains("too many requests")
        {
            return NodeError::RateLimited;
        }
        NodeError::Rpc(msg)
    }

    /// True for failures that warrant tearing the session down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, NodeError::Disconnected)
    }
}
