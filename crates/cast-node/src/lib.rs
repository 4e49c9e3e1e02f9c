//! cast-node: execution-node session and RPC plumbing.
//!
//! One multiplexed WebSocket session (pending-transaction and new-head
//! subscriptions plus on-demand fetches) behind a reconnecting supervisor,
//! and the shared rate limiter bounding concurrent in-flight RPC calls.

pub mod client;
pub mod error;
pub mod limiter;

pub use client::{FetchedBlock, NodeClient, NodeEvent, SessionState, TokenMetadata};
pub use error::NodeError;
pub use limiter::{RateLimiter, DEFAULT_MAX_IN_FLIGHT};
