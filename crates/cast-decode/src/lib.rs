//! cast-decode: protocol recognition and transaction annotation.
//!
//! A static table of well-known contracts and selectors backs a pure
//! classification pass; a persistent cache and optional external resolvers
//! (Sourcify, Etherscan-style APIs, a public signature directory) enrich it.

pub mod decoder;
pub mod registry;
pub mod resolvers;
pub mod selectors;

pub use decoder::{classify, format_units, Decoder};
pub use registry::{static_lookup, ContractRegistry, KnownContract};
