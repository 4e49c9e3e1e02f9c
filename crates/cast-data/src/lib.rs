//! cast-data crate

pub mod store;
pub mod types;

pub use store::Store;
pub use types::{
    BlockComparison, BlockHead, BlockPrediction, ContractCacheEntry, ContractKind, PendingTx,
    PredictionMetadata, TxAnnotation, TxCategory, TxKind, TxStatus,
};
