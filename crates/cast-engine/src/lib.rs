//! cast-engine: the forecasting pipeline.
//!
//! Mempool state feeds a fee-priority packer and sandwich detector on a
//! forecaster cadence; the reconciler scores each forecast once its block
//! arrives. The observer service wires node events through all of it.

pub mod accuracy;
pub mod basefee;
pub mod forecaster;
pub mod mempool;
pub mod packer;
pub mod predictions;
pub mod reconciler;
pub mod sandwich;
pub mod service;

pub use basefee::BaseFeeOracle;
pub use forecaster::Forecaster;
pub use mempool::MempoolState;
pub use packer::{effective_priority_fee, pack, PackedBlock};
pub use predictions::{HeadTracker, PredictionBook, RegisteredPrediction};
pub use reconciler::Reconciler;
pub use service::Observer;
