//! Signing orchestration over disposable crypto engines.
//!
//! The crate drives credential ceremonies, per-account encrypted key
//! storage, and transaction/message signing through a pool of single-use
//! engine tasks. Privileged operations run behind a confirmation flow
//! with intent-digest parity between the engine and the consent surface,
//! so the user approves exactly what gets signed.

pub mod ceremony;
pub mod config;
pub mod confirm;
pub mod crypto;
pub mod digest;
pub mod encoders;
pub mod engine;
pub mod error;
pub mod manager;
pub mod pool;
pub mod rpc;
pub mod store;
pub mod types;

pub use error::{OrchestratorError, Result};
pub use manager::{SignerManager, SignerManagerOptions};
