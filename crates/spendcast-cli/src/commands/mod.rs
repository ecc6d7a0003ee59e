//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `predict` - Personalized and base-model predictions
//! - `serve` - Web server command
//! - `setup` - Shared utilities (config loading, service setup)
//! - `status` - User model status and listing
//! - `training` - Retraining and base model fitting
//! - `transactions` - Transaction ingestion

pub mod predict;
pub mod serve;
pub mod setup;
pub mod status;
pub mod training;
pub mod transactions;

// Re-export command functions for main.rs
pub use predict::*;
pub use serve::*;
pub use setup::*;
pub use status::*;
pub use training::*;
pub use transactions::*;
