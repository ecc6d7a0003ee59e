//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod predict;
pub mod users;

// Re-export all handlers for use in router
pub use predict::*;
pub use users::*;
