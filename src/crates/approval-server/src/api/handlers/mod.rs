//! API request handlers
//!
//! Provides handler functions for all API endpoints organized by resource.

pub mod approvals;
pub mod edd;
pub mod health;

pub use approvals::{create_checkpoint, poll, remind};
pub use health::health;
