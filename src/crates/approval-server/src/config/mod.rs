//! Configuration module for approval-server
//!
//! TOML file, then environment overrides, then command-line flags (applied
//! by the binary).

pub mod server;

pub use server::{
    ApprovalConfig, ListenConfig, NotifierConfig, NotifierMode, ServerConfig, ServerConfigError,
    StorageBackend, StorageConfig,
};
