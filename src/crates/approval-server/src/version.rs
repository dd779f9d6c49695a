// Version information module for approval-server

/// Version string for the approval-server crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
