//! Human-in-the-loop approval server
//!
//! HTTP service that holds paused document-review runs until a human decides
//! them through an emailed link, then records the decision exactly once.
//!
//! ## Flow
//!
//! ```text
//!  analysis engine            reviewer (email)            review UI
//!        │                          │                         │
//!        │ POST /approvals/checkpoints                        │
//!        ▼                          │                         │
//!   ┌─────────┐  approval request   │                         │
//!   │  pause  │ ───────────────────▶│                         │
//!   └─────────┘                     │      GET /approvals/poll│
//!        │                          │◀── reminder (once) ─────┤
//!        │     GET|POST /approvals/submit                     │
//!        │◀─────────────────────────┤                         │
//!        │  reject + "Route: EDD"   │                         │
//!        │──── EDD request ────────▶│ (EDD reviewer)          │
//!        │     GET|POST /edd/submit │                         │
//!        │◀─────────────────────────┘                         │
//! ```
//!
//! ## Modules
//!
//! - [`services`] - pause, decision finalization, reminders, status projection
//! - [`api`] - axum router, handlers, error mapping
//! - [`config`] - TOML + environment configuration
//!
//! State lives in [`hitl_checkpoint`] stores; every state change is persisted
//! before any email goes out.

pub mod api;
pub mod config;
pub mod services;
pub mod version;

pub use api::{create_router, AppState};
pub use config::ServerConfig;
pub use services::{ApprovalContext, ApprovalService, ApprovalSettings};
