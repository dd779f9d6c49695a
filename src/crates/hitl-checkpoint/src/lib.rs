//! # hitl-checkpoint - Durable State for Paused Approval Runs
//!
//! **Storage abstractions and implementations** for runs that an analysis
//! engine has paused to wait for a human decision. The crate owns the record
//! of each paused run and the registry of the emailed decision tokens that
//! authorize acting on it.
//!
//! ## Overview
//!
//! A paused run moves through at most two human decisions:
//!
//! - **Stage 1** - the primary reviewer approves or rejects
//! - **EDD** - when the rejection comment asks for enhanced due diligence, a
//!   second reviewer makes the final call
//!
//! This crate stores those decisions write-once, refuses stale writes through
//! per-record versions, and survives crashes through atomic file replacement.
//! It contains **no** HTTP, email or scheduling logic.
//!
//! ## Core Concepts
//!
//! ### 1. Checkpoint
//!
//! A [`Checkpoint`] holds run status, the stage-1 decision fields, the
//! [`EddStage`] sub-document, notification and reminder bookkeeping, and the
//! opaque collaborator payload returned to the UI.
//!
//! ### 2. CheckpointStore Trait
//!
//! The [`CheckpointStore`] trait defines the persistence seam:
//!
//! - **`load()`** / **`get()`** - Read a record
//! - **`save()`** - Compare-and-swap write of a full record
//! - **`create()`** - Insert a new record
//! - **`patch()`** - Partial update with automatic retry on conflict
//!
//! ### 3. TokenRegistry Trait
//!
//! The [`TokenRegistry`] maps opaque tokens to `(run_id, stage)` grants and
//! reads the legacy bare-run-id shape written by older deployments.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hitl_checkpoint::{
//!     Checkpoint, CheckpointStore, InMemoryCheckpointStore, InMemoryTokenRegistry, Stage,
//!     TokenRegistry,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = InMemoryCheckpointStore::new();
//!     let tokens = InMemoryTokenRegistry::new();
//!
//!     let run_id = uuid::Uuid::new_v4();
//!     let token = tokens.mint(run_id, Stage::Stage1).await?;
//!     store
//!         .create(Checkpoint::paused(run_id, chrono::Utc::now()).with_approval_token(&token))
//!         .await?;
//!
//!     let grant = tokens.resolve(&token).await?.expect("token was just minted");
//!     let checkpoint = store.get(&grant.run_id).await?;
//!     println!("run {} is {}", checkpoint.run_id, checkpoint.status);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          approval-server (HTTP + decision logic)        │
//! │  • finalizes decisions      • schedules reminders       │
//! └───────────────┬──────────────────────────┬──────────────┘
//!                 │ load / save / patch       │ mint / resolve
//!                 ▼                           ▼
//! ┌───────────────────────────┐   ┌───────────────────────────┐
//! │  CheckpointStore trait    │   │  TokenRegistry trait      │
//! └──────┬─────────────┬──────┘   └──────┬─────────────┬──────┘
//!        ▼             ▼                 ▼             ▼
//!  ┌───────────┐ ┌────────────┐   ┌───────────┐ ┌────────────┐
//!  │ In-Memory │ │ File       │   │ In-Memory │ │ File       │
//!  │ (tests)   │ │ <run>.json │   │ (tests)   │ │ tokens.json│
//!  └───────────┘ └────────────┘   └───────────┘ └────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`checkpoint`] - [`Checkpoint`], [`Decision`], [`DecisionRecord`], [`EddStage`]
//! - [`traits`] - [`CheckpointStore`] trait and [`CheckpointPatch`]
//! - [`memory`] - [`InMemoryCheckpointStore`]
//! - [`file`] - [`FileCheckpointStore`]
//! - [`tokens`] - [`TokenRegistry`], [`InMemoryTokenRegistry`], [`FileTokenRegistry`]
//! - [`fsync`] - atomic write-then-rename helpers
//! - [`error`] - [`CheckpointError`] types

pub mod checkpoint;
pub mod error;
pub mod file;
pub mod fsync;
pub mod memory;
pub mod tokens;
pub mod traits;

// Re-export main types
pub use checkpoint::{
    Checkpoint, Decision, DecisionRecord, EddStage, FinalDecision, RunId, RunStatus, Stage,
};
pub use error::{CheckpointError, Result};
pub use file::FileCheckpointStore;
pub use memory::InMemoryCheckpointStore;
pub use tokens::{
    generate_token, token_prefix, FileTokenRegistry, InMemoryTokenRegistry, RegistryEntry,
    TokenGrant, TokenRegistry,
};
pub use traits::{CheckpointPatch, CheckpointStore, MAX_CAS_ATTEMPTS};
