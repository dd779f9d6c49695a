//! Decision token registry
//!
//! Emailed approval links carry an opaque token. The registry maps each token
//! to the run and stage it authorizes:
//!
//! ```text
//!   token ──▶ { run_id, stage: stage1 | edd, created_at }
//! ```
//!
//! # Token Format
//!
//! Tokens are 32 bytes from the operating system RNG, base64url encoded
//! without padding (43 characters, 256 bits). They are never recycled.
//!
//! # Legacy Entries
//!
//! Registries written by earlier deployments stored a bare run id string per
//! token. [`RegistryEntry`] reads both shapes; a legacy entry resolves with
//! the implied stage `stage1`. Every write uses the typed shape, and
//! [`TokenRegistry::migrate_legacy`] rewrites all remaining legacy entries.
//!
//! ```json
//! {
//!   "q8N…": { "run_id": "1f0c…", "stage": "edd", "created_at": "2026-01-05T10:00:00Z" },
//!   "Zt3…": "7a41…"
//! }
//! ```

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::{
    checkpoint::{RunId, Stage},
    error::{CheckpointError, Result},
    fsync::atomic_write,
};

/// Number of random bytes in a token
pub const TOKEN_BYTES: usize = 32;

/// Generate a fresh unguessable token
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// What a token authorizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenGrant {
    pub run_id: RunId,
    pub stage: Stage,
}

fn default_stage() -> Stage {
    Stage::Stage1
}

/// Stored registry entry, in either the typed or the legacy shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegistryEntry {
    Typed {
        run_id: RunId,
        #[serde(default = "default_stage")]
        stage: Stage,
        #[serde(default)]
        created_at: Option<DateTime<Utc>>,
    },
    /// Bare run id written by older deployments
    Legacy(String),
}

impl RegistryEntry {
    /// Typed entry for a freshly minted token
    pub fn new(run_id: RunId, stage: Stage, created_at: DateTime<Utc>) -> Self {
        RegistryEntry::Typed {
            run_id,
            stage,
            created_at: Some(created_at),
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, RegistryEntry::Legacy(_))
    }

    /// The grant this entry encodes
    ///
    /// Legacy entries imply `stage1`. A legacy entry whose run id is not a
    /// UUID is invalid.
    pub fn grant(&self) -> Result<TokenGrant> {
        match self {
            RegistryEntry::Typed { run_id, stage, .. } => Ok(TokenGrant {
                run_id: *run_id,
                stage: *stage,
            }),
            RegistryEntry::Legacy(raw) => {
                let run_id = RunId::parse_str(raw.trim()).map_err(|e| {
                    CheckpointError::Invalid(format!("legacy token entry {:?}: {}", raw, e))
                })?;
                Ok(TokenGrant {
                    run_id,
                    stage: Stage::Stage1,
                })
            }
        }
    }

    /// Rewrite in the typed shape
    pub fn migrate(&self) -> Result<RegistryEntry> {
        match self {
            RegistryEntry::Typed { .. } => Ok(self.clone()),
            RegistryEntry::Legacy(_) => {
                let grant = self.grant()?;
                Ok(RegistryEntry::Typed {
                    run_id: grant.run_id,
                    stage: grant.stage,
                    created_at: None,
                })
            }
        }
    }
}

/// Token registry backend
#[async_trait]
pub trait TokenRegistry: Send + Sync {
    /// Mint and store a new token for `(run_id, stage)`
    async fn mint(&self, run_id: RunId, stage: Stage) -> Result<String>;

    /// Resolve a token
    ///
    /// Unknown tokens and unreadable legacy entries resolve to `None`.
    async fn resolve(&self, token: &str) -> Result<Option<TokenGrant>>;

    /// Remove a token; returns whether it existed
    async fn evict(&self, token: &str) -> Result<bool>;

    /// Rewrite legacy entries in the typed shape; returns how many changed
    async fn migrate_legacy(&self) -> Result<usize>;
}

fn resolve_entry(token: &str, entry: Option<&RegistryEntry>) -> Option<TokenGrant> {
    let entry = entry?;
    match entry.grant() {
        Ok(grant) => Some(grant),
        Err(e) => {
            tracing::warn!(token_prefix = %token_prefix(token), error = %e, "Unreadable token entry");
            None
        }
    }
}

fn migrate_map(entries: &mut HashMap<String, RegistryEntry>) -> usize {
    let mut migrated = 0;
    for entry in entries.values_mut() {
        if entry.is_legacy() {
            if let Ok(typed) = entry.migrate() {
                *entry = typed;
                migrated += 1;
            }
        }
    }
    migrated
}

/// First characters of a token, safe to log
pub fn token_prefix(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(6)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    &token[..end]
}

/// In-memory token registry
#[derive(Debug, Clone, Default)]
pub struct InMemoryTokenRegistry {
    entries: Arc<RwLock<HashMap<String, RegistryEntry>>>,
}

impl InMemoryTokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw entry (used to seed legacy data)
    pub async fn insert(&self, token: impl Into<String>, entry: RegistryEntry) {
        self.entries.write().await.insert(token.into(), entry);
    }

    /// Raw entry for a token
    pub async fn entry(&self, token: &str) -> Option<RegistryEntry> {
        self.entries.read().await.get(token).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl TokenRegistry for InMemoryTokenRegistry {
    async fn mint(&self, run_id: RunId, stage: Stage) -> Result<String> {
        let mut entries = self.entries.write().await;
        let token = loop {
            let candidate = generate_token();
            if !entries.contains_key(&candidate) {
                break candidate;
            }
        };
        entries.insert(token.clone(), RegistryEntry::new(run_id, stage, Utc::now()));
        Ok(token)
    }

    async fn resolve(&self, token: &str) -> Result<Option<TokenGrant>> {
        let entries = self.entries.read().await;
        Ok(resolve_entry(token, entries.get(token)))
    }

    async fn evict(&self, token: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(token).is_some())
    }

    async fn migrate_legacy(&self) -> Result<usize> {
        Ok(migrate_map(&mut *self.entries.write().await))
    }
}

/// Token registry persisted as a single JSON document
///
/// The document is loaded once at open and rewritten atomically on every
/// change. The process that opened it owns the file.
#[derive(Debug, Clone)]
pub struct FileTokenRegistry {
    path: PathBuf,
    entries: Arc<Mutex<HashMap<String, RegistryEntry>>>,
}

impl FileTokenRegistry {
    /// Open the registry at `path`, creating an empty one if absent
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => HashMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(CheckpointError::Io(e)),
        };
        Ok(Self {
            path,
            entries: Arc::new(Mutex::new(entries)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &HashMap<String, RegistryEntry>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(entries)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || atomic_write(&path, &bytes))
            .await
            .map_err(|e| CheckpointError::Storage(format!("write task failed: {}", e)))??;
        Ok(())
    }
}

#[async_trait]
impl TokenRegistry for FileTokenRegistry {
    async fn mint(&self, run_id: RunId, stage: Stage) -> Result<String> {
        let mut entries = self.entries.lock().await;
        let token = loop {
            let candidate = generate_token();
            if !entries.contains_key(&candidate) {
                break candidate;
            }
        };

        let mut next = entries.clone();
        next.insert(token.clone(), RegistryEntry::new(run_id, stage, Utc::now()));
        self.persist(&next).await?;
        *entries = next;

        tracing::debug!(%run_id, %stage, token_prefix = %token_prefix(&token), "Token minted");
        Ok(token)
    }

    async fn resolve(&self, token: &str) -> Result<Option<TokenGrant>> {
        let entries = self.entries.lock().await;
        Ok(resolve_entry(token, entries.get(token)))
    }

    async fn evict(&self, token: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(token) {
            return Ok(false);
        }
        let mut next = entries.clone();
        next.remove(token);
        self.persist(&next).await?;
        *entries = next;
        Ok(true)
    }

    async fn migrate_legacy(&self) -> Result<usize> {
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        let migrated = migrate_map(&mut next);
        if migrated > 0 {
            self.persist(&next).await?;
            *entries = next;
        }
        Ok(migrated)
    }
}
