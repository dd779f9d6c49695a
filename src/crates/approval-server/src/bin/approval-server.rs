//! Approval server binary
//!
//! Standalone HTTP server for human-in-the-loop approval checkpoints.

use anyhow::Context;
use approval_server::config::{NotifierMode, ServerConfig, StorageBackend};
use approval_server::services::{
    ApprovalContext, ApprovalService, LogNotifier, Notifier, SystemClock, WebhookNotifier,
};
use approval_server::{create_router, AppState};
use clap::Parser;
use hitl_checkpoint::{
    CheckpointStore, FileCheckpointStore, FileTokenRegistry, InMemoryCheckpointStore,
    InMemoryTokenRegistry, TokenRegistry,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "approval-server")]
#[command(about = "Human-in-the-loop approval checkpoint server", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to config/approval-server.toml)
    #[arg(short, long, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Listen host
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Storage backend (memory or file)
    #[arg(long)]
    storage: Option<StorageBackend>,

    /// Data directory for the file backend
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Notifier mode (log or webhook)
    #[arg(long)]
    notifier: Option<NotifierMode>,

    /// Mail relay endpoint for the webhook notifier
    #[arg(long)]
    webhook_url: Option<String>,

    /// Rewrite legacy token registry entries before serving
    #[arg(long)]
    migrate_legacy_tokens: bool,
}

impl Cli {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(backend) = self.storage {
            config.storage.backend = backend;
        }
        if let Some(dir) = &self.data_dir {
            config.storage.path = dir.clone();
        }
        if let Some(mode) = self.notifier {
            config.notifier.mode = mode;
        }
        if let Some(url) = &self.webhook_url {
            config.notifier.webhook_url = Some(url.clone());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    tracing::info!("Loading server configuration...");
    let mut config = ServerConfig::load(cli.config.as_deref()).context("loading configuration")?;
    cli.apply(&mut config);
    config.validate().context("validating configuration")?;

    tracing::info!(
        storage = ?config.storage.backend,
        notifier = ?config.notifier.mode,
        reminder_delay_secs = config.approvals.reminder_delay_secs,
        reminder_cooldown_secs = config.approvals.reminder_cooldown_secs,
        "Configuration loaded"
    );

    let (store, tokens, storage_backend) = open_storage(&config)?;
    if cli.migrate_legacy_tokens {
        let migrated = tokens.migrate_legacy().await.context("migrating legacy tokens")?;
        tracing::info!(migrated, "Legacy token entries rewritten");
    }

    let notifier: Arc<dyn Notifier> = match config.notifier.mode {
        NotifierMode::Log => Arc::new(LogNotifier),
        NotifierMode::Webhook => {
            let url = config
                .notifier
                .webhook_url
                .clone()
                .context("notifier.webhook_url is required in webhook mode")?;
            Arc::new(WebhookNotifier::new(
                url,
                std::time::Duration::from_secs(config.notifier.timeout_secs),
            )?)
        }
    };

    let ctx = ApprovalContext::new(
        store,
        tokens,
        notifier,
        Arc::new(SystemClock),
        config.approval_settings(),
    );
    let app = create_router(AppState::new(ApprovalService::new(ctx), storage_backend));

    let addr = config.socket_addr()?;
    tracing::info!("Starting approval server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Approval server shut down gracefully");
    Ok(())
}

type Storage = (Arc<dyn CheckpointStore>, Arc<dyn TokenRegistry>, &'static str);

fn open_storage(config: &ServerConfig) -> anyhow::Result<Storage> {
    match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; pending approvals are lost on restart");
            let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
            let tokens: Arc<dyn TokenRegistry> = Arc::new(InMemoryTokenRegistry::new());
            Ok((store, tokens, "memory"))
        }
        StorageBackend::File => {
            let checkpoints = config.storage.checkpoints_dir();
            let tokens = config.storage.tokens_file();
            tracing::info!(
                checkpoints = %checkpoints.display(),
                tokens = %tokens.display(),
                "Using file storage"
            );
            let store: Arc<dyn CheckpointStore> =
                Arc::new(FileCheckpointStore::open(&checkpoints).context("opening checkpoint store")?);
            let tokens: Arc<dyn TokenRegistry> =
                Arc::new(FileTokenRegistry::open(&tokens).context("opening token registry")?);
            Ok((store, tokens, "file"))
        }
    }
}

/// Signal for graceful shutdown (Ctrl-C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install CTRL-C signal handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received CTRL-C signal, shutting down");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, shutting down");
        }
    }
}
