//! pagechat application binary - composition root.
//!
//! 1. Resolve configuration (file, environment, CLI)
//! 2. Open SQLite storage and fail documents orphaned by a previous run
//!    (sessions of deleted documents are swept once the orchestrator is up)
//! 3. Build the retrieval and language model adapters
//! 4. Wire the orchestrator, upload intake and indexer
//! 5. Serve the axum API until Ctrl-C

mod cli;

use std::sync::Arc;

use clap::Parser;

use pagechat_api::{start_server, AppState};
use pagechat_chat::{ChatOrchestrator, ChatSettings, DocumentIntake, UploadPolicy};
use pagechat_core::config::PageChatConfig;
use pagechat_llm::HttpCompletionClient;
use pagechat_retrieval::{Indexer, PageIndexClient, RetrievalClient};
use pagechat_storage::{
    ConversationStore, Database, DocumentRegistry, PdfStore, SqliteConversationStore,
    SqliteDocumentRegistry,
};

use crate::cli::CliArgs;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config. Loaded before tracing so the configured level can apply.
    let config_file = args.resolve_config_path();
    let config_found = config_file.exists();
    let mut config = if config_found {
        PageChatConfig::load(&config_file)?
    } else {
        PageChatConfig::default()
    };
    config.apply_env_overrides();
    args.apply(&mut config);
    config.validate()?;

    // Tracing. RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting pagechat v{}", env!("CARGO_PKG_VERSION"));
    if config_found {
        tracing::info!(path = %config_file.display(), "Configuration loaded");
    } else {
        tracing::warn!(path = %config_file.display(), "Config file not found, using defaults");
    }
    config.log_credential_status();

    // Storage.
    let db_path = config.database_path();
    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    let registry: Arc<dyn DocumentRegistry> = Arc::new(SqliteDocumentRegistry::new(Arc::clone(&db)));
    let memory: Arc<dyn ConversationStore> = Arc::new(SqliteConversationStore::new(Arc::clone(&db)));

    let recovered = registry.recover_interrupted()?;
    if recovered > 0 {
        tracing::warn!(count = recovered, "Marked documents interrupted by restart as failed");
    }

    let blobs = PdfStore::new(&config.upload.storage_path)?;

    // Upstream adapters.
    let retrieval: Arc<dyn RetrievalClient> = Arc::new(PageIndexClient::new(&config.retrieval)?);
    let llm = Arc::new(HttpCompletionClient::new(&config.llm)?);
    tracing::info!(
        retrieval = %config.retrieval.endpoint,
        model = %config.llm.model,
        "Upstream clients ready"
    );

    // Services.
    let indexer = Arc::new(Indexer::from_config(
        Arc::clone(&registry),
        Arc::clone(&retrieval),
        &config.retrieval,
    ));
    let orchestrator = Arc::new(ChatOrchestrator::new(
        Arc::clone(&registry),
        memory,
        retrieval,
        llm,
        blobs.clone(),
        ChatSettings::from_config(&config),
    ));
    orchestrator.purge_orphaned_sessions()?;
    let intake = Arc::new(DocumentIntake::new(
        registry,
        blobs,
        indexer,
        UploadPolicy::from(&config.upload),
    ));

    let state = AppState::new(config.clone(), orchestrator, intake);
    start_server(&config, state, shutdown_signal()).await?;

    tracing::info!("pagechat stopped");
    Ok(())
}
