//! Enzyme - event-sourced projection engine for the IP-NFT platform.
//!
//! # Usage
//!
//! ```bash
//! # Replay a journal once and serve the result
//! enzyme --journal ./sepolia.ndjson --manifest ./manifests/sepolia.json
//!
//! # Tail the journal as the decoder appends records
//! DATABASE_URL=postgres://localhost/enzyme enzyme --journal ./sepolia.ndjson --follow
//! ```

mod relay;

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, warn};
use tracing_subscriber::{EnvFilter, fmt};

use enzyme_core::error::IndexerError;
use enzyme_core::metrics::init_metrics;
use enzyme_core::models::Manifest;
use enzyme_core::ports::{
    ContentSource, CursorStore, EntityStore, EventSource, HandlerRegistry, StaticTokens,
    TokenDirectory, HandlerContext,
};
use enzyme_core::services::IndexerService;
use enzyme_core::sources::DataSourceRegistry;
use enzyme_graphql::{ServerConfig, build_schema, serve_with_shutdown};
use enzyme_handlers::default_registry;
use enzyme_journal::{DEFAULT_GATEWAY, DEFAULT_TIMEOUT, IpfsGateway, JournalConfig, JournalSource};
use enzyme_storage::{Database, DatabaseConfig, PgCursorStore, PgEntityStore};

use crate::relay::{AnalyticsRelay, RelayTap};

/// Templates whose bids feed the analytics relay.
const RELAYED_TEMPLATES: [&str; 2] = ["CrowdSale", "StakedLockingCrowdSale"];

/// Enzyme CLI - IP-NFT platform indexer.
#[derive(Parser, Debug)]
#[command(name = "enzyme")]
#[command(about = "Enzyme - event-sourced projection engine for the IP-NFT platform")]
#[command(version)]
struct Cli {
    /// Path to the decoded-event NDJSON journal.
    #[arg(long, env = "JOURNAL_PATH")]
    journal: PathBuf,

    /// Tail the journal for appended records instead of stopping at the end.
    #[arg(long, env = "FOLLOW")]
    follow: bool,

    /// Path to the static data-source manifest.
    #[arg(long, env = "MANIFEST", default_value = "manifests/sepolia.json")]
    manifest: PathBuf,

    /// PostgreSQL database URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost/enzyme"
    )]
    database_url: String,

    /// IPFS HTTP gateway for metadata ingestion.
    #[arg(long, env = "IPFS_GATEWAY", default_value = DEFAULT_GATEWAY)]
    ipfs_gateway: String,

    /// Dune API key; enables the bid analytics relay when set.
    #[arg(long, env = "DUNE_API_KEY")]
    dune_api_key: Option<String>,

    /// GraphQL server port.
    #[arg(long, env = "GRAPHQL_PORT", default_value = "4000")]
    graphql_port: u16,

    /// Prometheus metrics port.
    #[arg(long, env = "METRICS_PORT", default_value = "9090")]
    metrics_port: u16,

    /// Enable JSON log output.
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,

    /// Run database migrations and exit.
    #[arg(long)]
    migrate_only: bool,

    /// Purge all projected entities and the cursor from the database and exit.
    ///
    /// The journal itself is untouched; the next run replays it from genesis.
    /// Schema/migrations are preserved.
    #[arg(long)]
    purge: bool,

    /// Skip confirmation prompt for destructive operations (like --purge).
    #[arg(long, short = 'y')]
    yes: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    // Prometheus metrics exporter (optional - failures don't crash the app)
    let metrics_enabled = match format!("0.0.0.0:{}", cli.metrics_port).parse::<std::net::SocketAddr>()
    {
        Ok(metrics_addr) => {
            match PrometheusBuilder::new()
                .with_http_listener(metrics_addr)
                .install()
            {
                Ok(()) => {
                    init_metrics();
                    true
                }
                Err(e) => {
                    warn!(
                        "⚠️  Failed to start metrics exporter: {}. Continuing without metrics.",
                        e
                    );
                    false
                }
            }
        }
        Err(e) => {
            warn!("⚠️  Invalid metrics address: {}. Continuing without metrics.", e);
            false
        }
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 🚀 STARTUP
    // ─────────────────────────────────────────────────────────────────────────
    info!("🚀 Starting Enzyme Indexer");
    debug!(journal = %cli.journal.display(), follow = cli.follow, "Journal");
    debug!(database_url = %mask_password(&cli.database_url), "Database endpoint");

    // ─────────────────────────────────────────────────────────────────────────
    // 🗄️ DATABASE
    // ─────────────────────────────────────────────────────────────────────────
    let indexer_db_config = DatabaseConfig::for_indexer(&cli.database_url);
    let api_db_config = DatabaseConfig::for_api(&cli.database_url);

    info!("🗄️  Connecting to database...");
    let db = Database::connect(&indexer_db_config)
        .await
        .context("Failed to connect to database")?;

    db.migrate().await.context("Failed to run migrations")?;
    info!("🗄️  Database ready (migrations applied)");

    if cli.migrate_only {
        info!("🛑 --migrate-only flag set, exiting");
        return Ok(());
    }

    if cli.purge {
        return handle_purge(&db, cli.yes).await;
    }

    let api_db = Database::connect(&api_db_config)
        .await
        .context("Failed to create API database pool")?;

    let store: Arc<dyn EntityStore> = Arc::new(PgEntityStore::new(&db));
    let cursors: Arc<dyn CursorStore> = Arc::new(PgCursorStore::new(&db));
    let api_store: Arc<dyn EntityStore> = Arc::new(PgEntityStore::new(&api_db));
    let api_cursors: Arc<dyn CursorStore> = Arc::new(PgCursorStore::new(&api_db));

    // ─────────────────────────────────────────────────────────────────────────
    // 📡 LEDGER JOURNAL
    // ─────────────────────────────────────────────────────────────────────────
    let manifest = load_manifest(&cli.manifest)?;
    info!(
        chain = %manifest.chain_id,
        sources = manifest.sources.len(),
        "📡 Manifest loaded"
    );

    let tokens = Arc::new(StaticTokens::new());
    let journal_config = if cli.follow {
        JournalConfig::following(&cli.journal)
    } else {
        JournalConfig::finite(&cli.journal)
    };
    let source: Arc<dyn EventSource> =
        Arc::new(JournalSource::new(journal_config, Arc::clone(&tokens)));

    let chain_id = source
        .chain_id()
        .await
        .context("Failed to read the journal header")?;
    info!(chain = %chain_id, "📡 Journal opened");

    let content: Arc<dyn ContentSource> = Arc::new(
        IpfsGateway::new(&cli.ipfs_gateway, DEFAULT_TIMEOUT)
            .context("Failed to build IPFS gateway client")?,
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 📦 HANDLERS
    // ─────────────────────────────────────────────────────────────────────────
    let data_sources = Arc::new(DataSourceRegistry::new());
    let tokens_port: Arc<dyn TokenDirectory> = tokens;
    let ctx = HandlerContext::new(
        Arc::clone(&store),
        Arc::clone(&data_sources),
        tokens_port,
        content,
    );

    let mut handlers = default_registry();
    match cli.dune_api_key {
        Some(key) if !key.is_empty() => {
            let relay = Arc::new(AnalyticsRelay::new(key, &chain_id));
            handlers = tap_sale_handlers(handlers, relay);
            info!("📊 Bid analytics relay enabled");
        }
        _ => debug!("Bid analytics relay disabled (no API key)"),
    }

    let indexer = IndexerService::new(
        manifest,
        source,
        Arc::clone(&cursors),
        Arc::new(handlers),
        ctx,
    );

    // ─────────────────────────────────────────────────────────────────────────
    // ⚡ SERVICES START
    // ─────────────────────────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut graphql_shutdown_rx = shutdown_tx.subscribe();

    let graphql_config = ServerConfig {
        host: "0.0.0.0".to_string(),
        port: cli.graphql_port,
        enable_playground: true,
    };

    let schema = build_schema(api_store, api_cursors);
    let graphql_port = cli.graphql_port;
    let graphql_handle = tokio::spawn(
        async move {
            let shutdown_signal = async move {
                while !*graphql_shutdown_rx.borrow() {
                    if graphql_shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            };

            if let Err(e) = serve_with_shutdown(schema, graphql_config, shutdown_signal).await {
                error!(error = %e, "❌ Server error");
            }
            debug!("Server stopped");
        }
        .instrument(info_span!("graphql")),
    );

    let indexer_shutdown_tx = shutdown_tx.clone();
    let indexer_handle = tokio::spawn(
        async move {
            match indexer.run(shutdown_rx).await {
                Ok(()) => info!("✅ Journal fully projected"),
                Err(IndexerError::ShutdownRequested) => {}
                Err(e @ IndexerError::ChainMismatch { .. }) => {
                    // Chain mismatch is fatal - trigger shutdown
                    error!(error = %e, "❌ Indexer error");
                    let _ = indexer_shutdown_tx.send(true);
                }
                Err(e) => error!(error = ?e, "❌ Indexer error"),
            }
        }
        .instrument(info_span!("indexer")),
    );

    // ─────────────────────────────────────────────────────────────────────────
    // ✅ READY
    // ─────────────────────────────────────────────────────────────────────────
    info!("✅ Enzyme ready");
    info!("   ⚡ GraphQL:  http://localhost:{}/graphql", graphql_port);
    if metrics_enabled {
        info!(
            "   📊 Metrics:  http://localhost:{}/metrics",
            cli.metrics_port
        );
    } else {
        info!("   📊 Metrics:  disabled");
    }
    info!("   Press Ctrl+C to stop");

    shutdown_signal().await;

    // ─────────────────────────────────────────────────────────────────────────
    // 🛑 SHUTDOWN
    // ─────────────────────────────────────────────────────────────────────────
    info!("🛑 Shutting down...");
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(std::time::Duration::from_secs(30), indexer_handle).await {
        Ok(_) => debug!("Indexer stopped"),
        Err(_) => warn!("⚠️  Indexer shutdown timed out"),
    }

    match tokio::time::timeout(std::time::Duration::from_secs(10), graphql_handle).await {
        Ok(_) => debug!("GraphQL stopped"),
        Err(_) => warn!("⚠️  GraphQL shutdown timed out"),
    }

    db.close().await;
    api_db.close().await;

    info!("🛑 Shutdown complete");
    Ok(())
}

/// Load and parse the static data-source manifest.
fn load_manifest(path: &PathBuf) -> Result<Manifest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse manifest {}", path.display()))
}

/// Wrap the sale handlers with the analytics relay decorator.
fn tap_sale_handlers(base: HandlerRegistry, relay: Arc<AnalyticsRelay>) -> HandlerRegistry {
    let mut tapped = HandlerRegistry::new();
    for template in base.templates() {
        if let Some(handler) = base.get(template) {
            if RELAYED_TEMPLATES.contains(&template) {
                tapped.register(Arc::new(RelayTap::new(
                    Arc::clone(handler),
                    Arc::clone(&relay),
                )));
            } else {
                tapped.register(Arc::clone(handler));
            }
        }
    }
    tapped
}

/// Initialize tracing subscriber.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

/// Mask password in database URL for logging.
fn mask_password(url_str: &str) -> String {
    match url::Url::parse(url_str) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.to_string()
        }
        Err(_) => url_str.to_string(),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Handle the --purge command.
async fn handle_purge(db: &Database, skip_confirmation: bool) -> Result<()> {
    warn!("⚠️  PURGE MODE: This will delete ALL projected data!");
    warn!("   - Every entity document, all kinds");
    warn!("   - The indexer cursor will be reset");
    warn!("   - Schema and migrations will be preserved");

    if !skip_confirmation {
        print!("\n🔴 Are you sure you want to purge all data? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            info!("❌ Purge cancelled");
            return Ok(());
        }
    }

    info!("🗑️  Purging database...");

    let stats = db.purge().await.context("Failed to purge database")?;

    info!("✅ Database purged successfully");
    info!("   📦 Entities removed: {}", stats.entities_removed);
    info!("   📍 Cursors removed: {}", stats.cursors_removed);
    info!("   The indexer will replay the journal from genesis on next run");

    Ok(())
}
