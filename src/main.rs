//! memza - chunked blob storage on a bounded-value key-value cache
//!
//! Command line front end: store and retrieve files, check the cache, or
//! serve the HTTP API.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memza::config::BackendKind;
use memza::{
    create_router, spawn_cleanup_task, AppState, BlobError, BlobName, BlobStore, CacheBackend,
    ChunkSettings, Config, KvCache,
};

/// Store large blobs in memcached as verified, numbered fragments.
#[derive(Parser, Debug)]
#[command(name = "memza", version, about)]
struct Cli {
    /// Cache server address (overrides MEMCACHED_SERVER)
    #[arg(long, short, global = true)]
    server: Option<String>,

    /// Cache backend (overrides CACHE_BACKEND)
    #[arg(long, value_enum, global = true)]
    backend: Option<BackendKind>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a file as a chunked blob.
    Store(StoreArgs),
    /// Reassemble a blob into a file and verify it.
    Retrieve(RetrieveArgs),
    /// Check that the cache is reachable and accepts writes.
    Check,
    /// Run the HTTP API.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct StoreArgs {
    /// File to store
    path: PathBuf,
    /// Key to store under (defaults to the file name)
    #[arg(long, short)]
    name: Option<String>,
    /// Replace an existing blob of the same name
    #[arg(long, short)]
    force: bool,
    /// Largest blob accepted, in bytes (overrides MAX_BLOB_SIZE)
    #[arg(long)]
    max_size: Option<u64>,
}

#[derive(Args, Debug)]
struct RetrieveArgs {
    /// Key the blob was stored under
    name: String,
    /// Where to write the reassembled blob
    #[arg(long, short)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Port to listen on (overrides SERVER_PORT)
    #[arg(long, short)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let mut config = Config::from_env();
    if let Some(server) = cli.server {
        config.memcached_server = server;
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }

    match cli.command {
        Commands::Store(args) => store(config, args).await,
        Commands::Retrieve(args) => retrieve(config, args).await,
        Commands::Check => check(config).await,
        Commands::Serve(args) => serve(config, args).await,
    }
}

fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "memza=debug,tower_http=debug"
    } else {
        "memza=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn blob_store(config: &Config) -> BlobStore<CacheBackend> {
    let cache = CacheBackend::from_config(config);
    if cache.as_memory().is_some() {
        warn!("Using the in-memory backend: nothing outlives this process");
    }
    BlobStore::new(cache, ChunkSettings::from_config(config))
}

async fn store(mut config: Config, args: StoreArgs) -> anyhow::Result<()> {
    if let Some(max_size) = args.max_size {
        config.max_blob_size = max_size;
    }

    let name = match args.name {
        Some(name) => name,
        None => default_name(&args.path)?,
    };
    let name = BlobName::new(name)?;

    let receipt = blob_store(&config)
        .store_file(&args.path, &name, args.force)
        .await
        .with_context(|| format!("failed to store {}", args.path.display()))?;

    println!("key:    {}", receipt.name);
    println!("sha256: {}", receipt.content_hash);
    info!(
        "{} bytes in {} fragments",
        receipt.size, receipt.fragment_count
    );
    Ok(())
}

fn default_name(path: &Path) -> anyhow::Result<String> {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => Ok(name.to_string()),
        None => bail!("cannot derive a blob name from {}, pass --name", path.display()),
    }
}

async fn retrieve(config: Config, args: RetrieveArgs) -> anyhow::Result<()> {
    let name = BlobName::new(args.name)?;
    let blobs = blob_store(&config);

    match blobs.retrieve_to_file(&name, &args.output).await {
        Ok(assembly) => {
            println!(
                "wrote {} bytes to {} (sha256 {})",
                assembly.size,
                args.output.display(),
                assembly.actual
            );
            Ok(())
        }
        Err(e @ BlobError::IntegrityMismatch { .. }) => {
            warn!("Kept unverified output at {}", args.output.display());
            Err(e.into())
        }
        Err(e) => Err(anyhow::Error::new(e).context(format!("failed to retrieve {}", name))),
    }
}

async fn check(config: Config) -> anyhow::Result<()> {
    let cache = CacheBackend::from_config(&config);
    let target = cache.describe();

    cache
        .ping()
        .await
        .with_context(|| format!("cache at {} is not reachable", target))?;

    let probe_key = format!("memza.probe.{}", std::process::id());
    let probe = chrono::Utc::now().to_rfc3339();
    cache.set(&probe_key, probe.as_bytes(), 0, 60).await?;
    let item = cache.get(&probe_key).await?;
    if let Err(e) = cache.delete(&probe_key).await {
        warn!("Could not delete probe key {}: {}", probe_key, e);
    }

    if item.value != probe.as_bytes() {
        bail!("cache at {} returned a different probe value", target);
    }
    println!("cache at {} is reachable and accepts writes", target);
    Ok(())
}

async fn serve(mut config: Config, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(port) = args.port {
        config.server_port = port;
    }
    info!(
        "Configuration loaded: backend={:?}, server={}, value_ceiling={}, max_blob_size={}, port={}",
        config.backend,
        config.memcached_server,
        config.value_ceiling,
        config.max_blob_size,
        config.server_port
    );

    let state = AppState::from_config(&config);

    let cleanup_handle = state
        .cache()
        .as_memory()
        .map(|cache| spawn_cleanup_task(cache.clone(), config.cleanup_interval));

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(cleanup_handle))
    .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM, then stops the cleanup task.
async fn shutdown_signal(cleanup_handle: Option<tokio::task::JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    if let Some(handle) = cleanup_handle {
        handle.abort();
        warn!("Cleanup task aborted");
    }
}
