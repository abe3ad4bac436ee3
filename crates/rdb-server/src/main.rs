use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rdb_backend_chain::ChainBackend;
use rdb_backend_core::Backend;
use rdb_backend_memcache::MemcacheBackend;
use rdb_backend_memory::MemoryBackend;
use rdb_config::RdbConfig;
use rdb_server::{AppState, build_app};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rdb-server", version, about = "RDB key/value store server")]
struct Args {
    /// Bind address. Defaults to `RDB_BIND`/`RDB_PORT` (or their builtin
    /// defaults) when not given.
    #[arg(long)]
    bind: Option<String>,

    /// Which storage backend to serve.
    #[command(subcommand)]
    backend: BackendArgs,
}

#[derive(Subcommand, Debug)]
enum BackendArgs {
    /// The embedded hash-DB backend over `sled`.
    Memory {
        /// Directory the on-disk store lives under.
        #[arg(long)]
        basedir: std::path::PathBuf,
        /// Which on-disk store under `basedir` to attach to.
        #[arg(long, default_value_t = 0)]
        shmkey: u64,
    },
    /// The memcache-backed backend.
    Memcache {
        /// Comma-separated `host:port` memcache server list.
        #[arg(long)]
        servers: String,
    },
    /// A fast in-memory cache layered in front of a slower, authoritative
    /// memcache layer.
    Chain {
        /// Directory the fast embedded layer's on-disk store lives under.
        #[arg(long)]
        basedir: std::path::PathBuf,
        /// Which on-disk store under `basedir` to attach to.
        #[arg(long, default_value_t = 0)]
        shmkey: u64,
        /// Comma-separated `host:port` memcache server list for the slow layer.
        #[arg(long)]
        servers: String,
    },
}

fn build_backend(args: &BackendArgs) -> Result<Arc<dyn Backend>> {
    Ok(match args {
        BackendArgs::Memory { basedir, shmkey } => Arc::new(MemoryBackend::new(basedir, *shmkey)),
        BackendArgs::Memcache { servers } => Arc::new(MemcacheBackend::new(servers.clone())),
        BackendArgs::Chain {
            basedir,
            shmkey,
            servers,
        } => Arc::new(ChainBackend::new(vec![
            (
                "memory".to_string(),
                Box::new(MemoryBackend::new(basedir, *shmkey)) as Box<dyn Backend>,
            ),
            (
                "memcache".to_string(),
                Box::new(MemcacheBackend::new(servers.clone())) as Box<dyn Backend>,
            ),
        ])?),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rdb=info")))
        .init();

    let args = Args::parse();

    let mut config = RdbConfig::load().context("load server configuration")?;
    if let Some(bind) = &args.bind {
        let (host, port) = bind
            .rsplit_once(':')
            .context("--bind must be host:port")?;
        config.bind = host.to_string();
        config.port = port.parse().context("--bind port must be a u16")?;
    }

    let backend = build_backend(&args.backend)?;
    // Open now so the process fails early if the backend can't be reached;
    // individual request handlers rely on it already being open.
    backend.open().await.context("open backend")?;

    let app = build_app(AppState { backend });

    let addr = config.bind_addr().context("resolve bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(%addr, "rdb-server listening");

    axum::serve(listener, app).await.context("serve")
}
