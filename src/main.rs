//! Travelstore Server
//!
//! Serves the travel store over HTTP, optionally bulk-loading a data
//! directory in the background at startup.
//!
//! ```text
//! ┌──────────┐     ┌──────────┐     ┌──────────┐
//! │  Loader  │────▶│  Store   │◀────│  Router  │◀──── HTTP
//! └──────────┘     └──────────┘     └──────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use travelstore::api::{self, Router, RouterConfig};
use travelstore::config::{
    Limits, StoreConfig, DEFAULT_MAX_LOCATIONS, DEFAULT_MAX_USERS, DEFAULT_MAX_VISITS,
    DEFAULT_SHARD_COUNT,
};
use travelstore::error::{Error, Result};
use travelstore::loader;
use travelstore::store::Store;

// =============================================================================
// CLI Arguments
// =============================================================================

/// In-memory travel data store
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTTP bind address
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:80")]
    bind_addr: String,

    /// Directory of JSON data files to load at startup
    #[arg(long, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Lock shards per table and index
    #[arg(long, env = "SHARD_COUNT", default_value_t = DEFAULT_SHARD_COUNT)]
    shard_count: usize,

    /// Highest user id
    #[arg(long, env = "MAX_USERS", default_value_t = DEFAULT_MAX_USERS)]
    max_users: u32,

    /// Highest location id
    #[arg(long, env = "MAX_LOCATIONS", default_value_t = DEFAULT_MAX_LOCATIONS)]
    max_locations: u32,

    /// Highest visit id
    #[arg(long, env = "MAX_VISITS", default_value_t = DEFAULT_MAX_VISITS)]
    max_visits: u32,

    /// Memoize entity GET responses
    #[arg(long, env = "CACHE_ENABLED", default_value_t = true, action = ArgAction::Set)]
    cache_enabled: bool,

    /// Re-render entities after each successful write
    #[arg(long, env = "HEAT")]
    heat: bool,

    /// Enforce birth date and visit date windows
    #[arg(long, env = "STRICT_DATES")]
    strict_dates: bool,

    /// Reject visits with unknown references before storing them
    #[arg(long, env = "STRICT_FOREIGN_KEYS")]
    strict_foreign_keys: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Log every request
    #[arg(long, env = "ACCESS_LOG")]
    access_log: bool,

    /// Traffic stats interval in seconds, 0 disables
    #[arg(long, env = "STATS_INTERVAL_SECONDS", default_value = "1")]
    stats_interval_seconds: u64,
}

impl Args {
    fn store_config(&self) -> StoreConfig {
        StoreConfig {
            shard_count: self.shard_count,
            max_users: self.max_users,
            max_locations: self.max_locations,
            max_visits: self.max_visits,
            limits: if self.strict_dates {
                Limits::strict()
            } else {
                Limits::default()
            },
            strict_foreign_keys: self.strict_foreign_keys,
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting travelstore");
    info!("  Bind address: {}", args.bind_addr);
    info!("  Shard count: {}", args.shard_count);
    info!("  Response cache: {}", args.cache_enabled);
    info!("  Heat: {}", args.heat);

    let addr: SocketAddr = args
        .bind_addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid bind address: {}", e)))?;

    let store = Arc::new(Store::new(args.store_config())?);
    let router = Arc::new(Router::new(
        Arc::clone(&store),
        RouterConfig {
            cache_enabled: args.cache_enabled,
            heat: args.heat,
        },
    ));

    if let Some(dir) = args.data_dir.clone() {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            match loader::load_dir(Arc::clone(&store), &dir).await {
                Ok(_) => info!(stats = ?store.stats(), "Data loaded"),
                Err(e) => error!("Data load failed: {}", e),
            }
        });
    }

    if args.stats_interval_seconds > 0 {
        api::spawn_stats_watcher(
            Arc::clone(&router),
            Duration::from_secs(args.stats_interval_seconds),
        );
    }

    tokio::select! {
        result = api::serve(addr, router, args.access_log) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
    }

    info!("travelstore shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    if let Ok(directive) = "hyper=warn".parse() {
        filter = filter.add_directive(directive);
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
