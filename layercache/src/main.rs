use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use layercache_core::{Clock, SystemClock};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod format;
mod store;

#[derive(Parser)]
#[command(name = "layercache")]
#[command(about = "Inspect and maintain a layercache local-tier store", long_about = None)]
struct Cli {
    /// Local store file (defaults to the user cache directory)
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Key prefix the application was configured with
    #[arg(short, long, default_value = "layercache:")]
    prefix: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every entry, expired ones included
    List,

    /// Print a fresh value as JSON
    Get {
        key: String,
    },

    /// Store a JSON value
    Set {
        key: String,

        /// Value as JSON text (e.g. '{"likes": 3}')
        json: String,

        /// Time-to-live in milliseconds
        #[arg(long, default_value = "3600000")]
        ttl_ms: u64,
    },

    /// Remove one entry
    Remove {
        key: String,
    },

    /// Remove expired entries
    Purge,

    /// Remove every entry under the prefix
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "layercache=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let path = cli.store.clone().unwrap_or_else(store::default_store_path);
    let local = store::open_local(&path, &cli.prefix)?;
    info!("Using local store {:?} (namespace: {})", path, local.namespace());

    match cli.command {
        Commands::List => {
            let entries = local.entries();
            if entries.is_empty() {
                println!("No entries under {}", local.namespace());
            } else {
                let now = SystemClock.now_millis();
                println!("Entries ({}):", entries.len());
                println!("{}", "=".repeat(70));
                for (key, entry) in entries {
                    println!("{}", format::entry_line(&key, &entry, now));
                }
            }
        }

        Commands::Get { ref key } => match local.get(key) {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => anyhow::bail!("No fresh entry for {}", key),
        },

        Commands::Set {
            ref key,
            ref json,
            ttl_ms,
        } => {
            let value: serde_json::Value =
                serde_json::from_str(json).with_context(|| format!("Invalid JSON for {}", key))?;
            let ttl = Duration::from_millis(ttl_ms);

            local.set(key, &value, ttl);
            if local.stats().errors > 0 {
                anyhow::bail!("Failed to write {} to {:?}", key, path);
            }
            println!("Stored {} (ttl {})", key, format::format_duration(ttl));
        }

        Commands::Remove { ref key } => {
            local.remove(key);
            println!("Removed {}", key);
        }

        Commands::Purge => {
            let purged = local.purge_expired();
            println!("Purged {} expired entries", purged);
        }

        Commands::Clear => {
            let count = local.len();
            local.clear();
            println!("Cleared {} entries", count);
        }
    }

    Ok(())
}
