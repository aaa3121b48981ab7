//! GCAb CLI
//!
//! Runs the node, or performs one indexer / mint operation and prints the
//! result as JSON.

use clap::{Parser, Subcommand};
use gcab_core::{Address, Clock};
use gcab_node::config::LoggingConfig;
use gcab_node::{GcabNode, MintReport, NodeConfig, Services};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "gcab")]
#[command(author = "GCAb Labs")]
#[command(version)]
#[command(about = "GCAb holder indexer and daily energy mint", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./gcab.toml when present)
    #[arg(short, long, global = true, env = "GCAB_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node: refresh loop, mint scheduler and HTTP API
    Node,

    /// Scan new transfer logs into the holder cache
    Index,

    /// Re-check the stalest holders for contract code
    Classify {
        /// Holders to check
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Scan, then classify
    Refresh,

    /// Seed the holder cache from the explorer holder list
    Bootstrap,

    /// Run today's mint
    Mint,

    /// List ranked non-contract holders
    Holders {
        /// Minimum balance in whole tokens
        #[arg(long, default_value = "0")]
        min: f64,

        #[arg(short, long, default_value = "200")]
        limit: u32,
    },

    /// Show a player's energy balance and recent ledger entries
    Energy {
        address: String,

        /// Ledger entries to show
        #[arg(long, default_value = "20")]
        ledger: u32,
    },

    /// Mark a player active now
    Touch { address: String },

    /// Cursor, holder and player counts, last mint
    Status,

    /// Print the effective configuration
    Config,

    /// Version information
    Version,
}

fn init_logging(verbose: bool, logging: &LoggingConfig) {
    let env_filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    let (json_layer, text_layer) = if logging.is_json() {
        (Some(tracing_subscriber::fmt::layer().json().with_target(true)), None)
    } else {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false),
            ),
        )
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_address(raw: &str) -> anyhow::Result<Address> {
    raw.parse()
        .map_err(|e| anyhow::anyhow!("invalid address {:?}: {}", raw, e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("gcab {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = NodeConfig::load(cli.config.as_deref())?;
    init_logging(cli.verbose, &config.logging);

    match cli.command {
        Commands::Node => {
            let node = GcabNode::new(config).await?;
            node.run().await?;
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }

        command => {
            let services = Services::from_config(&config).await?;
            let result = run_once(&config, &services, command).await;
            services.store.close().await;
            result?;
        }
    }

    Ok(())
}

async fn run_once(config: &NodeConfig, services: &Services, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Index => {
            print_json(&services.indexer.scan_now().await?)?;
        }

        Commands::Classify { limit } => {
            let limit = limit.unwrap_or(config.indexer.classify_limit);
            print_json(&services.indexer.classify_now(limit).await?)?;
        }

        Commands::Refresh => {
            let scan = services.indexer.scan_now().await?;
            let classify = services.indexer.classify_now(config.indexer.classify_limit).await?;
            print_json(&json!({ "scan": scan, "classify": classify }))?;
        }

        Commands::Bootstrap => {
            print_json(&services.indexer.bootstrap_now().await?)?;
        }

        Commands::Mint => {
            let outcome = services.mint.run_mint_now().await?;
            print_json(&MintReport::from(outcome))?;
        }

        Commands::Holders { min, limit } => {
            let holders = services.store.ranked_holders(min, limit).await?;
            print_json(&holders)?;
        }

        Commands::Energy { address, ledger } => {
            let address = parse_address(&address)?;
            let balance = services.store.energy_balance(&address).await?;
            let entries = services.store.ledger_entries(&address, ledger).await?;
            print_json(&json!({
                "address": address.to_checksum(),
                "energy_balance": balance,
                "ledger": entries,
            }))?;
        }

        Commands::Touch { address } => {
            let address = parse_address(&address)?;
            let now = services.clock.now();
            services.store.touch_player(&address, now).await?;
            print_json(&json!({ "address": address.to_checksum(), "last_seen_utc": now }))?;
        }

        Commands::Status => {
            let last_mint = services.store.last_mint().await?;
            print_json(&json!({
                "token": config.token.address,
                "cursor": services.store.scan_cursor().await?,
                "token_decimals": services.store.token_decimals().await?,
                "holders": services.store.holder_count().await?,
                "players": services.store.player_count().await?,
                "last_mint": last_mint,
            }))?;
        }

        Commands::Node | Commands::Config | Commands::Version => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::parse_from(["gcab", "-v", "holders", "--min", "10000", "-l", "5"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Holders { limit: 5, .. }));

        let cli = Cli::parse_from(["gcab", "--config", "prod.toml", "classify"]);
        assert_eq!(cli.config, Some(PathBuf::from("prod.toml")));
        assert!(matches!(cli.command, Commands::Classify { limit: None }));
    }
}
