//! LivEvm CLI: watch live EVM chains from the terminal.
//!
//! # Commands
//! ```
//! livevm chains --config <chains.json>
//! livevm watch  --config <chains.json> --chain <id> [--window N] [--track name=0xaddr ...]
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use livevm_core::LivevmConfig;

mod cmd_watch;
mod logging;

#[derive(Parser)]
#[command(
    name = "livevm",
    about = "Live EVM block scanner: throughput, block time and address activity",
    version
)]
struct Cli {
    /// Path to the chains config file
    #[arg(short, long, global = true, default_value = "config/chains.json")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured chains
    Chains,

    /// Watch a chain's new blocks until Ctrl-C
    Watch {
        /// Chain id, e.g. 8453
        #[arg(long)]
        chain: String,
        /// Analytics window in blocks (default: from config)
        #[arg(long)]
        window: Option<usize>,
        /// Address to watch, as name=0xaddress (repeatable)
        #[arg(long = "track", value_name = "NAME=ADDRESS")]
        track: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = LivevmConfig::from_file(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    if cli.verbose {
        config.log.level = "debug".into();
    }
    logging::init_tracing(&config.log);

    match cli.command {
        Commands::Chains => cmd_chains(&config),
        Commands::Watch { chain, window, track } => {
            cmd_watch::run(&config, &chain, window, &track).await
        }
    }
}

fn cmd_chains(config: &LivevmConfig) -> Result<()> {
    let registry = config.registry()?;
    println!("{} chain(s) configured:\n", registry.len());
    for chain in registry.iter() {
        println!(
            "  {:<10} {:<20} {:<6} {}",
            chain.id, chain.name, chain.currency_symbol, chain.endpoint
        );
    }
    Ok(())
}
