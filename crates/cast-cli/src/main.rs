use std::path::Path;
use std::sync::Arc;

use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::{Context, Result};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use tokio::sync::watch;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use cast_data::Store;
use cast_decode::{ContractRegistry, Decoder};
use cast_engine::Observer;
use cast_node::{NodeClient, RateLimiter, DEFAULT_MAX_IN_FLIGHT};

#[derive(Parser, Debug)]
#[command(name = "blockcast")]
#[command(about = "Real-time Ethereum mempool observer and next-block forecaster")]
#[command(version)]
struct Cli {
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[arg(long, global = true, env = "DB_PATH", default_value = "data/blockcast.sqlite")]
    db_path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Observe the mempool and forecast each next block until interrupted.
    Run(RunArgs),
    /// Show recent forecasts and comparisons from the store.
    Status(StatusArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// WebSocket endpoint of the execution node.
    #[arg(long, env = "ETH_WS_URL")]
    ws_url: String,

    /// API key for the Etherscan-style contract resolver.
    #[arg(long, env = "ETHERSCAN_API_KEY")]
    etherscan_api_key: Option<String>,

    /// Port the external UI process serves on; recorded for reference.
    #[arg(long, env = "API_PORT", default_value_t = 3001)]
    api_port: u16,

    /// Maximum concurrent in-flight RPC calls.
    #[arg(long, default_value_t = DEFAULT_MAX_IN_FLIGHT)]
    max_in_flight: usize,
}

#[derive(Args, Debug)]
struct StatusArgs {
    /// Rows to display per table.
    #[arg(long, default_value_t = 10)]
    limit: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Some(parent) = Path::new(&cli.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
        }
    }

    match cli.command {
        Commands::Run(args) => run(&cli.db_path, args).await,
        Commands::Status(args) => status(&cli.db_path, args),
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,cast_cli={level},cast_data={level},cast_node={level},cast_decode={level},cast_engine={level}"
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(db_path: &str, args: RunArgs) -> Result<()> {
    let store = Arc::new(Store::new(db_path)?);
    let limiter = RateLimiter::new(args.max_in_flight);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (client, events) = NodeClient::connect(&args.ws_url, shutdown_rx.clone()).await?;

    let registry = Arc::new(ContractRegistry::new(
        store.clone(),
        limiter.clone(),
        Some(client.clone()),
        args.etherscan_api_key,
    ));
    let decoder = Arc::new(Decoder::new(registry));
    let observer = Observer::new(client, events, limiter, store, decoder);

    info!(
        db_path,
        api_port = args.api_port,
        max_in_flight = args.max_in_flight,
        "blockcast observer starting"
    );

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    observer.run(shutdown_rx).await
}

fn status(db_path: &str, args: StatusArgs) -> Result<()> {
    let store = Store::new(db_path)?;

    println!(
        "forecasts: {}   cached contracts: {}",
        store.count_predictions()?,
        store.count_contracts()?
    );

    let predictions = store.list_recent_predictions(args.limit)?;
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["block", "txs", "gas price (gwei)", "created"]);
    for prediction in &predictions {
        table.add_row(vec![
            prediction.block_number.to_string(),
            prediction.predicted_transactions.len().to_string(),
            format!("{:.2}", prediction.predicted_gas_price),
            prediction.created_at.format("%H:%M:%S").to_string(),
        ]);
    }
    println!("\nrecent forecasts\n{table}");

    let comparisons = store.list_recent_comparisons(args.limit)?;
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["block", "predicted", "actual", "accuracy", "builder"]);
    for comparison in &comparisons {
        table.add_row(vec![
            comparison.block_number.to_string(),
            comparison.predicted_transactions.len().to_string(),
            comparison.actual_transactions.len().to_string(),
            format!("{:.1}%", comparison.accuracy),
            comparison
                .builder_name
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
        ]);
    }
    println!("\nrecent comparisons\n{table}");

    Ok(())
}
