use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use lotbook::{
    commands::{compare, export_prices, run, stats},
    config::{RuntimeSettings, DEFAULT_LOOKBACK, DEFAULT_SYMBOL},
    context::AppContext,
};
use std::path::PathBuf;

const DEFAULT_PRICE_SNAPSHOT_FILE: &str = "data/prices.bin";

#[derive(Parser)]
#[command(name = "lotbook")]
#[command(about = "Backtest lot-level long/short strategies over a price series")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest one strategy template
    Run {
        /// Template ID to backtest (buy_and_hold or rolling_mean)
        template_id: String,
        /// Ticker symbol to load prices for
        #[arg(long, default_value = DEFAULT_SYMBOL)]
        symbol: String,
        /// Number of prices to use, counted from the start of the history (0 uses all)
        #[arg(long, default_value_t = DEFAULT_LOOKBACK)]
        lookback: usize,
        /// Read prices from a snapshot file instead of the chart endpoint
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: Option<PathBuf>,
        /// Starting cash; overrides BACKTEST_INITIAL_CAPITAL
        #[arg(long)]
        initial_capital: Option<f64>,
        /// Strategy parameter as key=value, e.g. windowLength=20
        #[arg(short, long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
        /// Mirror positions and trades into PostgreSQL (requires DATABASE_URL)
        #[arg(long)]
        persist: bool,
    },
    /// Backtest every template over the same prices
    Compare {
        #[arg(long, default_value = DEFAULT_SYMBOL)]
        symbol: String,
        #[arg(long, default_value_t = DEFAULT_LOOKBACK)]
        lookback: usize,
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: Option<PathBuf>,
        #[arg(long)]
        initial_capital: Option<f64>,
        #[arg(short, long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
        #[arg(long)]
        persist: bool,
    },
    /// Fetch prices and write a snapshot for offline runs
    ExportPrices {
        #[arg(long, default_value = DEFAULT_SYMBOL)]
        symbol: String,
        #[arg(long, default_value_t = 0)]
        lookback: usize,
        /// Destination file for the snapshot
        #[arg(short, long = "output", value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Summarize the trades of a persisted run
    Stats {
        /// Run id printed by `run --persist`
        run_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = RuntimeSettings::from_env()?;
    let app_context = AppContext::initialize(settings);

    info!("Starting lotbook. Backtest results are not financial advice.");

    match cli.command {
        Commands::Run {
            template_id,
            symbol,
            lookback,
            data_file,
            initial_capital,
            params,
            persist,
        } => {
            run::run(
                &app_context,
                run::RunOptions {
                    template_id,
                    symbol,
                    lookback,
                    data_file,
                    initial_capital,
                    params,
                    persist,
                },
            )
            .await?;
        }
        Commands::Compare {
            symbol,
            lookback,
            data_file,
            initial_capital,
            params,
            persist,
        } => {
            compare::run(
                &app_context,
                compare::CompareOptions {
                    symbol,
                    lookback,
                    data_file,
                    initial_capital,
                    params,
                    persist,
                },
            )
            .await?;
        }
        Commands::ExportPrices {
            symbol,
            lookback,
            output,
        } => {
            let output_path = output.unwrap_or_else(|| PathBuf::from(DEFAULT_PRICE_SNAPSHOT_FILE));
            export_prices::run(&app_context, &symbol, lookback, &output_path).await?;
        }
        Commands::Stats { run_id } => {
            stats::run(&app_context, &run_id).await?;
        }
    }

    Ok(())
}
