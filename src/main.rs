mod analytics;
mod cache;
mod config;
mod engine;
mod exchange;
mod indicators;
mod optimizer;
mod risk;
mod strategies;
mod types;

use anyhow::{anyhow, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use cache::CandleCache;
use config::{DateRangeSpec, OptimizerConfig, StrategyBinding};
use engine::{BacktestEngine, BacktestResult};
use exchange::{CandleClient, CandleFetcher, ClientOptions, DataSource};
use optimizer::{
    AcceptAllCompiler, CommandCompiler, EventSink, Oracle, Orchestrator, ScriptedOracle,
    StrategyCompiler,
};
use strategies::create_strategy;
use types::CandleInterval;

const WARMUP_BARS: i64 = 200;

#[derive(Parser)]
#[command(name = "perp-optimizer")]
#[command(version = "0.1.0")]
#[command(about = "Backtesting and strategy optimization for crypto perpetual futures", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "optimizer.json")]
    config: String,

    /// Candle cache database
    #[arg(long, default_value = "sqlite://candles.db")]
    cache_db: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single backtest for a configured (asset, strategy) pair
    Backtest {
        /// Asset key from the config file
        #[arg(short, long)]
        asset: String,
        /// Strategy key under the asset
        #[arg(short, long)]
        strategy: String,
    },
    /// Backtest, then print the by-dimension trade analysis
    Analyze {
        #[arg(short, long)]
        asset: String,
        #[arg(short, long)]
        strategy: String,
    },
    /// Sync candles into the local cache
    Sync {
        /// Data source (bybit, hyperliquid, coinbase, coinbase_perp)
        #[arg(long)]
        source: String,
        #[arg(long)]
        coin: String,
        /// Candle interval (1m..1M)
        #[arg(long)]
        interval: String,
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: String,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: String,
    },
    /// Run the optimization loop until acceptance or budget exhaustion
    Optimize {
        #[arg(short, long)]
        asset: String,
        #[arg(short, long)]
        strategy: String,
        /// Directory for checkpoints, history and locks
        #[arg(long, default_value = "./optimizer-state")]
        work_dir: String,
        /// NDJSON event stream file (default: stdout)
        #[arg(long)]
        events: Option<String>,
        /// External oracle command (reads context JSON on stdin)
        #[arg(long)]
        oracle_cmd: Option<String>,
        /// Strategy typecheck command for structural edits
        #[arg(long)]
        compile_cmd: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("perp-optimizer v0.1.0");

    match cli.command {
        Commands::Backtest { asset, strategy } => {
            let result = run_backtest(&cli.config, &cli.cache_db, &asset, &strategy).await?;
            result.print_summary();
        }
        Commands::Analyze { asset, strategy } => {
            let result = run_backtest(&cli.config, &cli.cache_db, &asset, &strategy).await?;
            result.print_summary();
            let analysis = analytics::analyze_trades(&result.trades);
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
        Commands::Sync { source, coin, interval, start, end } => {
            run_sync(&cli.cache_db, &source, &coin, &interval, &start, &end).await?;
        }
        Commands::Optimize { asset, strategy, work_dir, events, oracle_cmd, compile_cmd } => {
            let code =
                run_optimize(&cli.config, &cli.cache_db, &asset, &strategy, &work_dir, events, oracle_cmd, compile_cmd)
                    .await;
            std::process::exit(code);
        }
    }

    Ok(())
}

fn client_options(source: DataSource) -> ClientOptions {
    let var = match source {
        DataSource::Bybit => "BYBIT_BASE_URL",
        DataSource::Hyperliquid => "HYPERLIQUID_BASE_URL",
        DataSource::Coinbase | DataSource::CoinbasePerp => "COINBASE_BASE_URL",
    };
    ClientOptions { base_url: std::env::var(var).ok(), inter_request_delay: None }
}

async fn load_window(
    cache: &CandleCache,
    binding: &StrategyBinding,
    start_ms: i64,
    end_ms: i64,
) -> Result<Vec<types::Candle>> {
    let client = CandleClient::new(binding.data_source, client_options(binding.data_source));
    let load_start = start_ms - WARMUP_BARS * binding.interval.millis();
    cache
        .sync(&client, binding.data_source, &binding.coin, binding.interval, load_start, end_ms)
        .await?;
    Ok(cache
        .get_candles(binding.data_source, &binding.coin, binding.interval, load_start, end_ms)
        .await?)
}

async fn run_backtest(
    config_path: &str,
    cache_db: &str,
    asset: &str,
    strategy_key: &str,
) -> Result<BacktestResult> {
    let config = OptimizerConfig::load(Path::new(config_path))?;
    let binding = config.binding(asset, strategy_key)?.clone();
    let (start_ms, end_ms) = config.date_range_for(&binding, Utc::now())?;

    let cache = CandleCache::new(cache_db).await?;
    let candles = load_window(&cache, &binding, start_ms, end_ms).await?;
    if candles.is_empty() {
        return Err(anyhow!("no candles available for {} {}", binding.coin, binding.interval));
    }
    info!("running backtest over {} candles", candles.len());

    let strategy = create_strategy(&binding.strategy_factory, &BTreeMap::new())
        .ok_or_else(|| anyhow!("unknown strategy factory {:?}", binding.strategy_factory))?;
    let mut engine = BacktestEngine::new(config.backtest.clone(), strategy);
    Ok(engine.run(&candles, binding.interval)?)
}

async fn run_sync(
    cache_db: &str,
    source: &str,
    coin: &str,
    interval: &str,
    start: &str,
    end: &str,
) -> Result<()> {
    let source = DataSource::from_str(source)
        .ok_or_else(|| anyhow!("unknown data source {:?}", source))?;
    let interval = CandleInterval::from_str(interval)
        .ok_or_else(|| anyhow!("unknown interval {:?}", interval))?;
    let range = DateRangeSpec::Explicit { start: start.to_string(), end: end.to_string() };
    let (start_ms, end_ms) = range.resolve(Utc::now())?;

    let cache = CandleCache::new(cache_db).await?;
    let client = CandleClient::new(source, client_options(source));
    let outcome = cache.sync(&client, source, coin, interval, start_ms, end_ms).await?;
    println!(
        "Synced {} {} {}: fetched {} candles, {} cached",
        source, coin, interval, outcome.fetched, outcome.cached
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_optimize(
    config_path: &str,
    cache_db: &str,
    asset: &str,
    strategy_key: &str,
    work_dir: &str,
    events_path: Option<String>,
    oracle_cmd: Option<String>,
    compile_cmd: Option<String>,
) -> i32 {
    match build_and_run(
        config_path, cache_db, asset, strategy_key, work_dir, events_path, oracle_cmd, compile_cmd,
    )
    .await
    {
        Ok(summary) => {
            println!("\n=== Optimization Summary ===");
            println!("Outcome:     {:?}", summary.outcome);
            println!("Iterations:  {}", summary.iterations);
            println!("Best iter:   {}", summary.best_iter);
            println!("Best score:  {:.2}", summary.best_score);
            if let Some(metrics) = &summary.best_metrics {
                println!("Best PnL:    ${:.2} over {} trades", metrics.total_pnl, metrics.num_trades);
            }
            summary.outcome.exit_code()
        }
        Err(e) => {
            error!("optimization failed: {}", e);
            1
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn build_and_run(
    config_path: &str,
    cache_db: &str,
    asset: &str,
    strategy_key: &str,
    work_dir: &str,
    events_path: Option<String>,
    oracle_cmd: Option<String>,
    compile_cmd: Option<String>,
) -> Result<optimizer::RunSummary> {
    let config = OptimizerConfig::load(Path::new(config_path))?;
    let binding = config.binding(asset, strategy_key)?.clone();
    let cache = CandleCache::new(cache_db).await?;
    let fetcher: Box<dyn CandleFetcher> = Box::new(CandleClient::new(
        binding.data_source,
        client_options(binding.data_source),
    ));

    let events = match events_path {
        Some(path) => EventSink::to_file(Path::new(&path))?,
        None => EventSink::stdout(),
    };

    let oracle: Box<dyn Oracle> = match oracle_cmd {
        Some(command) => Box::new(optimizer::oracle::CommandOracle { command, args: Vec::new() }),
        None => {
            info!("no oracle command configured; every iteration will decline changes");
            Box::new(ScriptedOracle::new(Vec::new()))
        }
    };

    let work_dir = PathBuf::from(work_dir).join(asset).join(strategy_key);
    let compiler: Box<dyn StrategyCompiler> = match compile_cmd {
        Some(command) => Box::new(CommandCompiler {
            command,
            args: Vec::new(),
            work_dir: work_dir.clone(),
        }),
        None => Box::new(AcceptAllCompiler),
    };

    let mut orchestrator = Orchestrator::new(
        config, asset, strategy_key, oracle, compiler, cache, fetcher, events, work_dir,
    );
    Ok(orchestrator.run(Utc::now()).await?)
}
