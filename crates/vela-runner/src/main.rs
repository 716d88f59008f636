//! # vela-runner
//!
//! Main entry point for the Vela trading agent.
//!
//! Loads a JSON configuration file, builds the order gateway for the
//! configured run type, starts the market data feed, and runs one trader task
//! per configured market until Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! vela-runner config.json --log-level info
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use vela_core::{RunType, SymbolRules};
use vela_md::{FeedConfig, MarketFeed};
use vela_strategy::{MacdStrategy, Strategy};
use vela_td::binance::BinanceGateway;
use vela_td::paper::PaperGateway;
use vela_td::Gateway;
use vela_trader::{OrderLog, Trader, TraderCache, TraderConfig, TraderController};

/// Interval between cache persistence passes.
const CACHE_WRITE_INTERVAL: Duration = Duration::from_secs(30);

/// Vela — unattended trading agent.
#[derive(Parser)]
#[command(name = "vela-runner", about = "Vela Trading Agent Runner")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Initialize logging
    vela_core::logging::init_logging(&cli.log_level, cli.log_dir.as_deref(), "vela");

    info!(
        "vela-runner starting — config={}, log_level={}",
        cli.config.display(),
        cli.log_level,
    );

    // 2. Load configuration
    let config = vela_core::config::load_config(&cli.config)?;
    info!(
        "config loaded — {:?}/{:?}, {} market(s)",
        config.run_type,
        config.trading_type,
        config.markets.len(),
    );

    // 3. Build the gateway for the configured run type. Symbol rules always
    //    come from the real exchange info (unsigned endpoint).
    let api = config.api.clone();
    let (api_key, secret_key, recv_window) = match &api {
        Some(api) => (
            api.public_key.clone(),
            api.private_key.clone(),
            api.recv_window.unwrap_or(5000),
        ),
        None => (String::new(), String::new(), 5000),
    };

    let info_client = BinanceGateway::new(
        api_key.clone(),
        secret_key.clone(),
        config.effective_rest_url().to_string(),
        recv_window,
    );

    let gateway: Arc<dyn Gateway> = match config.run_type {
        RunType::Real => Arc::new(BinanceGateway::new(
            api_key.clone(),
            secret_key,
            config.effective_rest_url().to_string(),
            recv_window,
        )),
        RunType::Test => Arc::new(PaperGateway::new()),
    };

    // 4. Market data feed — one receiver per symbol.
    let symbols: Vec<String> = config.markets.iter().map(|m| m.pair().symbol()).collect();
    let (mut feed, mut receivers) = MarketFeed::new(FeedConfig {
        ws_url: config.effective_ws_url().to_string(),
        rest_url: config.effective_rest_url().to_string(),
        symbols,
        candle_interval: config.candle_interval.clone(),
        max_candles: config.effective_max_candles(),
        user_stream_api_key: match config.run_type {
            RunType::Real => Some(api_key),
            RunType::Test => None,
        },
    });

    // 5. Build and spawn one trader per market.
    let cache = Arc::new(TraderCache::new(
        config.effective_cache_dir(),
        Duration::from_secs(config.effective_cache_max_age_secs()),
    ));
    let strategy: Arc<dyn Strategy> = Arc::new(MacdStrategy::default());

    let mut controllers: Vec<(String, TraderController)> = Vec::new();
    let mut handles = Vec::new();

    for market in &config.markets {
        let pair = market.pair();
        let symbol = pair.symbol();

        let rules: SymbolRules = info_client
            .exchange_rules(&symbol)
            .await
            .with_context(|| format!("fetching exchange rules for {symbol}"))?;
        info!(
            "{symbol}: lot digits {}, tick digits {}, min notional {}",
            rules.lot_size_digits, rules.tick_size_digits, rules.min_notional,
        );

        let feed_rx = receivers
            .remove(&symbol)
            .context("feed receiver missing for configured symbol")?;
        let restore = cache.load(&symbol);
        let order_log = OrderLog::new(config.effective_order_log_dir(), &symbol);

        let (trader, controller) = Trader::new(
            TraderConfig {
                pair,
                run_type: config.run_type,
                trading_type: config.trading_type,
                allocation: config.allocated_currency,
            },
            rules,
            Arc::clone(&gateway),
            Arc::clone(&strategy),
            feed_rx,
            Some(order_log),
            restore,
        );

        controllers.push((symbol.clone(), controller));
        handles.push(tokio::spawn(trader.run()));
        info!("trader for {symbol} spawned");
    }

    // 6. Start the feed after the receivers are owned by their traders.
    feed.start().await?;

    // 7. Periodic cache persistence from the traders' snapshots.
    let controllers = Arc::new(controllers);
    let persist_cache = Arc::clone(&cache);
    let persist_controllers = Arc::clone(&controllers);
    let persist_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(CACHE_WRITE_INTERVAL);
        interval.tick().await; // skip the immediate first tick
        loop {
            interval.tick().await;
            for (symbol, controller) in persist_controllers.iter() {
                let record = controller.snapshot.borrow().clone();
                if let Err(e) = persist_cache.save(symbol, &record) {
                    warn!("cache write for {symbol} failed: {e:#}");
                }
            }
        }
    });

    info!(
        "all {} trader(s) running — press Ctrl+C to stop",
        handles.len()
    );

    // 8. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    // 9. Cooperative stop: traders observe the flag at their next tick.
    for (symbol, controller) in controllers.iter() {
        info!("stopping trader for {symbol}");
        controller.stop();
    }
    for handle in handles {
        if let Err(e) = handle.await.unwrap_or_else(|e| Err(e.into())) {
            error!("trader task ended with error: {e:#}");
        }
    }

    persist_task.abort();

    // Final cache pass so restarts resume from the freshest state.
    for (symbol, controller) in controllers.iter() {
        let record = controller.snapshot.borrow().clone();
        if let Err(e) = cache.save(symbol, &record) {
            warn!("final cache write for {symbol} failed: {e:#}");
        }
    }

    feed.stop().await;
    info!("all traders stopped — goodbye");
    Ok(())
}
