//! # vela-md
//!
//! Market data feed for the Vela trading agent.
//!
//! ## Architecture
//!
//! ```text
//! market WS  ──┐                       ┌──► trader channel (symbol A)
//!              ├──► feed worker task ──┤
//! user-data WS┘    (candle windows)    └──► trader channel (symbol B)
//! ```
//!
//! One [`MarketFeed`] owns a combined-stream WebSocket for all configured
//! symbols plus (in REAL mode) the user-data stream. The feed worker task is
//! the only writer of the per-symbol candle windows; every update is cloned
//! into an immutable [`FeedEvent`] and sent over that symbol's unbounded
//! channel. Traders own all state on their side — there is no shared buffer.

pub mod binance;
pub mod ws;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ahash::AHashMap;
use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};
use vela_core::{Candle, FeedEvent, FeedEventKind};

use crate::binance::{StreamPayload, UserPayload};
use crate::ws::{WsConnConfig, WsConnection};

/// Receiver half of a per-symbol feed channel.
pub type FeedReceiver = mpsc::UnboundedReceiver<FeedEvent>;

/// Listen keys must be refreshed at least every 60 minutes.
const LISTEN_KEY_REFRESH: Duration = Duration::from_secs(30 * 60);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Feed configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// WebSocket base URL (e.g. `wss://stream.binance.com:9443`).
    pub ws_url: String,
    /// REST base URL for candle history and listen keys.
    pub rest_url: String,
    /// Exchange symbols to cover.
    pub symbols: Vec<String>,
    /// Candle interval (e.g. `"1m"`).
    pub candle_interval: String,
    /// Candle window length kept per symbol.
    pub max_candles: usize,
    /// API key — enables the user-data stream (execution reports, balances).
    pub user_stream_api_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Internal work messages (WS callbacks → feed worker)
// ---------------------------------------------------------------------------

enum FeedWork {
    Market(String, StreamPayload),
    User(UserPayload),
    /// A market WS (re)connect happened; refetch candle history.
    Resync,
}

// ---------------------------------------------------------------------------
// MarketFeed
// ---------------------------------------------------------------------------

/// The market data feed — one per process.
pub struct MarketFeed {
    config: FeedConfig,
    senders: Arc<AHashMap<String, mpsc::UnboundedSender<FeedEvent>>>,
    seq: Arc<AtomicU64>,
    http: reqwest::Client,
    market_ws: Option<WsConnection>,
    user_ws: Option<WsConnection>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl MarketFeed {
    /// Create the feed and one receiver per configured symbol.
    pub fn new(config: FeedConfig) -> (Self, AHashMap<String, FeedReceiver>) {
        let mut senders = AHashMap::new();
        let mut receivers = AHashMap::new();

        for symbol in &config.symbols {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.insert(symbol.clone(), tx);
            receivers.insert(symbol.clone(), rx);
        }

        let feed = Self {
            config,
            senders: Arc::new(senders),
            seq: Arc::new(AtomicU64::new(0)),
            http: reqwest::Client::new(),
            market_ws: None,
            user_ws: None,
            tasks: Vec::new(),
        };

        (feed, receivers)
    }

    /// Connect the streams and start the feed worker.
    pub async fn start(&mut self) -> Result<()> {
        let (work_tx, work_rx) = mpsc::unbounded_channel::<FeedWork>();

        // Feed worker — owns the candle windows, fans events out.
        let worker = FeedWorker {
            config: self.config.clone(),
            senders: Arc::clone(&self.senders),
            seq: Arc::clone(&self.seq),
            http: self.http.clone(),
            windows: AHashMap::new(),
        };
        self.tasks.push(tokio::spawn(worker.run(work_rx)));

        // Market data WebSocket (all symbols on one combined stream).
        let url = binance::build_stream_url(
            &self.config.ws_url,
            &self.config.symbols,
            &self.config.candle_interval,
        );
        let mut market_ws = WsConnection::new(WsConnConfig {
            url,
            subscribe_msg: None,
            label: "vela-md".into(),
        });

        let tx = work_tx.clone();
        let on_text: ws::OnMessageCallback = Arc::new(move |text: &str| {
            if let Some((symbol, payload)) = binance::parse_stream_message(text) {
                let _ = tx.send(FeedWork::Market(symbol, payload));
            }
        });
        let tx = work_tx.clone();
        let on_connect: ws::OnConnectCallback = Arc::new(move || {
            let _ = tx.send(FeedWork::Resync);
        });
        market_ws.start(on_text, Some(on_connect));
        self.market_ws = Some(market_ws);

        // User-data stream (REAL mode only).
        if let Some(api_key) = self.config.user_stream_api_key.clone() {
            self.start_user_stream(api_key, work_tx).await?;
        }

        info!(
            "[vela-md] started — {} symbol(s), interval {}",
            self.config.symbols.len(),
            self.config.candle_interval
        );
        Ok(())
    }

    async fn start_user_stream(
        &mut self,
        api_key: String,
        work_tx: mpsc::UnboundedSender<FeedWork>,
    ) -> Result<()> {
        let listen_key = binance::create_listen_key(&self.http, &self.config.rest_url, &api_key)
            .await
            .context("user-data stream login failed")?;
        info!(
            "[vela-md] user-data listen key: {}…",
            &listen_key[..8.min(listen_key.len())]
        );

        let mut user_ws = WsConnection::new(WsConnConfig {
            url: binance::build_user_stream_url(&self.config.ws_url, &listen_key),
            subscribe_msg: None,
            label: "vela-md-user".into(),
        });

        let on_text: ws::OnMessageCallback = Arc::new(move |text: &str| {
            if let Some(payload) = binance::parse_user_message(text) {
                let _ = work_tx.send(FeedWork::User(payload));
            }
        });
        user_ws.start(on_text, None);
        self.user_ws = Some(user_ws);

        // Background keepalive for the listen key.
        let http = self.http.clone();
        let rest_url = self.config.rest_url.clone();
        self.tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(LISTEN_KEY_REFRESH);
            interval.tick().await; // skip the immediate first tick
            loop {
                interval.tick().await;
                if let Err(e) =
                    binance::keepalive_listen_key(&http, &rest_url, &api_key, &listen_key).await
                {
                    warn!("[vela-md] listen key refresh failed: {e}");
                }
            }
        }));

        Ok(())
    }

    /// Gracefully stop — close WebSockets, abort worker tasks.
    pub async fn stop(&mut self) {
        if let Some(mut ws) = self.market_ws.take() {
            ws.stop().await;
        }
        if let Some(mut ws) = self.user_ws.take() {
            ws.stop().await;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("[vela-md] stopped");
    }
}

// ---------------------------------------------------------------------------
// FeedWorker — single writer of candle windows
// ---------------------------------------------------------------------------

struct FeedWorker {
    config: FeedConfig,
    senders: Arc<AHashMap<String, mpsc::UnboundedSender<FeedEvent>>>,
    seq: Arc<AtomicU64>,
    http: reqwest::Client,
    /// Per-symbol candle window, most-recent-first, bounded length.
    windows: AHashMap<String, Vec<Candle>>,
}

impl FeedWorker {
    async fn run(mut self, mut work_rx: mpsc::UnboundedReceiver<FeedWork>) {
        while let Some(work) = work_rx.recv().await {
            match work {
                FeedWork::Resync => self.resync_all().await,
                FeedWork::Market(symbol, payload) => self.on_market(&symbol, payload),
                FeedWork::User(payload) => self.on_user(payload),
            }
        }
    }

    /// Refetch candle history for every symbol (startup and WS reconnect).
    async fn resync_all(&mut self) {
        for symbol in self.config.symbols.clone() {
            match binance::fetch_klines(
                &self.http,
                &self.config.rest_url,
                &symbol,
                &self.config.candle_interval,
                self.config.max_candles,
            )
            .await
            {
                Ok(candles) => {
                    self.emit(&symbol, FeedEventKind::Candles(candles.clone()));
                    self.windows.insert(symbol, candles);
                }
                Err(e) => warn!("[vela-md] kline resync failed for {symbol}: {e}"),
            }
        }
    }

    fn on_market(&mut self, symbol: &str, payload: StreamPayload) {
        match payload {
            StreamPayload::Kline(candle) => {
                let window = self.windows.entry(symbol.to_string()).or_default();

                // Same open time overwrites the live candle in place; a new
                // open time starts the next slot.
                match window.first() {
                    Some(head) if head.open_time_ms == candle.open_time_ms => {
                        window[0] = candle;
                    }
                    _ => {
                        window.insert(0, candle);
                        window.truncate(self.config.max_candles);
                    }
                }

                let snapshot = window.clone();
                self.emit(symbol, FeedEventKind::Candles(snapshot));
            }
            StreamPayload::Depth(depth) => {
                self.emit(symbol, FeedEventKind::Depth(depth));
            }
        }
    }

    fn on_user(&mut self, payload: UserPayload) {
        match payload {
            UserPayload::Execution(report) => {
                let symbol = report.symbol.clone();
                self.emit(&symbol, FeedEventKind::Execution(report));
            }
            UserPayload::Balance(event) => {
                // Balance events carry no symbol — every trader filters by
                // its own pair's assets.
                for symbol in self.config.symbols.clone() {
                    self.emit(&symbol, FeedEventKind::Balance(event.clone()));
                }
            }
        }
    }

    fn emit(&self, symbol: &str, kind: FeedEventKind) {
        let Some(tx) = self.senders.get(symbol) else {
            return;
        };
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        // A send error means the trader is gone; nothing to do here.
        let _ = tx.send(FeedEvent { seq, kind });
    }
}
