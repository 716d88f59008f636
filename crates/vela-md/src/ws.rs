//! Single WebSocket connection with auto-reconnect.
//!
//! Each `WsConnection` runs as a tokio task that:
//! 1. Connects to the exchange WebSocket endpoint (TLS).
//! 2. Sends the subscription message (if any) and invokes the connect hook.
//! 3. Reads messages and forwards them to a callback.
//! 4. Answers server pings.
//! 5. Automatically reconnects on disconnection with exponential backoff —
//!    persistent connectivity loss never surfaces past this module; consumers
//!    simply observe stalled data until flow resumes.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Callback invoked for each received text message.
pub type OnMessageCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Callback invoked after every successful (re)connect + subscribe.
///
/// Used by the feed to resynchronize state that a dropped connection may have
/// invalidated (e.g. refetch candle history).
pub type OnConnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Configuration for a single WebSocket connection.
#[derive(Debug, Clone)]
pub struct WsConnConfig {
    /// Full WebSocket URL (e.g. `wss://stream.binance.com:9443/stream?...`).
    pub url: String,
    /// Message to send immediately after connection (subscription request).
    pub subscribe_msg: Option<String>,
    /// Label used in log lines.
    pub label: String,
}

/// A single WebSocket connection managed by a background tokio task.
pub struct WsConnection {
    config: WsConnConfig,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl WsConnection {
    /// Create a new (not yet started) connection.
    pub fn new(config: WsConnConfig) -> Self {
        Self {
            config,
            shutdown_tx: None,
            task: None,
        }
    }

    /// Start the connection task.
    pub fn start(&mut self, on_text: OnMessageCallback, on_connect: Option<OnConnectCallback>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = self.config.clone();

        let task = tokio::spawn(async move {
            connection_loop(config, on_text, on_connect, shutdown_rx).await;
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.task = Some(task);
    }

    /// Stop the connection and wait for the task to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Main connection loop — connects, subscribes, reads, reconnects.
async fn connection_loop(
    config: WsConnConfig,
    on_text: OnMessageCallback,
    on_connect: Option<OnConnectCallback>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut backoff = Duration::from_millis(100);
    let max_backoff = Duration::from_secs(30);
    let label = &config.label;

    loop {
        // Check shutdown before connecting
        if *shutdown_rx.borrow() {
            info!("[{label}] shutdown requested");
            return;
        }

        info!("[{label}] connecting to {}", config.url);

        let ws_stream = match tokio_tungstenite::connect_async(config.url.as_str()).await {
            Ok((s, _response)) => {
                backoff = Duration::from_millis(100); // reset backoff on success
                info!("[{label}] connected");
                s
            }
            Err(e) => {
                error!("[{label}] connection failed: {e}, retrying in {backoff:?}");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {},
                    _ = shutdown_rx.changed() => return,
                }
                backoff = (backoff * 2).min(max_backoff);
                continue;
            }
        };

        let (mut ws_write, mut ws_read) = ws_stream.split();

        // Send subscription message
        if let Some(ref sub_msg) = config.subscribe_msg {
            debug!("[{label}] subscribing: {sub_msg}");
            if let Err(e) = ws_write.send(Message::Text(sub_msg.clone().into())).await {
                error!("[{label}] subscribe send failed: {e}");
                continue;
            }
        }

        if let Some(ref cb) = on_connect {
            cb();
        }

        // Main read loop
        loop {
            tokio::select! {
                // Shutdown signal
                _ = shutdown_rx.changed() => {
                    info!("[{label}] shutdown signal received");
                    let _ = ws_write.close().await;
                    return;
                }

                // Incoming message
                msg = ws_read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            on_text(&text);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = ws_write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            warn!("[{label}] received close frame");
                            break;
                        }
                        Some(Err(e)) => {
                            error!("[{label}] read error: {e}");
                            break;
                        }
                        None => {
                            warn!("[{label}] stream ended");
                            break;
                        }
                        _ => {} // Binary, Pong, Frame — ignore
                    }
                }
            }
        }

        // Disconnected — will reconnect at the top of the outer loop
        warn!("[{label}] disconnected, reconnecting in {backoff:?}");
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {},
            _ = shutdown_rx.changed() => return,
        }
        backoff = (backoff * 2).min(max_backoff);
    }
}
