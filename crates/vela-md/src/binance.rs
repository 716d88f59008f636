//! Binance market-data and user-data message handling.
//!
//! Parses combined-stream WebSocket JSON into feed payloads, builds stream
//! URLs, fetches candle history over REST, and manages user-data listen keys.
//!
//! # Streams
//!
//! | Stream                    | Payload                          |
//! |---------------------------|----------------------------------|
//! | `<symbol>@kline_<int>`    | live candle (open or closed)     |
//! | `<symbol>@depth5`         | top-5 partial book snapshot      |
//! | user-data `executionReport` | order fill/cancel report       |
//! | user-data `outboundAccountPosition` | balance delta          |

use anyhow::{Context, Result, anyhow};
use vela_core::{
    AssetBalance, BalanceEvent, Candle, DepthLevel, DepthSnapshot, ExecStatus, ExecutionReport,
    OrderSide,
};

// ---------------------------------------------------------------------------
// Parsed payloads
// ---------------------------------------------------------------------------

/// A market-data message, tagged with its (uppercase) symbol.
#[derive(Debug, Clone)]
pub enum StreamPayload {
    /// Live candle update — the newest window slot, open or closed.
    Kline(Candle),
    /// Top-of-book snapshot.
    Depth(DepthSnapshot),
}

/// A user-data stream message.
#[derive(Debug, Clone)]
pub enum UserPayload {
    Execution(ExecutionReport),
    Balance(BalanceEvent),
}

// ---------------------------------------------------------------------------
// URL / subscription builders
// ---------------------------------------------------------------------------

/// Build the combined-stream URL for a set of symbols.
///
/// Each symbol contributes a kline stream and a depth5 stream, exactly the
/// data one trader tick consumes.
pub fn build_stream_url(ws_base: &str, symbols: &[String], interval: &str) -> String {
    let streams: Vec<String> = symbols
        .iter()
        .map(|s| s.to_lowercase())
        .flat_map(|s| [format!("{s}@kline_{interval}"), format!("{s}@depth5")])
        .collect();

    format!("{ws_base}/stream?streams={}", streams.join("/"))
}

/// Build the user-data stream URL from a listen key.
pub fn build_user_stream_url(ws_base: &str, listen_key: &str) -> String {
    format!("{ws_base}/ws/{listen_key}")
}

// ---------------------------------------------------------------------------
// Market stream parsing
// ---------------------------------------------------------------------------

/// Parse one combined-stream message into `(symbol, payload)`.
///
/// Returns `None` for messages that are not market data (subscription acks,
/// unknown streams).
pub fn parse_stream_message(text: &str) -> Option<(String, StreamPayload)> {
    let v: serde_json::Value = serde_json::from_str(text).ok()?;

    let stream = v.get("stream")?.as_str()?;
    let data = v.get("data")?;
    let symbol = stream.split('@').next()?.to_uppercase();

    if stream.contains("@kline") {
        parse_kline(data).map(|c| (symbol, StreamPayload::Kline(c)))
    } else if stream.contains("@depth") {
        parse_depth(data).map(|d| (symbol, StreamPayload::Depth(d)))
    } else {
        None
    }
}

fn parse_kline(data: &serde_json::Value) -> Option<Candle> {
    let k = data.get("k")?;
    Some(Candle {
        open_time_ms: k.get("t")?.as_u64()?,
        open: parse_f64_field(k, "o")?,
        high: parse_f64_field(k, "h")?,
        low: parse_f64_field(k, "l")?,
        close: parse_f64_field(k, "c")?,
        volume: parse_f64_field(k, "v")?,
    })
}

fn parse_depth(data: &serde_json::Value) -> Option<DepthSnapshot> {
    Some(DepthSnapshot {
        bids: parse_levels(data.get("bids")?)?,
        asks: parse_levels(data.get("asks")?)?,
    })
}

fn parse_levels(v: &serde_json::Value) -> Option<Vec<DepthLevel>> {
    let mut levels = Vec::new();
    for entry in v.as_array()? {
        let pair = entry.as_array()?;
        levels.push(DepthLevel {
            price: pair.first()?.as_str()?.parse().ok()?,
            qty: pair.get(1)?.as_str()?.parse().ok()?,
        });
    }
    Some(levels)
}

// ---------------------------------------------------------------------------
// User stream parsing
// ---------------------------------------------------------------------------

/// Parse one user-data stream message.
///
/// Returns `None` for event types the trader does not consume.
pub fn parse_user_message(text: &str) -> Option<UserPayload> {
    let v: serde_json::Value = serde_json::from_str(text).ok()?;

    match v.get("e")?.as_str()? {
        "executionReport" => parse_execution_report(&v).map(UserPayload::Execution),
        "outboundAccountPosition" => parse_balance_event(&v).map(UserPayload::Balance),
        _ => None,
    }
}

fn parse_execution_report(v: &serde_json::Value) -> Option<ExecutionReport> {
    let side = match v.get("S")?.as_str()? {
        "BUY" => OrderSide::Buy,
        "SELL" => OrderSide::Sell,
        _ => return None,
    };

    let status = match v.get("X")?.as_str()? {
        "NEW" => ExecStatus::New,
        "PARTIALLY_FILLED" => ExecStatus::PartiallyFilled,
        "FILLED" => ExecStatus::Filled,
        "CANCELED" => ExecStatus::Canceled,
        "REJECTED" => ExecStatus::Rejected,
        "EXPIRED" => ExecStatus::Expired,
        _ => return None,
    };

    Some(ExecutionReport {
        symbol: v.get("s")?.as_str()?.to_string(),
        order_id: v.get("i")?.as_u64()?,
        side,
        status,
        fill_qty: parse_f64_field(v, "z")?,
        fill_price: parse_f64_field(v, "L")?,
        event_time_ms: v.get("E")?.as_u64()?,
    })
}

fn parse_balance_event(v: &serde_json::Value) -> Option<BalanceEvent> {
    let mut balances = Vec::new();
    for b in v.get("B")?.as_array()? {
        balances.push(AssetBalance {
            asset: b.get("a")?.as_str()?.to_string(),
            free: parse_f64_field(b, "f")?,
            locked: parse_f64_field(b, "l")?,
        });
    }

    Some(BalanceEvent {
        event_time_ms: v.get("E")?.as_u64()?,
        balances,
    })
}

/// Parse a string-encoded decimal field (Binance sends numbers as strings).
fn parse_f64_field(v: &serde_json::Value, key: &str) -> Option<f64> {
    v.get(key)?.as_str()?.parse().ok()
}

// ---------------------------------------------------------------------------
// REST: candle history + listen keys
// ---------------------------------------------------------------------------

/// Fetch the most recent `limit` candles over REST, most-recent-first.
pub async fn fetch_klines(
    http: &reqwest::Client,
    rest_base: &str,
    symbol: &str,
    interval: &str,
    limit: usize,
) -> Result<Vec<Candle>> {
    let url = format!("{rest_base}/api/v3/klines?symbol={symbol}&interval={interval}&limit={limit}");
    let body: serde_json::Value = http
        .get(&url)
        .send()
        .await
        .context("klines request failed")?
        .error_for_status()
        .context("klines HTTP error")?
        .json()
        .await?;

    let rows = body
        .as_array()
        .ok_or_else(|| anyhow!("klines response is not an array"))?;

    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        let r = row
            .as_array()
            .ok_or_else(|| anyhow!("kline row is not an array"))?;
        candles.push(Candle {
            open_time_ms: r
                .first()
                .and_then(|v| v.as_u64())
                .ok_or_else(|| anyhow!("kline open time missing"))?,
            open: kline_field(r, 1)?,
            high: kline_field(r, 2)?,
            low: kline_field(r, 3)?,
            close: kline_field(r, 4)?,
            volume: kline_field(r, 5)?,
        });
    }

    // REST returns oldest-first; the trader wants the newest at index 0.
    candles.reverse();
    Ok(candles)
}

fn kline_field(row: &[serde_json::Value], idx: usize) -> Result<f64> {
    row.get(idx)
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| anyhow!("kline field {idx} missing or invalid"))
}

/// Create a new listen key for the user-data stream.
pub async fn create_listen_key(
    http: &reqwest::Client,
    rest_base: &str,
    api_key: &str,
) -> Result<String> {
    let url = format!("{rest_base}/api/v3/userDataStream");
    let body: serde_json::Value = http
        .post(&url)
        .header("X-MBX-APIKEY", api_key)
        .send()
        .await
        .context("create listen key request failed")?
        .error_for_status()
        .context("create listen key HTTP error")?
        .json()
        .await?;

    body.get("listenKey")
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| anyhow!("no listenKey in response"))
}

/// Keep a listen key alive (must be called at least every 60 minutes).
pub async fn keepalive_listen_key(
    http: &reqwest::Client,
    rest_base: &str,
    api_key: &str,
    listen_key: &str,
) -> Result<()> {
    let url = format!("{rest_base}/api/v3/userDataStream?listenKey={listen_key}");
    http.put(&url)
        .header("X-MBX-APIKEY", api_key)
        .send()
        .await
        .context("keepalive listen key request failed")?
        .error_for_status()
        .context("keepalive listen key HTTP error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_url_covers_all_symbols() {
        let url = build_stream_url(
            "wss://stream.binance.com:9443",
            &["BTCUSDT".into(), "ETHUSDT".into()],
            "1m",
        );
        assert!(url.starts_with("wss://stream.binance.com:9443/stream?streams="));
        assert!(url.contains("btcusdt@kline_1m"));
        assert!(url.contains("btcusdt@depth5"));
        assert!(url.contains("ethusdt@depth5"));
    }

    #[test]
    fn parse_kline_msg() {
        let msg = r#"{
            "stream": "btcusdt@kline_1m",
            "data": {
                "e": "kline", "E": 1700000000123, "s": "BTCUSDT",
                "k": {
                    "t": 1700000000000, "T": 1700000059999, "s": "BTCUSDT",
                    "o": "100.1", "c": "101.2", "h": "102.0", "l": "99.5",
                    "v": "12.5", "x": false
                }
            }
        }"#;

        let (symbol, payload) = parse_stream_message(msg).unwrap();
        assert_eq!(symbol, "BTCUSDT");
        match payload {
            StreamPayload::Kline(c) => {
                assert_eq!(c.open_time_ms, 1700000000000);
                assert_eq!(c.close, 101.2);
                assert_eq!(c.volume, 12.5);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn parse_depth_msg() {
        let msg = r#"{
            "stream": "ethusdt@depth5",
            "data": {
                "lastUpdateId": 160,
                "bids": [["99.90", "5.0"], ["99.80", "2.0"]],
                "asks": [["100.10", "3.0"]]
            }
        }"#;

        let (symbol, payload) = parse_stream_message(msg).unwrap();
        assert_eq!(symbol, "ETHUSDT");
        match payload {
            StreamPayload::Depth(d) => {
                assert_eq!(d.best_bid(), Some(99.9));
                assert_eq!(d.best_ask(), Some(100.1));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn parse_execution_report_msg() {
        let msg = r#"{
            "e": "executionReport", "E": 1700000001000, "s": "BTCUSDT",
            "S": "BUY", "X": "FILLED", "i": 4242,
            "q": "0.100", "z": "0.100", "L": "100.50"
        }"#;

        match parse_user_message(msg).unwrap() {
            UserPayload::Execution(r) => {
                assert_eq!(r.order_id, 4242);
                assert_eq!(r.side, OrderSide::Buy);
                assert_eq!(r.status, ExecStatus::Filled);
                assert_eq!(r.fill_qty, 0.1);
                assert_eq!(r.fill_price, 100.5);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn parse_balance_msg() {
        let msg = r#"{
            "e": "outboundAccountPosition", "E": 1700000002000,
            "B": [
                {"a": "BTC", "f": "0.5", "l": "0.0"},
                {"a": "USDT", "f": "1000.0", "l": "25.0"}
            ]
        }"#;

        match parse_user_message(msg).unwrap() {
            UserPayload::Balance(b) => {
                assert_eq!(b.event_time_ms, 1700000002000);
                assert_eq!(b.balances.len(), 2);
                assert_eq!(b.balances[1].locked, 25.0);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn ignores_subscription_acks() {
        assert!(parse_stream_message(r#"{"result": null, "id": 1}"#).is_none());
        assert!(parse_user_message(r#"{"e": "listenKeyExpired"}"#).is_none());
    }
}
