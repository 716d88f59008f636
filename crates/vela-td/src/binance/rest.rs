//! Signed REST client for the Binance spot/margin account.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use tracing::{debug, warn};
use uuid::Uuid;
use vela_core::error::GatewayError;
use vela_core::precision::digits_from_step;
use vela_core::time_util;
use vela_core::{
    AssetBalance, MarginAccount, MarginAsset, OrderAck, OrderFill, OrderKind, OrderRequest,
    SymbolRules, TradingType,
};

use super::auth;

/// Attempts per request before a transient failure surfaces.
const MAX_ATTEMPTS: u32 = 3;

/// Fixed backoff between retries of transient failures.
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Binance rejection codes for an order id the exchange no longer knows.
const CODE_UNKNOWN_ORDER: i64 = -2011;
const CODE_NO_SUCH_ORDER: i64 = -2013;

/// Binance code for request-weight throttling.
const CODE_TOO_MANY_REQUESTS: i64 = -1003;

/// Binance spot/margin account gateway.
pub struct BinanceGateway {
    http: reqwest::Client,
    api_key: String,
    secret_key: String,
    base_url: String,
    recv_window: u64,
}

impl BinanceGateway {
    pub fn new(api_key: String, secret_key: String, base_url: String, recv_window: u64) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            secret_key,
            base_url,
            recv_window,
        }
    }

    /// Quantization rules for a symbol, derived from the exchange filters.
    ///
    /// Unsigned endpoint — also used by TEST runs to pick up real lot/tick
    /// digits before the paper gateway takes over.
    pub async fn exchange_rules(&self, symbol: &str) -> anyhow::Result<SymbolRules> {
        let url = format!("{}/api/v3/exchangeInfo?symbol={symbol}", self.base_url);
        let body: serde_json::Value = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let filters = body
            .get("symbols")
            .and_then(|s| s.get(0))
            .and_then(|s| s.get("filters"))
            .and_then(|f| f.as_array())
            .ok_or_else(|| anyhow::anyhow!("no filters for {symbol} in exchangeInfo"))?;

        let mut rules = SymbolRules {
            lot_size_digits: 0,
            tick_size_digits: 0,
            min_notional: 0.0,
        };

        for filter in filters {
            match filter.get("filterType").and_then(|t| t.as_str()) {
                Some("LOT_SIZE") => {
                    if let Some(step) = filter.get("stepSize").and_then(|v| v.as_str()) {
                        rules.lot_size_digits = digits_from_step(step);
                    }
                }
                Some("PRICE_FILTER") => {
                    if let Some(tick) = filter.get("tickSize").and_then(|v| v.as_str()) {
                        rules.tick_size_digits = digits_from_step(tick);
                    }
                }
                Some("NOTIONAL") | Some("MIN_NOTIONAL") => {
                    if let Some(min) = filter
                        .get("minNotional")
                        .and_then(|v| v.as_str())
                        .and_then(|s| s.parse().ok())
                    {
                        rules.min_notional = min;
                    }
                }
                _ => {}
            }
        }

        Ok(rules)
    }

    /// Execute one signed request with fixed-backoff retries of transient
    /// failures. Business rejections are returned typed, never retried.
    async fn signed_request(
        &self,
        method: Method,
        path: &str,
        mut params: Vec<(&str, String)>,
    ) -> Result<serde_json::Value, GatewayError> {
        params.push(("recvWindow", self.recv_window.to_string()));

        let mut last_err = GatewayError::Network("no attempt made".into());

        for attempt in 1..=MAX_ATTEMPTS {
            // Timestamp and signature must be fresh per attempt.
            let mut attempt_params = params.clone();
            let ts = time_util::now_ms().to_string();
            attempt_params.push(("timestamp", ts));
            let query = auth::build_signed_query(&attempt_params, &self.secret_key);

            let url = format!("{}{path}?{query}", self.base_url);
            let response = self
                .http
                .request(method.clone(), &url)
                .header("X-MBX-APIKEY", &self.api_key)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    warn!("[binance-td] attempt {attempt}/{MAX_ATTEMPTS} transport error: {e}");
                    last_err = GatewayError::Network(e.to_string());
                    tokio::time::sleep(RETRY_BACKOFF).await;
                    continue;
                }
            };

            let status = response.status();
            let body: serde_json::Value = response.json().await.unwrap_or_default();

            if status.is_success() {
                return Ok(body);
            }

            // 429/418: throttled or banned — retry after backoff.
            if status.as_u16() == 429 || status.as_u16() == 418 {
                warn!("[binance-td] throttled (HTTP {status}), attempt {attempt}/{MAX_ATTEMPTS}");
                last_err = GatewayError::RateLimited;
                tokio::time::sleep(RETRY_BACKOFF).await;
                continue;
            }

            // Business rejection — typed, no retry.
            let code = body.get("code").and_then(|c| c.as_i64()).unwrap_or(0);
            let message = body
                .get("msg")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
                .to_string();
            return Err(map_rejection(code, message));
        }

        Err(last_err)
    }

    fn order_path(trading_type: TradingType) -> &'static str {
        match trading_type {
            TradingType::Spot => "/api/v3/order",
            TradingType::Margin => "/sapi/v1/margin/order",
        }
    }
}

/// Map a Binance rejection code to a typed gateway error.
fn map_rejection(code: i64, message: String) -> GatewayError {
    match code {
        CODE_UNKNOWN_ORDER | CODE_NO_SUCH_ORDER => GatewayError::StaleOrder,
        CODE_TOO_MANY_REQUESTS => GatewayError::RateLimited,
        _ => GatewayError::Rejected { code, message },
    }
}

/// Exchange wire name for a placeable order kind.
fn order_type_name(kind: OrderKind) -> &'static str {
    match kind {
        OrderKind::Signal | OrderKind::Limit => "LIMIT",
        OrderKind::Market => "MARKET",
        OrderKind::StopLoss => "STOP_LOSS",
        OrderKind::StopLossLimit => "STOP_LOSS_LIMIT",
        // OCO goes through its own endpoint; kind name unused there.
        OrderKind::OcoLimit => "OCO",
        OrderKind::Wait | OrderKind::Complete => unreachable!("not placeable"),
    }
}

fn parse_ack(body: &serde_json::Value) -> Result<OrderAck, GatewayError> {
    let order_id = body
        .get("orderId")
        .or_else(|| body.get("orderListId"))
        .and_then(|v| v.as_u64())
        .ok_or_else(|| GatewayError::Network("ack missing orderId".into()))?;

    let price = body
        .get("price")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0);

    let mut fills = Vec::new();
    if let Some(raw) = body.get("fills").and_then(|f| f.as_array()) {
        for fill in raw {
            let price = fill
                .get("price")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok());
            let qty = fill
                .get("qty")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok());
            if let (Some(price), Some(qty)) = (price, qty) {
                fills.push(OrderFill { price, qty });
            }
        }
    }

    Ok(OrderAck {
        order_id,
        price,
        fills,
        test_quantity: None,
    })
}

#[async_trait]
impl crate::Gateway for BinanceGateway {
    async fn place_order(&self, req: &OrderRequest) -> Result<OrderAck, GatewayError> {
        let client_order_id = Uuid::new_v4().simple().to_string();

        let mut params: Vec<(&str, String)> = vec![
            ("symbol", req.symbol.clone()),
            ("side", req.side.to_string()),
            ("quantity", req.quantity.to_string()),
            ("newClientOrderId", client_order_id),
        ];

        let (path, is_oco) = if req.kind == OrderKind::OcoLimit {
            ("/api/v3/order/oco", true)
        } else {
            (Self::order_path(req.trading_type), false)
        };

        if is_oco {
            if let Some(price) = req.price {
                params.push(("price", price.to_string()));
            }
            if let Some(stop) = req.stop_price {
                params.push(("stopPrice", stop.to_string()));
            }
            if let Some(stop_limit) = req.stop_limit_price {
                params.push(("stopLimitPrice", stop_limit.to_string()));
                params.push(("stopLimitTimeInForce", "GTC".to_string()));
            }
        } else {
            params.push(("type", order_type_name(req.kind).to_string()));
            if let Some(price) = req.price {
                params.push(("price", price.to_string()));
            }
            if let Some(stop) = req.stop_price {
                params.push(("stopPrice", stop.to_string()));
            }
            if let Some(ref tif) = req.time_in_force {
                params.push(("timeInForce", tif.clone()));
            }
        }

        debug!(
            "[binance-td] placing {} {} {} qty={} price={:?}",
            req.symbol, req.side, req.kind, req.quantity, req.price
        );

        let body = self.signed_request(Method::POST, path, params).await?;
        parse_ack(&body)
    }

    async fn cancel_order(
        &self,
        trading_type: TradingType,
        symbol: &str,
        order_id: u64,
    ) -> Result<(), GatewayError> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("orderId", order_id.to_string()),
        ];
        self.signed_request(Method::DELETE, Self::order_path(trading_type), params)
            .await?;
        Ok(())
    }

    async fn cancel_oco_order(&self, symbol: &str) -> Result<(), GatewayError> {
        let params = vec![("symbol", symbol.to_string())];
        self.signed_request(Method::DELETE, "/api/v3/orderList", params)
            .await?;
        Ok(())
    }

    async fn borrow(&self, asset: &str, amount: f64) -> Result<u64, GatewayError> {
        let params = vec![
            ("asset", asset.to_string()),
            ("amount", amount.to_string()),
        ];
        let body = self
            .signed_request(Method::POST, "/sapi/v1/margin/loan", params)
            .await?;

        body.get("tranId")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| GatewayError::Network("loan ack missing tranId".into()))
    }

    async fn repay(&self, asset: &str, amount: f64) -> Result<(), GatewayError> {
        let params = vec![
            ("asset", asset.to_string()),
            ("amount", amount.to_string()),
        ];
        self.signed_request(Method::POST, "/sapi/v1/margin/repay", params)
            .await?;
        Ok(())
    }

    async fn get_balance(&self, asset: &str) -> Result<AssetBalance, GatewayError> {
        let body = self
            .signed_request(Method::GET, "/api/v3/account", Vec::new())
            .await?;

        let balances = body
            .get("balances")
            .and_then(|b| b.as_array())
            .ok_or_else(|| GatewayError::Network("account response missing balances".into()))?;

        for b in balances {
            if b.get("asset").and_then(|a| a.as_str()) == Some(asset) {
                return Ok(AssetBalance {
                    asset: asset.to_string(),
                    free: balance_field(b, "free"),
                    locked: balance_field(b, "locked"),
                });
            }
        }

        // An asset never touched by the account is simply empty.
        Ok(AssetBalance {
            asset: asset.to_string(),
            free: 0.0,
            locked: 0.0,
        })
    }

    async fn get_margin_account(&self) -> Result<MarginAccount, GatewayError> {
        let body = self
            .signed_request(Method::GET, "/sapi/v1/margin/account", Vec::new())
            .await?;

        let assets = body
            .get("userAssets")
            .and_then(|a| a.as_array())
            .ok_or_else(|| GatewayError::Network("margin account missing userAssets".into()))?;

        let user_assets = assets
            .iter()
            .filter_map(|a| {
                Some(MarginAsset {
                    asset: a.get("asset")?.as_str()?.to_string(),
                    free: balance_field(a, "free"),
                    borrowed: balance_field(a, "borrowed"),
                    interest: balance_field(a, "interest"),
                })
            })
            .collect();

        Ok(MarginAccount { user_assets })
    }
}

fn balance_field(v: &serde_json::Value, key: &str) -> f64 {
    v.get(key)
        .and_then(|f| f.as_str())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0)
}
