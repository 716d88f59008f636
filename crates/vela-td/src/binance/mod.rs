//! Binance order gateway.
//!
//! Implements the [`Gateway`](crate::Gateway) trait over signed REST:
//!
//! | Operation        | Method | Path (spot / margin)                              |
//! |------------------|--------|---------------------------------------------------|
//! | Place order      | POST   | `/api/v3/order` / `/sapi/v1/margin/order`         |
//! | Place OCO        | POST   | `/api/v3/order/oco`                               |
//! | Cancel order     | DELETE | `/api/v3/order` / `/sapi/v1/margin/order`         |
//! | Cancel OCO       | DELETE | `/api/v3/orderList`                               |
//! | Borrow / repay   | POST   | `/sapi/v1/margin/loan` / `/sapi/v1/margin/repay`  |
//! | Account balance  | GET    | `/api/v3/account`                                 |
//! | Margin account   | GET    | `/sapi/v1/margin/account`                         |
//! | Exchange info    | GET    | `/api/v3/exchangeInfo`                            |
//!
//! Transient transport failures and throttling are retried here with a fixed
//! backoff; business rejections are mapped to typed [`GatewayError`]s.

pub mod auth;
mod rest;

pub use rest::BinanceGateway;
