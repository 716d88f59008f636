//! Traded-pair utilities — base/quote asset bookkeeping and symbol formats.

use serde::{Deserialize, Serialize};

/// The two assets of a traded market.
///
/// The exchange symbol is the concatenation `BASEQUOTE` (e.g. `BTC` + `USDT`
/// = `BTCUSDT`); logs use the `QUOTE-BASE` display form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketPair {
    pub base_asset: String,
    pub quote_asset: String,
}

impl MarketPair {
    pub fn new(base_asset: impl Into<String>, quote_asset: impl Into<String>) -> Self {
        Self {
            base_asset: base_asset.into(),
            quote_asset: quote_asset.into(),
        }
    }

    /// Exchange symbol, e.g. `"BTCUSDT"`.
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base_asset, self.quote_asset)
    }

    /// Human-readable pair used in log lines, e.g. `"USDT-BTC"`.
    pub fn display(&self) -> String {
        format!("{}-{}", self.quote_asset, self.base_asset)
    }
}

impl std::fmt::Display for MarketPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_concat() {
        let pair = MarketPair::new("BTC", "USDT");
        assert_eq!(pair.symbol(), "BTCUSDT");
        assert_eq!(pair.display(), "USDT-BTC");
    }
}
