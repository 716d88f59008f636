//! Append-only order log — one line per completed round trip.
//!
//! Format:
//!
//! ```text
//! BuyTime, BuyPrice, BuyQuantity, BuyType, SellTime, SellPrice, SellQuantity, SellType, Outcome
//! ```

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::DateTime;
use vela_core::TradeRecord;

/// Per-market audit log writer.
pub struct OrderLog {
    path: PathBuf,
}

impl OrderLog {
    /// Log file for one symbol under `dir` (e.g. `logs/orders_BTCUSDT.log`).
    pub fn new(dir: impl AsRef<Path>, symbol: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("orders_{symbol}.log")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one completed round trip.
    pub fn append_round_trip(
        &self,
        buy: &TradeRecord,
        sell: &TradeRecord,
        outcome: f64,
    ) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating log dir {}", parent.display()))?;
        }

        let line = format!(
            "{}, {:.8}, {}, {}, {}, {:.8}, {}, {}, {:.8}\n",
            format_time(buy.time_ms),
            buy.price,
            buy.quantity,
            buy.kind,
            format_time(sell.time_ms),
            sell.price,
            sell.quantity,
            sell.kind,
            outcome,
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening order log {}", self.path.display()))?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

fn format_time(ms: u64) -> String {
    DateTime::from_timestamp_millis(ms as i64)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}
