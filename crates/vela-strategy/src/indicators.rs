//! Technical indicators — pure functions over candle history.
//!
//! All inputs and outputs are **most-recent-first**: index 0 is the newest
//! value, matching the candle window delivered by the feed. Series shorter
//! than an indicator's warm-up come back empty; callers guard on length.

use serde::{Deserialize, Serialize};
use vela_core::Candle;

// ---------------------------------------------------------------------------
// Moving averages
// ---------------------------------------------------------------------------

/// Simple moving average over `period` values.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(values.len() - period + 1);
    for window in values.windows(period) {
        out.push(window.iter().sum::<f64>() / period as f64);
    }
    out
}

/// Exponential moving average, full-length (seeded with the oldest value).
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.is_empty() {
        return Vec::new();
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut chron: Vec<f64> = values.iter().rev().copied().collect();

    let mut prev = chron[0];
    for v in chron.iter_mut() {
        prev = alpha * *v + (1.0 - alpha) * prev;
        *v = prev;
    }

    chron.reverse();
    chron
}

// ---------------------------------------------------------------------------
// MACD
// ---------------------------------------------------------------------------

/// One MACD sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MacdPoint {
    pub macd: f64,
    pub signal: f64,
    pub hist: f64,
}

/// MACD series: `EMA(fast) − EMA(slow)`, a signal EMA over the MACD line,
/// and their difference as the histogram.
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal_period: usize) -> Vec<MacdPoint> {
    if closes.len() < slow {
        return Vec::new();
    }

    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);

    let line: Vec<f64> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| f - s)
        .collect();
    let signal = ema(&line, signal_period);

    line.iter()
        .zip(signal.iter())
        .map(|(&m, &s)| MacdPoint {
            macd: m,
            signal: s,
            hist: m - s,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// RSI
// ---------------------------------------------------------------------------

/// Relative Strength Index over `period` (Wilder smoothing).
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() <= period {
        return Vec::new();
    }

    let chron: Vec<f64> = closes.iter().rev().copied().collect();
    let mut gains = 0.0;
    let mut losses = 0.0;
    for w in chron[..=period].windows(2) {
        let delta = w[1] - w[0];
        if delta >= 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }

    let mut avg_gain = gains / period as f64;
    let mut avg_loss = losses / period as f64;
    let mut out = Vec::with_capacity(chron.len() - period);
    out.push(rsi_value(avg_gain, avg_loss));

    for w in chron[period..].windows(2) {
        let delta = w[1] - w[0];
        let (gain, loss) = if delta >= 0.0 { (delta, 0.0) } else { (0.0, -delta) };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        out.push(rsi_value(avg_gain, avg_loss));
    }

    out.reverse();
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
}

// ---------------------------------------------------------------------------
// MFI
// ---------------------------------------------------------------------------

/// Money Flow Index over `period` — a volume-weighted RSI of the typical
/// price.
pub fn mfi(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.len() <= period {
        return Vec::new();
    }

    let chron: Vec<&Candle> = candles.iter().rev().collect();
    let typical: Vec<f64> = chron
        .iter()
        .map(|c| (c.high + c.low + c.close) / 3.0)
        .collect();

    // Signed raw money flow per bar (positive when typical price rose).
    let mut flows = Vec::with_capacity(typical.len());
    flows.push(0.0);
    for i in 1..typical.len() {
        let raw = typical[i] * chron[i].volume;
        flows.push(if typical[i] >= typical[i - 1] { raw } else { -raw });
    }

    let mut out = Vec::with_capacity(chron.len() - period);
    for end in period..chron.len() {
        let window = &flows[end + 1 - period..=end];
        let positive: f64 = window.iter().filter(|&&f| f > 0.0).sum();
        let negative: f64 = -window.iter().filter(|&&f| f < 0.0).sum::<f64>();

        if negative == 0.0 {
            out.push(100.0);
        } else {
            out.push(100.0 - 100.0 / (1.0 + positive / negative));
        }
    }

    out.reverse();
    out
}

// ---------------------------------------------------------------------------
// IndicatorSet — the per-tick bundle
// ---------------------------------------------------------------------------

/// Named indicator series recomputed by the trader every tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub macd: Vec<MacdPoint>,
    pub rsi: Vec<f64>,
    pub mfi: Vec<f64>,
    pub ma_50: Vec<f64>,
}

impl IndicatorSet {
    /// Compute the default indicator bundle from a most-recent-first candle
    /// window.
    pub fn compute(candles: &[Candle]) -> Self {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        Self {
            macd: macd(&closes, 12, 26, 9),
            rsi: rsi(&closes, 14),
            mfi: mfi(candles, 14),
            ma_50: sma(&closes, 50),
        }
    }
}
