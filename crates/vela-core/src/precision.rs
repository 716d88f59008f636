//! Exchange quantization rules — lot-size truncation and tick-size rounding.
//!
//! Quantities are **truncated** (never rounded) to the symbol's lot-size
//! digits, so a computed order can never exceed the wallet balance it was
//! derived from. Prices are rounded to the tick-size digits as the exchange
//! expects.

/// Truncate the fractional part of a quantity to `digits` decimal places.
///
/// `1.23456` with 3 digits becomes `1.234` (not `1.235`). With 0 digits only
/// the integer part survives.
pub fn truncate_quantity(quantity: f64, digits: u32) -> f64 {
    let s = format!("{quantity:.12}");
    let (int_part, frac_part) = match s.split_once('.') {
        Some(parts) => parts,
        None => (s.as_str(), ""),
    };

    if digits == 0 {
        return int_part.parse().unwrap_or(0.0);
    }

    let frac = &frac_part[..frac_part.len().min(digits as usize)];
    format!("{int_part}.{frac}").parse().unwrap_or(0.0)
}

/// Round a price to `digits` decimal places.
pub fn round_price(price: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (price * factor).round() / factor
}

/// Number of meaningful decimal places in an exchange filter step string.
///
/// `"0.00100000"` (lot step) yields 3; `"1.00000000"` yields 0.
pub fn digits_from_step(step: &str) -> u32 {
    let Some((int_part, frac_part)) = step.split_once('.') else {
        return 0;
    };

    // A step of 1 or more allows no fractional digits.
    if int_part.trim_start_matches('0').parse::<u64>().unwrap_or(0) >= 1 {
        return 0;
    }

    match frac_part.find(|c| c != '0') {
        Some(idx) => idx as u32 + 1,
        None => 0,
    }
}
