//! Money units.
//!
//! Every balance is a `u128` in atomic units: 1 USD = 1_000_000 units
//! (micro-dollars). Rates are integer basis points or parts-per-million, so
//! no float rounding ever touches a balance.

use crate::error::CoreError;

/// Balance / principal in atomic units
pub type Amount = u128;

/// Atomic units per USD
pub const UNITS_PER_USD: Amount = 1_000_000;

/// Atomic units per cent (used for 2-decimal rounding)
pub const UNITS_PER_CENT: Amount = UNITS_PER_USD / 100;

const BPS_DENOM: Amount = 10_000;
const PPM_DENOM: Amount = 1_000_000;

/// Whole dollars to atomic units
pub const fn usd(dollars: u64) -> Amount {
    dollars as Amount * UNITS_PER_USD
}

/// `amount * bps / 10_000`, floored
pub fn apply_bps(amount: Amount, bps: u32) -> Amount {
    amount.saturating_mul(bps as Amount) / BPS_DENOM
}

/// `amount * ppm / 1_000_000`, floored
pub fn apply_ppm(amount: Amount, ppm: u32) -> Amount {
    amount.saturating_mul(ppm as Amount) / PPM_DENOM
}

/// Round half-up to the nearest cent
pub fn round_to_cents(amount: Amount) -> Amount {
    let rem = amount % UNITS_PER_CENT;
    let floor = amount - rem;
    if rem * 2 >= UNITS_PER_CENT {
        floor + UNITS_PER_CENT
    } else {
        floor
    }
}

/// Parse a decimal USD string ("1000", "15.5", "0.002727") into atomic units.
/// At most 6 fractional digits are accepted.
pub fn parse_usd(input: &str) -> Result<Amount, CoreError> {
    let s = input.trim();
    let invalid = || CoreError::InvalidAmount(input.to_string());

    if s.is_empty() || s.starts_with('-') || s.starts_with('+') {
        return Err(invalid());
    }

    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };

    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if frac.len() > 6 {
        return Err(invalid());
    }

    let whole_units: Amount = if whole.is_empty() {
        0
    } else {
        whole.parse::<Amount>().map_err(|_| invalid())?
    };
    let frac_units: Amount = if frac.is_empty() {
        0
    } else {
        let padded = format!("{:0<6}", frac);
        padded.parse::<Amount>().map_err(|_| invalid())?
    };

    whole_units
        .checked_mul(UNITS_PER_USD)
        .and_then(|w| w.checked_add(frac_units))
        .ok_or_else(invalid)
}

/// Render atomic units as a decimal USD string. Keeps at least 2 fractional
/// digits and trims trailing zeros beyond that.
pub fn format_usd(amount: Amount) -> String {
    let whole = amount / UNITS_PER_USD;
    let frac = amount % UNITS_PER_USD;
    let mut frac_str = format!("{:06}", frac);
    while frac_str.len() > 2 && frac_str.ends_with('0') {
        frac_str.pop();
    }
    format!("{}.{}", whole, frac_str)
}

/// Positive and in whole cents
pub fn validate_amount(amount: Amount) -> Result<(), CoreError> {
    if amount == 0 {
        return Err(CoreError::InvalidAmount("must be greater than zero".into()));
    }
    if amount % UNITS_PER_CENT != 0 {
        return Err(CoreError::InvalidAmount(format!(
            "{} has sub-cent precision",
            format_usd(amount)
        )));
    }
    Ok(())
}

/// serde adapter that stores / renders an `Amount` as a decimal USD string
pub mod as_usd {
    use super::{format_usd, parse_usd, Amount};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_usd(*value))
    }

    /// Decimal strings or plain JSON numbers
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let raw = match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s,
            Raw::Number(n) => n.to_string(),
        };
        parse_usd(&raw).map_err(serde::de::Error::custom)
    }
}
