//! Decimal arithmetic utilities for lot and volume calculations.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Base units in one standard lot.
pub const UNITS_PER_LOT: u64 = 100_000;

/// Smallest tradeable volume (0.01 lot).
pub const MIN_VOLUME_UNITS: u64 = 1_000;

/// Lot granularity in decimal places (0.01 lot steps).
pub const LOT_DECIMALS: u32 = 2;

/// Round half away from zero to `decimals` places.
pub fn round_half_away(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a volume in base units to lots.
pub fn units_to_lots(units: u64) -> Decimal {
    Decimal::from(units) / Decimal::from(UNITS_PER_LOT)
}

/// Convert lots back to whole base units. Negative input yields zero.
pub fn lots_to_units(lots: Decimal) -> u64 {
    round_half_away(lots * Decimal::from(UNITS_PER_LOT), 0)
        .to_u64()
        .unwrap_or(0)
}

/// Safe division that returns zero if divisor is zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

/// Express `part` as a percentage of `whole`.
pub fn percentage_of(part: Decimal, whole: Decimal) -> Decimal {
    safe_div(part, whole) * dec!(100)
}
