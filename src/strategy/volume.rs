//! Partial-close sizing for losing positions.
//!
//! Volumes are converted to lots, scaled by the trim fraction and rounded to
//! the 0.01 lot grid (half away from zero). Anything that would leave an
//! untradeable fragment is upgraded to a full close.

use crate::exchange::Position;
use crate::utils::decimal::{
    lots_to_units, round_half_away, units_to_lots, LOT_DECIMALS, MIN_VOLUME_UNITS,
};
use rust_decimal::Decimal;
use serde::Serialize;

/// Volume to close for a trimmed position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrimVolume {
    /// Close the whole position (carries its full volume)
    Full(u64),
    /// Close this many units and leave the rest open
    Partial(u64),
}

impl TrimVolume {
    pub fn units(&self) -> u64 {
        match self {
            TrimVolume::Full(units) | TrimVolume::Partial(units) => *units,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, TrimVolume::Full(_))
    }
}

/// Compute how much of `position` to close for `trim_fraction`.
///
/// Never returns more than the position's volume.
pub fn trim_volume(position: &Position, trim_fraction: Decimal) -> TrimVolume {
    let volume = position.volume;
    let target_lots = round_half_away(units_to_lots(volume) * trim_fraction, LOT_DECIMALS);
    let volume_to_close = lots_to_units(target_lots);

    if volume_to_close >= volume
        || volume_to_close < MIN_VOLUME_UNITS
        || volume - volume_to_close < MIN_VOLUME_UNITS
    {
        return TrimVolume::Full(volume);
    }

    TrimVolume::Partial(volume_to_close)
}
