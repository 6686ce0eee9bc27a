//! Position and close types shared between the broker and the trim engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// The opposing direction.
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "Long"),
            Direction::Short => write!(f, "Short"),
        }
    }
}

/// Snapshot of an open position as reported by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Broker-assigned identifier, stable for the position's lifetime
    pub id: u64,
    pub symbol: String,
    pub direction: Direction,
    /// Volume in base units (100,000 units = 1 lot)
    pub volume: u64,
    pub entry_price: Decimal,
    /// Net profit in account currency, inclusive of costs
    pub net_profit: Decimal,
    /// Signed distance from entry in pips
    pub pips: Decimal,
}

impl Position {
    pub fn is_profitable(&self) -> bool {
        self.net_profit > Decimal::ZERO
    }
}

/// Request to close all or part of a position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloseRequest {
    pub position_id: u64,
    /// Volume to close; `None` closes the entire position
    pub volume: Option<u64>,
    /// Human-readable context for logs
    pub description: String,
}

impl CloseRequest {
    /// Close the whole position.
    pub fn full(position_id: u64, description: impl Into<String>) -> Self {
        Self {
            position_id,
            volume: None,
            description: description.into(),
        }
    }

    /// Close `volume` units of the position.
    pub fn partial(position_id: u64, volume: u64, description: impl Into<String>) -> Self {
        Self {
            position_id,
            volume: Some(volume),
            description: description.into(),
        }
    }

    pub fn is_partial(&self) -> bool {
        self.volume.is_some()
    }
}

/// Result of a single broker close call.
///
/// A transport fault is reported as an `Err` from the broker instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloseResponse {
    pub success: bool,
    pub error: Option<String>,
}

impl CloseResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(reason.into()),
        }
    }
}

/// Terminal state reached by the close executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CloseState {
    Pending,
    Attempting,
    Retrying,
    Success,
    Exhausted,
    Cancelled,
}

/// Outcome of executing one [`CloseRequest`] with retries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloseOutcome {
    pub success: bool,
    pub error: Option<String>,
    /// Broker calls issued for this request
    pub attempts: u32,
    pub state: CloseState,
}

/// Push-style notification from the broker. Diagnostic only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PositionEvent {
    Opened(Position),
    Closed {
        id: u64,
        symbol: String,
        volume: u64,
        realized_profit: Decimal,
    },
    Reduced {
        id: u64,
        symbol: String,
        closed_volume: u64,
        remaining_volume: u64,
        realized_profit: Decimal,
    },
}
