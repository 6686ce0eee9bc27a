//! Cycle counters and rate-limited status logging.

use crate::exchange::CloseState;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared across cycles.
#[derive(Debug, Default)]
pub struct CycleStats {
    cycles_run: AtomicU64,
    cycles_skipped: AtomicU64,
    cycle_errors: AtomicU64,
    trims_triggered: AtomicU64,
    closes_succeeded: AtomicU64,
    closes_exhausted: AtomicU64,
    closes_cancelled: AtomicU64,
}

/// Point-in-time copy of [`CycleStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub cycles_run: u64,
    pub cycles_skipped: u64,
    pub cycle_errors: u64,
    pub trims_triggered: u64,
    pub closes_succeeded: u64,
    pub closes_exhausted: u64,
    pub closes_cancelled: u64,
}

impl CycleStats {
    pub fn record_cycle(&self) {
        self.cycles_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.cycles_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.cycle_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_trim(&self) {
        self.trims_triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_close(&self, state: CloseState) {
        let counter = match state {
            CloseState::Success => &self.closes_succeeded,
            CloseState::Exhausted => &self.closes_exhausted,
            CloseState::Cancelled => &self.closes_cancelled,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles_run: self.cycles_run.load(Ordering::Relaxed),
            cycles_skipped: self.cycles_skipped.load(Ordering::Relaxed),
            cycle_errors: self.cycle_errors.load(Ordering::Relaxed),
            trims_triggered: self.trims_triggered.load(Ordering::Relaxed),
            closes_succeeded: self.closes_succeeded.load(Ordering::Relaxed),
            closes_exhausted: self.closes_exhausted.load(Ordering::Relaxed),
            closes_cancelled: self.closes_cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Allows one status line per interval. Advisory only.
#[derive(Debug)]
pub struct StatusLogGate {
    interval: Duration,
    last_logged: Option<DateTime<Utc>>,
}

impl StatusLogGate {
    pub fn new(interval_secs: u64) -> Self {
        Self {
            interval: Duration::seconds(interval_secs as i64),
            last_logged: None,
        }
    }

    /// Returns true and records `now` if the interval has elapsed.
    pub fn should_log(&mut self, now: DateTime<Utc>) -> bool {
        let due = match self.last_logged {
            None => true,
            Some(last) => now - last >= self.interval,
        };
        if due {
            self.last_logged = Some(now);
        }
        due
    }
}
