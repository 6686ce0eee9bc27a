//! Read-only logging of broker position notifications.
//!
//! Events are observed for diagnostics only. Nothing here feeds back into
//! cycle decisions, so ordering or dropped events cannot affect trimming.

use crate::exchange::PositionEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Spawn a task that logs events until shutdown or the channel closes.
pub fn spawn_event_logger(
    mut events: broadcast::Receiver<PositionEvent>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = events.recv() => match received {
                    Ok(event) => log_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Position event logger lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!("Position event logger stopped");
    })
}

fn log_event(event: &PositionEvent) {
    match event {
        PositionEvent::Opened(position) => info!(
            id = position.id,
            symbol = %position.symbol,
            direction = %position.direction,
            volume = position.volume,
            entry = %position.entry_price,
            "📥 [EVENT] Position opened"
        ),
        PositionEvent::Closed {
            id,
            symbol,
            volume,
            realized_profit,
        } => info!(
            id,
            %symbol,
            volume,
            realized = %realized_profit,
            "📤 [EVENT] Position closed"
        ),
        PositionEvent::Reduced {
            id,
            symbol,
            closed_volume,
            remaining_volume,
            realized_profit,
        } => info!(
            id,
            %symbol,
            closed_volume,
            remaining_volume,
            realized = %realized_profit,
            "✂️  [EVENT] Position reduced"
        ),
    }
}
