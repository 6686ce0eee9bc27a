//! Close execution with bounded linear-backoff retries.

use crate::config::TrimConfig;
use crate::exchange::{Broker, CloseOutcome, CloseRequest, CloseState};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Executes close requests one at a time against a broker.
///
/// Each request runs `Pending -> Attempting -> {Success | Retrying | Exhausted}`,
/// with `Retrying -> Attempting` after a backoff of `backoff_unit * attempts`.
/// Shutdown cancels a pending backoff and leaves the position as the last
/// successful operation left it.
pub struct CloseExecutor {
    max_retries: u32,
    backoff_unit: Duration,
    shutdown: CancellationToken,
}

/// Structured log record for a close that ran out of attempts.
#[derive(Debug, Serialize)]
struct ExhaustedCloseAlert<'a> {
    position_id: u64,
    volume: Option<u64>,
    description: &'a str,
    attempts: u32,
    last_error: Option<&'a str>,
}

impl CloseExecutor {
    /// Create an executor; `max_retries` is the total attempt budget.
    pub fn new(max_retries: u32, backoff_unit: Duration, shutdown: CancellationToken) -> Self {
        Self {
            max_retries: max_retries.max(1),
            backoff_unit,
            shutdown,
        }
    }

    /// Build from the trim configuration.
    pub fn from_config(config: &TrimConfig, shutdown: CancellationToken) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.retry_backoff_ms),
            shutdown,
        )
    }

    /// Wait applied after the `attempt`-th failure.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_unit * attempt
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Run `request` to a terminal state.
    pub async fn execute<B: Broker + ?Sized>(&self, broker: &B, request: &CloseRequest) -> CloseOutcome {
        let mut state = CloseState::Pending;
        let mut attempts: u32 = 0;
        let mut last_error: Option<String> = None;

        loop {
            state = match state {
                CloseState::Pending | CloseState::Retrying => {
                    if self.shutdown.is_cancelled() {
                        CloseState::Cancelled
                    } else {
                        CloseState::Attempting
                    }
                }
                CloseState::Attempting => {
                    let result = broker
                        .close_position(request.position_id, request.volume)
                        .await;
                    attempts += 1;

                    match result {
                        Ok(response) if response.success => CloseState::Success,
                        Ok(response) => {
                            let reason = response
                                .error
                                .unwrap_or_else(|| "Close rejected".to_string());
                            self.on_failure(request, attempts, reason, &mut last_error)
                                .await
                        }
                        Err(e) => {
                            self.on_failure(request, attempts, e.to_string(), &mut last_error)
                                .await
                        }
                    }
                }
                terminal => return self.finish(request, terminal, attempts, last_error),
            };
        }
    }

    /// Record a failed attempt and decide between retry and exhaustion.
    async fn on_failure(
        &self,
        request: &CloseRequest,
        attempts: u32,
        reason: String,
        last_error: &mut Option<String>,
    ) -> CloseState {
        warn!(
            position_id = request.position_id,
            attempt = attempts,
            max_retries = self.max_retries,
            error = %reason,
            "Close attempt failed"
        );
        *last_error = Some(reason);

        if attempts >= self.max_retries {
            return CloseState::Exhausted;
        }

        let delay = self.backoff_for(attempts);
        debug!(position_id = request.position_id, delay_ms = delay.as_millis() as u64, "Backing off before retry");

        tokio::select! {
            _ = self.shutdown.cancelled() => CloseState::Cancelled,
            _ = tokio::time::sleep(delay) => CloseState::Retrying,
        }
    }

    fn finish(
        &self,
        request: &CloseRequest,
        state: CloseState,
        attempts: u32,
        last_error: Option<String>,
    ) -> CloseOutcome {
        match state {
            CloseState::Success => {
                info!(
                    position_id = request.position_id,
                    volume = ?request.volume,
                    partial = request.is_partial(),
                    attempts,
                    "✅ {}",
                    request.description
                );
            }
            CloseState::Exhausted => {
                let alert = ExhaustedCloseAlert {
                    position_id: request.position_id,
                    volume: request.volume,
                    description: &request.description,
                    attempts,
                    last_error: last_error.as_deref(),
                };
                let json = serde_json::to_string(&alert).unwrap_or_default();
                error!(target: "trim_alert", "CLOSE_EXHAUSTED: {}", json);
            }
            _ => {
                warn!(
                    position_id = request.position_id,
                    attempts,
                    "Close cancelled by shutdown: {}",
                    request.description
                );
            }
        }

        let success = state == CloseState::Success;
        CloseOutcome {
            success,
            error: match state {
                CloseState::Success => None,
                CloseState::Cancelled => Some(
                    last_error
                        .map(|e| format!("Cancelled after error: {}", e))
                        .unwrap_or_else(|| "Cancelled".to_string()),
                ),
                _ => last_error,
            },
            attempts,
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{CloseResponse, MockBroker};
    use anyhow::anyhow;
    use tokio::time::Instant;

    fn executor(max_retries: u32, token: CancellationToken) -> CloseExecutor {
        CloseExecutor::new(max_retries, Duration::from_secs(1), token)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let mut broker = MockBroker::new();
        broker
            .expect_close_position()
            .times(1)
            .returning(|_, _| Ok(CloseResponse::ok()));

        let start = Instant::now();
        let outcome = executor(3, CancellationToken::new())
            .execute(&broker, &CloseRequest::full(1, "winner"))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.state, CloseState::Success);
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_linear_backoff_then_succeeds() {
        let mut broker = MockBroker::new();
        let mut calls = 0;
        broker
            .expect_close_position()
            .times(3)
            .returning(move |_, volume| {
                assert_eq!(volume, Some(75_000));
                calls += 1;
                match calls {
                    1 => Ok(CloseResponse::rejected("Requote")),
                    2 => Err(anyhow!("connection reset")),
                    _ => Ok(CloseResponse::ok()),
                }
            });

        let start = Instant::now();
        let outcome = executor(3, CancellationToken::new())
            .execute(&broker, &CloseRequest::partial(2, 75_000, "trim"))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.error, None);
        // 1s after the first failure, 2s after the second
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_millis(3_100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_retries() {
        let mut broker = MockBroker::new();
        broker
            .expect_close_position()
            .times(3)
            .returning(|_, _| Ok(CloseResponse::rejected("Market closed")));

        let start = Instant::now();
        let outcome = executor(3, CancellationToken::new())
            .execute(&broker, &CloseRequest::full(5, "winner"))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.state, CloseState::Exhausted);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.error.as_deref(), Some("Market closed"));
        // No wait after the final attempt
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_millis(3_100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_budget() {
        let mut broker = MockBroker::new();
        broker
            .expect_close_position()
            .times(1)
            .returning(|_, _| Err(anyhow!("timeout")));

        let outcome = executor(1, CancellationToken::new())
            .execute(&broker, &CloseRequest::full(5, "winner"))
            .await;

        assert_eq!(outcome.state, CloseState::Exhausted);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_backoff() {
        let mut broker = MockBroker::new();
        broker
            .expect_close_position()
            .times(1)
            .returning(|_, _| Ok(CloseResponse::rejected("Requote")));

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let outcome = executor(5, token)
            .execute(&broker, &CloseRequest::full(3, "winner"))
            .await;

        assert_eq!(outcome.state, CloseState::Cancelled);
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.error.unwrap().contains("Requote"));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_no_attempt_after_shutdown() {
        let mut broker = MockBroker::new();
        broker.expect_close_position().never();

        let token = CancellationToken::new();
        token.cancel();

        let outcome = executor(3, token)
            .execute(&broker, &CloseRequest::full(3, "winner"))
            .await;

        assert_eq!(outcome.state, CloseState::Cancelled);
        assert_eq!(outcome.attempts, 0);
        assert_eq!(outcome.error.as_deref(), Some("Cancelled"));
    }

    #[test]
    fn test_backoff_is_linear() {
        let executor = executor(3, CancellationToken::new());
        assert_eq!(executor.backoff_for(1), Duration::from_secs(1));
        assert_eq!(executor.backoff_for(2), Duration::from_secs(2));
        assert_eq!(executor.backoff_for(3), Duration::from_secs(3));
    }
}
