//! App runtime: fetch → decode → emit loop (hot path).
//!
//! Items are handled one at a time in dequeue order, so event order matches
//! queue order end to end. Fetch failures back off and reconnect; after
//! `RetryPolicy::max_attempts` consecutive failures the loop stops with
//! `ReconnectExhausted`. Decode failures become error-tagged events.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ConnectorConfig;
use crate::emit::{Event, EventSink};
use crate::errors::InputError;
use crate::ingest::Queue;
use crate::transform::decode::Decoder;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive fetch failures tolerated; one more is fatal.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &ConnectorConfig) -> Self {
        Self {
            max_attempts: cfg.reconnect_attempts,
            base_delay: cfg.reconnect_backoff,
            max_delay: MAX_BACKOFF,
        }
    }

    /// Exponential backoff for the zero-based `attempt`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: MAX_BACKOFF,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub fetched: u64,
    pub emitted: u64,
    pub decode_errors: u64,
    pub fetch_errors: u64,
    pub reconnects: u64,
}

/// Drive the loop until `cancel` fires or a fatal error occurs. The queue is
/// closed before returning either way.
pub async fn run<Q, D, S>(
    queue: &mut Q,
    decoder: &D,
    sink: &S,
    cancel: &CancellationToken,
    policy: RetryPolicy,
) -> Result<RunStats, InputError>
where
    Q: Queue,
    D: Decoder + ?Sized,
    S: EventSink + ?Sized,
{
    let mut stats = RunStats::default();
    let result = fetch_loop(queue, decoder, sink, cancel, policy, &mut stats).await;
    queue.close().await;

    match &result {
        Ok(()) => info!(
            fetched = stats.fetched,
            emitted = stats.emitted,
            decode_errors = stats.decode_errors,
            fetch_errors = stats.fetch_errors,
            reconnects = stats.reconnects,
            "input stopped"
        ),
        Err(e) => error!(error = %e, emitted = stats.emitted, "input stopped on fatal error"),
    }
    result.map(|()| stats)
}

async fn fetch_loop<Q, D, S>(
    queue: &mut Q,
    decoder: &D,
    sink: &S,
    cancel: &CancellationToken,
    policy: RetryPolicy,
    stats: &mut RunStats,
) -> Result<(), InputError>
where
    Q: Queue,
    D: Decoder + ?Sized,
    S: EventSink + ?Sized,
{
    let mut failures: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            debug!("cancellation observed; leaving fetch loop");
            return Ok(());
        }

        let items = match queue.fetch(cancel).await {
            Ok(items) => {
                failures = 0;
                items
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                stats.fetch_errors += 1;
                failures += 1;
                if failures > policy.max_attempts {
                    return Err(InputError::ReconnectExhausted {
                        attempts: policy.max_attempts,
                        last: e.to_string(),
                    });
                }

                let delay = policy.backoff(failures - 1);
                warn!(
                    error = %e,
                    attempt = failures,
                    backoff_ms = delay.as_millis() as u64,
                    "fetch failed; reconnecting"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(delay) => {}
                }
                match queue.reconnect().await {
                    Ok(()) => {
                        stats.reconnects += 1;
                        info!(attempt = failures, "reconnected");
                    }
                    Err(e) => warn!(error = %e, attempt = failures, "reconnect failed"),
                }
                continue;
            }
        };

        stats.fetched += items.len() as u64;
        // Claimed items are emitted even if cancellation fired meanwhile.
        for raw in items {
            let event = match decoder.decode(&raw) {
                Ok(fields) => Event::decoded(fields),
                Err(e) => {
                    stats.decode_errors += 1;
                    error!(
                        error = %e,
                        payload_len = raw.len(),
                        payload_hex = %hex::encode(&raw),
                        "failed to decode queue item"
                    );
                    let desc = match e {
                        InputError::Decode(msg) => msg,
                        other => other.to_string(),
                    };
                    Event::decode_failed(raw, desc)
                }
            };
            sink.emit(event).await?;
            stats.emitted += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        };
        assert_eq!(p.backoff(0), Duration::from_millis(100));
        assert_eq!(p.backoff(1), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(800));
        assert_eq!(p.backoff(4), Duration::from_millis(1000));
        assert_eq!(p.backoff(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn policy_follows_config() {
        let cfg = crate::config::InputConfig {
            reconnect_attempts: 2,
            reconnect_backoff: "50ms".into(),
            ..Default::default()
        }
        .validate()
        .unwrap();
        let p = RetryPolicy::from_config(&cfg);
        assert_eq!(p.max_attempts, 2);
        assert_eq!(p.base_delay, Duration::from_millis(50));
    }
}
