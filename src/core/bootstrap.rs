use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use super::error::EngineError;

/// Wait before retry number `attempt` (0-based): `base * 1.5^attempt`,
/// jittered by a factor in [0.9, 1.1] so restarting replicas don't stampede
/// the store in lockstep.
pub(crate) fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let jitter = rand::thread_rng().gen_range(0.9..=1.1);
    base.mul_f64(1.5_f64.powi(attempt as i32) * jitter)
}

/// Run `connect` until it succeeds, waiting with bounded exponential
/// backoff between failures, up to `max_attempts`. On exhaustion the last
/// error is returned; the caller decides whether to abort or continue in a
/// degraded mode. The dispatcher must not be started before this succeeds.
pub async fn connect_with_retry<T, F, Fut>(
    max_attempts: u32,
    base_delay: Duration,
    mut connect: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut last_error = EngineError::StoreUnavailable("no connection attempts made".to_string());

    for attempt in 0..max_attempts {
        match connect().await {
            Ok(conn) => {
                if attempt > 0 {
                    info!("Store connection established after {} retries", attempt);
                }
                return Ok(conn);
            }
            Err(e) => {
                warn!(
                    "Store connection attempt {}/{} failed: {}",
                    attempt + 1,
                    max_attempts,
                    e
                );
                last_error = e;
                if attempt + 1 < max_attempts {
                    tokio::time::sleep(backoff_delay(base_delay, attempt)).await;
                }
            }
        }
    }

    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn returns_first_success_without_retrying() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = connect_with_retry(5, Duration::from_millis(1), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(42u32)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = connect_with_retry(5, Duration::from_millis(1), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(EngineError::StoreUnavailable("still booting".to_string()))
                } else {
                    Ok("ready")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ready");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> =
            connect_with_retry(3, Duration::from_millis(1), move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(EngineError::StoreUnavailable("down".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(EngineError::StoreUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_grows_strictly_across_attempts() {
        // The 1.5x growth dominates the +-10% jitter band, so consecutive
        // delays are strictly increasing even at the jitter extremes.
        let base = Duration::from_secs(1);
        let delays: Vec<Duration> = (0..6).map(|n| backoff_delay(base, n)).collect();
        for pair in delays.windows(2) {
            assert!(pair[1] > pair[0], "{:?} should exceed {:?}", pair[1], pair[0]);
        }
    }

    #[test]
    fn backoff_stays_within_jitter_bounds() {
        let base = Duration::from_secs(1);
        for attempt in 0..6 {
            let nominal = base.mul_f64(1.5_f64.powi(attempt as i32));
            let delay = backoff_delay(base, attempt);
            assert!(delay >= nominal.mul_f64(0.9));
            assert!(delay <= nominal.mul_f64(1.1));
        }
    }
}
