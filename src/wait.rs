//! # Consistency Waiter
//!
//! Writes are ordered by the ledger but become readable through an eventually
//! consistent view (typically a mirror). [`wait_for`] polls the read side
//! until a condition holds or a timeout expires.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep, timeout_at};
use tracing::debug;

use crate::error::Err;
use crate::tracerr;

/// Polling configuration.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct WaitOptions {
    /// Total time to wait, in milliseconds.
    pub timeout_ms: u64,

    /// Delay between polls, in milliseconds.
    pub interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            interval_ms: 1_000,
        }
    }
}

impl WaitOptions {
    /// Wait at most `timeout_ms`, polling at the default interval.
    #[must_use]
    pub fn timeout(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            ..Self::default()
        }
    }
}

/// Poll `fetch` until `check` accepts its result.
///
/// Fetch errors count as "not yet": the read side may lag the write.
///
/// # Errors
///
/// Will fail with `Timeout` if `check` has not passed when the timeout expires.
pub async fn wait_for<T, F, Fut, C>(mut fetch: F, check: C, options: &WaitOptions) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<T>>,
    C: Fn(&T) -> bool,
{
    let deadline = Instant::now() + Duration::from_millis(options.timeout_ms);
    let interval = Duration::from_millis(options.interval_ms);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match timeout_at(deadline, fetch()).await {
            Ok(Ok(value)) if check(&value) => return Ok(value),
            Ok(Ok(_)) => debug!("wait attempt {attempt}: condition not met"),
            Ok(Err(e)) => debug!("wait attempt {attempt}: {e}"),
            Err(_) => break,
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        sleep(interval.min(deadline - now)).await;
    }

    tracerr!(Err::Timeout, "condition not met after {}ms ({attempt} attempts)", options.timeout_ms)
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::Error;

    #[tokio::test(start_paused = true)]
    async fn eventually_visible() {
        let calls = AtomicU32::new(0);
        let value = wait_for(
            || async { Ok::<_, Error>(calls.fetch_add(1, Ordering::SeqCst) + 1) },
            |n| *n >= 3,
            &WaitOptions::default(),
        )
        .await
        .expect("should succeed");
        assert_eq!(value, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let value = wait_for(
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(Error::from(Err::NotFound));
                }
                Ok("ready")
            },
            |_| true,
            &WaitOptions::default(),
        )
        .await
        .expect("should succeed");
        assert_eq!(value, "ready");
    }

    #[tokio::test(start_paused = true)]
    async fn times_out() {
        let start = Instant::now();
        let options = WaitOptions {
            timeout_ms: 3_000,
            interval_ms: 1_000,
        };
        let err = wait_for(|| async { Ok::<_, Error>(false) }, |ready| *ready, &options)
            .await
            .expect_err("should time out");
        assert!(err.is(Err::Timeout));
        assert!(start.elapsed() >= Duration::from_millis(3_000));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_fetch_times_out() {
        let err = wait_for(
            || async {
                sleep(Duration::from_secs(60)).await;
                Ok::<_, Error>(())
            },
            |()| true,
            &WaitOptions::timeout(500),
        )
        .await
        .expect_err("should time out");
        assert!(err.is(Err::Timeout));
    }

    #[test]
    fn options_from_config() {
        let options: WaitOptions = serde_json::from_str(r#"{"timeoutMs": 500}"#).unwrap();
        assert_eq!(options, WaitOptions { timeout_ms: 500, interval_ms: 1_000 });
    }
}
