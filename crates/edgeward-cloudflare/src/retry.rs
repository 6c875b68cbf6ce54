//! Retry with exponential backoff for Cloudflare API calls.
//!
//! Only transport failures (connection errors, timeouts) are retried. Any
//! HTTP response, including 4xx and 5xx, is returned to the caller as is.

use std::time::Duration;

/// Base delay between retries (doubles each attempt: 200ms, 400ms, 800ms).
const BASE_DELAY_MS: u64 = 200;

/// Upper bound on a single backoff sleep.
const MAX_DELAY_MS: u64 = 30_000;

/// Sleep before retry number `attempt + 1`.
fn backoff_delay(attempt: u32) -> Duration {
    let ms = 2u64.saturating_pow(attempt).saturating_mul(BASE_DELAY_MS);
    Duration::from_millis(ms.min(MAX_DELAY_MS))
}

/// Send a request, retrying transport failures up to `max_retries` times.
///
/// The closure `f` is called at most `max_retries + 1` times.
pub(crate) async fn retry_send<F, Fut>(max_retries: u32, f: F) -> Result<reqwest::Response, reqwest::Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    for attempt in 0..max_retries {
        match f().await {
            Ok(resp) => return Ok(resp),
            Err(e) => {
                let delay = backoff_delay(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_retries,
                    "Cloudflare request failed, retrying in {delay:?}: {e}"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
    f().await
}
