//! Attempt classification, wait computation, and the retry loop.
//!
//! One logical GET is a sequence of attempts. Each attempt's HTTP response
//! (or transport error) is classified into a terminal or retryable outcome;
//! retryable outcomes compute a wait from server-provided pacing headers when
//! available, falling back to exponential backoff with jitter.
//!
//! This layer never fails across its boundary for ordinary network/HTTP
//! conditions: exhausted retries surface the last transient result, transport
//! errors surface as status 0 with the error text as the body.

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::warn;

use crate::fetch::FetchResult;
use crate::jitter::JitterSource;
use crate::policy::RetryPolicy;
use crate::store::{CacheStore, now_epoch};
use crate::telemetry;

/// Hard ceiling on any single wait, in seconds. Applies to all wait paths,
/// independent of `max_backoff` — a server asking for an hour gets 5 minutes.
const WAIT_CEILING_SECS: f64 = 300.0;

/// Classification of a single attempt.
#[derive(Debug)]
enum AttemptOutcome {
    /// Transport failure (connect/DNS/timeout). Always retryable; no pacing
    /// information available.
    Error(String),
    /// HTTP 200. Terminal.
    Success { body: Value },
    /// Rate-limited or transient server condition. Retryable with
    /// server-provided or computed pacing.
    Retry {
        status: u16,
        retry_after: Option<f64>,
        reset_epoch: Option<f64>,
        text: String,
    },
    /// Any other non-200 status. Terminal, returned without retry.
    Fail { body: Value, status: u16 },
}

/// Pacing hints parsed from rate-limit response headers.
#[derive(Debug, Default, PartialEq)]
struct RateHints {
    retry_after: Option<f64>,
    remaining: Option<i64>,
    reset_epoch: Option<f64>,
}

/// Parse a `Retry-After` value: plain seconds, or an HTTP-date converted to
/// non-negative seconds from now. Garbage parses as absent.
fn parse_retry_after(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(secs) = raw.parse::<f64>() {
        return Some(secs.max(0.0));
    }
    let date = DateTime::parse_from_rfc2822(raw).ok()?;
    let delta = (date.with_timezone(&Utc) - Utc::now()).num_milliseconds();
    Some(delta.max(0) as f64 / 1000.0)
}

/// Extract pacing hints from response headers. Any parse failure is treated
/// as the header being absent — never fatal.
fn parse_rate_hints(headers: &HeaderMap) -> RateHints {
    let get = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    RateHints {
        retry_after: get("retry-after").and_then(parse_retry_after),
        remaining: get("x-ratelimit-remaining").and_then(|v| v.trim().parse().ok()),
        reset_epoch: get("x-ratelimit-reset").and_then(|v| v.trim().parse().ok()),
    }
}

/// A response is retryable when the status itself says so (429/503), when the
/// server sent an explicit `Retry-After`, or when the advertised rate-limit
/// quota is depleted.
fn should_retry(status: u16, hints: &RateHints) -> bool {
    matches!(status, 429 | 503)
        || hints.retry_after.is_some()
        || hints.remaining.is_some_and(|r| r <= 0)
}

/// Compute the wait before the next attempt, in priority order:
/// `Retry-After`, then the rate-limit reset epoch, then the current
/// exponential backoff value. Each path adds `uniform(0, jitter)` and is
/// capped at [`WAIT_CEILING_SECS`].
fn compute_wait(
    retry_after: Option<f64>,
    reset_epoch: Option<f64>,
    backoff: f64,
    jitter_upper: f64,
    jitter: &dyn JitterSource,
) -> f64 {
    let base = if let Some(ra) = retry_after {
        ra
    } else if let Some(reset) = reset_epoch.filter(|&r| r > 0.0) {
        (reset - now_epoch()).max(0.0)
    } else {
        backoff
    };
    (base.max(0.0) + jitter.sample(jitter_upper)).min(WAIT_CEILING_SECS)
}

/// Body parsing: JSON preferred, raw text fallback.
async fn read_body(resp: reqwest::Response) -> Value {
    let text = resp.text().await.unwrap_or_default();
    serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text))
}

/// Perform and classify a single attempt.
async fn attempt_once(
    client: &reqwest::Client,
    url: &str,
    headers: &HeaderMap,
    query: &[(String, String)],
) -> AttemptOutcome {
    let request = client.get(url).headers(headers.clone()).query(query);
    let resp = match request.send().await {
        Ok(resp) => resp,
        Err(e) => return AttemptOutcome::Error(e.to_string()),
    };
    let status = resp.status().as_u16();
    let hints = parse_rate_hints(resp.headers());
    if status == 200 {
        return AttemptOutcome::Success {
            body: read_body(resp).await,
        };
    }
    if should_retry(status, &hints) {
        return AttemptOutcome::Retry {
            status,
            retry_after: hints.retry_after,
            reset_epoch: hints.reset_epoch,
            text: resp.text().await.unwrap_or_default(),
        };
    }
    AttemptOutcome::Fail {
        body: read_body(resp).await,
        status,
    }
}

/// Everything one logical GET needs, borrowed from the orchestrator.
pub(crate) struct RetryRequest<'a> {
    pub client: &'a reqwest::Client,
    pub url: &'a str,
    pub headers: &'a HeaderMap,
    pub query: &'a [(String, String)],
    pub cache: Option<&'a CacheStore>,
    pub cache_key: Option<&'a str>,
    pub policy: &'a RetryPolicy,
    pub jitter: &'a dyn JitterSource,
}

/// Execute one logical GET with retries.
///
/// Terminates immediately on success or a non-retryable failure. Exhausting
/// `max_retries` attempts returns the last transient result rather than an
/// error; callers must treat a non-200 status as the final word. On success
/// with a cache and key supplied, the result is written through to the store
/// before returning.
pub(crate) async fn execute(req: RetryRequest<'_>) -> FetchResult {
    let jitter_upper = req.policy.jitter();
    let mut backoff = req.policy.backoff_base;
    let mut last = FetchResult {
        response: Value::Null,
        status: 0,
        timestamp: now_epoch(),
    };

    for attempt in 0..req.policy.max_retries {
        let outcome = attempt_once(req.client, req.url, req.headers, req.query).await;
        match outcome {
            AttemptOutcome::Success { body } => {
                metrics::counter!(telemetry::REQUESTS_TOTAL, "outcome" => "success").increment(1);
                if let (Some(cache), Some(key)) = (req.cache, req.cache_key) {
                    if let Err(e) = cache.set(key, &body, 200) {
                        warn!(key, error = %e, "cache write-through failed");
                    }
                }
                return FetchResult {
                    response: body,
                    status: 200,
                    timestamp: now_epoch(),
                };
            }
            AttemptOutcome::Fail { body, status } => {
                metrics::counter!(telemetry::REQUESTS_TOTAL, "outcome" => "fail").increment(1);
                return FetchResult {
                    response: body,
                    status,
                    timestamp: now_epoch(),
                };
            }
            AttemptOutcome::Retry {
                status,
                retry_after,
                reset_epoch,
                text,
            } => {
                metrics::counter!(telemetry::REQUESTS_TOTAL, "outcome" => "retry").increment(1);
                metrics::counter!(telemetry::RETRIES_TOTAL).increment(1);
                let wait = compute_wait(retry_after, reset_epoch, backoff, jitter_upper, req.jitter);
                backoff = (backoff * 2.0).min(req.policy.max_backoff);
                last = FetchResult {
                    response: Value::String(text),
                    status,
                    timestamp: now_epoch(),
                };
                if attempt + 1 < req.policy.max_retries {
                    warn!(
                        url = req.url,
                        status,
                        attempt = attempt + 1,
                        max_retries = req.policy.max_retries,
                        wait_secs = wait,
                        "rate limited, backing off"
                    );
                    sleep_secs(wait).await;
                }
            }
            AttemptOutcome::Error(message) => {
                metrics::counter!(telemetry::REQUESTS_TOTAL, "outcome" => "error").increment(1);
                metrics::counter!(telemetry::RETRIES_TOTAL).increment(1);
                let wait = compute_wait(None, None, backoff, jitter_upper, req.jitter);
                backoff = (backoff * 2.0).min(req.policy.max_backoff);
                if attempt + 1 < req.policy.max_retries {
                    warn!(
                        url = req.url,
                        error = message.as_str(),
                        attempt = attempt + 1,
                        max_retries = req.policy.max_retries,
                        wait_secs = wait,
                        "transport error, backing off"
                    );
                }
                last = FetchResult {
                    response: Value::String(message),
                    status: 0,
                    timestamp: now_epoch(),
                };
                if attempt + 1 < req.policy.max_retries {
                    sleep_secs(wait).await;
                }
            }
        }
    }
    last
}

async fn sleep_secs(secs: f64) {
    if secs > 0.0 {
        tokio::time::sleep(std::time::Duration::from_secs_f64(secs)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jitter::NoJitter;
    use reqwest::header::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn retry_after_plain_seconds() {
        assert_eq!(parse_retry_after("2"), Some(2.0));
        assert_eq!(parse_retry_after("1.5"), Some(1.5));
        assert_eq!(parse_retry_after(" 3 "), Some(3.0));
    }

    #[test]
    fn retry_after_negative_number_clamps_to_zero() {
        assert_eq!(parse_retry_after("-5"), Some(0.0));
    }

    #[test]
    fn retry_after_http_date_in_future() {
        let future = Utc::now() + chrono::Duration::seconds(30);
        let secs = parse_retry_after(&future.to_rfc2822()).unwrap();
        assert!(secs > 25.0 && secs <= 31.0, "got {secs}");
    }

    #[test]
    fn retry_after_http_date_in_past_is_zero() {
        let past = Utc::now() - chrono::Duration::seconds(60);
        assert_eq!(parse_retry_after(&past.to_rfc2822()), Some(0.0));
    }

    #[test]
    fn retry_after_garbage_is_absent() {
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after(""), None);
    }

    #[test]
    fn rate_hints_parse_and_tolerate_garbage() {
        let map = headers(&[
            ("Retry-After", "5"),
            ("X-RateLimit-Remaining", "0"),
            ("X-RateLimit-Reset", "not-a-number"),
        ]);
        let hints = parse_rate_hints(&map);
        assert_eq!(hints.retry_after, Some(5.0));
        assert_eq!(hints.remaining, Some(0));
        assert_eq!(hints.reset_epoch, None);
    }

    #[test]
    fn rate_hints_absent_headers() {
        assert_eq!(parse_rate_hints(&HeaderMap::new()), RateHints::default());
    }

    #[test]
    fn retryable_statuses() {
        let none = RateHints::default();
        assert!(should_retry(429, &none));
        assert!(should_retry(503, &none));
        assert!(!should_retry(500, &none));
        assert!(!should_retry(404, &none));
        assert!(!should_retry(401, &none));
    }

    #[test]
    fn pacing_headers_make_any_status_retryable() {
        let with_ra = RateHints {
            retry_after: Some(1.0),
            ..Default::default()
        };
        assert!(should_retry(403, &with_ra));

        let depleted = RateHints {
            remaining: Some(0),
            ..Default::default()
        };
        assert!(should_retry(403, &depleted));

        let quota_left = RateHints {
            remaining: Some(10),
            ..Default::default()
        };
        assert!(!should_retry(403, &quota_left));
    }

    #[test]
    fn wait_prefers_retry_after_over_reset_and_backoff() {
        let wait = compute_wait(Some(7.0), Some(now_epoch() + 50.0), 2.0, 0.0, &NoJitter);
        assert_eq!(wait, 7.0);
    }

    #[test]
    fn wait_uses_reset_epoch_when_no_retry_after() {
        let wait = compute_wait(None, Some(now_epoch() + 10.0), 2.0, 0.0, &NoJitter);
        assert!((9.0..=10.1).contains(&wait), "got {wait}");
    }

    #[test]
    fn wait_reset_in_past_is_zero() {
        let wait = compute_wait(None, Some(now_epoch() - 10.0), 2.0, 0.0, &NoJitter);
        assert_eq!(wait, 0.0);
    }

    #[test]
    fn wait_falls_back_to_backoff() {
        assert_eq!(compute_wait(None, None, 2.0, 0.0, &NoJitter), 2.0);
    }

    #[test]
    fn wait_is_capped_at_ceiling() {
        assert_eq!(
            compute_wait(Some(3600.0), None, 2.0, 0.0, &NoJitter),
            WAIT_CEILING_SECS
        );
        assert_eq!(
            compute_wait(None, None, 1e6, 0.0, &NoJitter),
            WAIT_CEILING_SECS
        );
    }
}
