//! Cache-first orchestration of rate-limited GET calls.
//!
//! [`Fetcher`] is the single entry point ingestion clients use for outbound
//! GETs: it checks the bound [`CacheStore`] for a fresh entry, and on a miss
//! (or staleness) delegates to the retry executor, which writes a successful
//! result back through to the cache.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::{debug, warn};

use crate::jitter::{JitterSource, ThreadRngJitter};
use crate::policy::{PolicyOverrides, RetryPolicy};
use crate::retry::{self, RetryRequest};
use crate::store::{CacheStore, CachedResponse, now_epoch};
use crate::telemetry;

/// Result of one logical GET — from cache or upstream.
///
/// Ordinary network/HTTP conditions are encoded here rather than raised:
/// status 0 with the error text as `response` for exhausted transport errors,
/// the real status and body for non-200 responses. Callers treat any non-200
/// status as "no data available for this call".
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    /// Parsed response body: JSON when possible, otherwise the raw text as a
    /// JSON string.
    pub response: Value,
    /// HTTP status observed (0 for transport errors).
    pub status: u16,
    /// Unix epoch seconds when the result was produced or cached.
    pub timestamp: f64,
}

impl FetchResult {
    /// True for HTTP 200.
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

impl From<CachedResponse> for FetchResult {
    fn from(hit: CachedResponse) -> Self {
        Self {
            response: hit.response,
            status: hit.status,
            timestamp: hit.timestamp,
        }
    }
}

/// Per-call options for [`Fetcher::rate_limited_get()`].
///
/// ```rust
/// # use huginn::FetchOptions;
/// # use std::time::Duration;
/// let opts = FetchOptions::new()
///     .header("Authorization", "Bearer token")
///     .query("state", "closed")
///     .max_age(Duration::from_secs(3600));
/// ```
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    cache: Option<Arc<CacheStore>>,
    cache_key: Option<String>,
    max_age: Option<Duration>,
    policy: PolicyOverrides,
}

impl FetchOptions {
    /// Create empty options: no headers, no query, no cache, default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Bind a cache store and the key for this call. The key typically
    /// encodes service, resource, pagination offset, and date range.
    pub fn cache(mut self, store: Arc<CacheStore>, key: impl Into<String>) -> Self {
        self.cache = Some(store);
        self.cache_key = Some(key.into());
        self
    }

    /// Maximum acceptable age for a cached entry. Without this, any cached
    /// entry counts as fresh.
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Per-call override of the attempt count.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.policy.max_retries = Some(n);
        self
    }

    /// Per-call override of the initial backoff, in seconds.
    pub fn backoff_base(mut self, secs: f64) -> Self {
        self.policy.backoff_base = Some(secs);
        self
    }

    /// Per-call override of the jitter upper bound, in seconds.
    pub fn backoff_jitter(mut self, secs: f64) -> Self {
        self.policy.backoff_jitter = Some(secs);
        self
    }

    /// Per-call override of the backoff cap, in seconds.
    pub fn max_backoff(mut self, secs: f64) -> Self {
        self.policy.max_backoff = Some(secs);
        self
    }
}

/// Rate-limit-aware GET executor with cache-first orchestration.
///
/// Owns the HTTP client, the resolved [`RetryPolicy`], and the jitter source.
/// Construct once at startup and share (`&Fetcher` is enough — all methods
/// take shared references; the policy is immutable after construction).
///
/// ```rust,no_run
/// use huginn::{FetchOptions, Fetcher, RetryPolicy};
///
/// # async fn demo() {
/// let fetcher = Fetcher::new(RetryPolicy::from_env());
/// let result = fetcher
///     .rate_limited_get(
///         "https://api.github.com/repos/org/repo/issues",
///         &FetchOptions::new().query("state", "all"),
///     )
///     .await;
/// if result.is_success() {
///     println!("{}", result.response);
/// }
/// # }
/// ```
pub struct Fetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
    jitter: Arc<dyn JitterSource>,
}

impl Fetcher {
    /// Create a fetcher with the given policy, a default HTTP client, and
    /// thread-rng jitter.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            policy,
            jitter: Arc::new(ThreadRngJitter),
        }
    }

    /// Create a fetcher with the policy resolved from the environment.
    pub fn from_env() -> Self {
        Self::new(RetryPolicy::from_env())
    }

    /// Use a custom HTTP client (e.g. with a proxy or custom timeouts).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Use a custom jitter source. Tests inject [`NoJitter`](crate::NoJitter)
    /// to make waits deterministic.
    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Perform one logical GET: cache first, then the retry executor.
    ///
    /// A cached entry is fresh when no `max_age` was given, or when its age
    /// does not exceed `max_age`; fresh hits are returned without any
    /// upstream call. Otherwise the retry executor runs with the per-call
    /// resolved policy, writing a successful result through to the cache.
    pub async fn rate_limited_get(&self, url: &str, opts: &FetchOptions) -> FetchResult {
        if let Some(hit) = cached_fresh(opts) {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
            debug!(key = opts.cache_key.as_deref(), "serving fresh cache entry");
            return hit.into();
        }
        if opts.cache.is_some() && opts.cache_key.is_some() {
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
        }

        let policy = self.policy.for_call(&opts.policy);
        let headers = build_headers(&opts.headers);
        retry::execute(RetryRequest {
            client: &self.client,
            url,
            headers: &headers,
            query: &opts.query,
            cache: opts.cache.as_deref(),
            cache_key: opts.cache_key.as_deref(),
            policy: &policy,
            jitter: self.jitter.as_ref(),
        })
        .await
    }
}

/// Cache lookup honoring `max_age`. Returns `None` when no cache/key is
/// bound, the entry is absent (or TTL-expired in the store), or it is stale
/// for this call.
fn cached_fresh(opts: &FetchOptions) -> Option<CachedResponse> {
    let cache = opts.cache.as_ref()?;
    let key = opts.cache_key.as_deref()?;
    let hit = cache.get(key)?;
    match opts.max_age {
        None => Some(hit),
        Some(max_age) => {
            let age = now_epoch() - hit.timestamp;
            (age <= max_age.as_secs_f64()).then_some(hit)
        }
    }
}

/// Build a `HeaderMap` from string pairs, skipping invalid names/values with
/// a warning rather than failing the call.
fn build_headers(pairs: &[(String, String)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = name.as_str(), "skipping invalid request header"),
        }
    }
    headers
}
