//! Huginn — rate-limit-aware HTTP fetch layer with a persistent response cache.
//!
//! Huginn is the outbound-GET core for contribution-ingestion pipelines that
//! pull from issue-tracker and VCS APIs. It combines two pieces:
//!
//! - [`CacheStore`] — a durable key→response store with TTL and oldest-first
//!   size eviction, safe for concurrent use from many threads.
//! - a retry executor that classifies each attempt (success, retryable,
//!   terminal failure, transport error), honors server pacing headers
//!   (`Retry-After`, `X-RateLimit-Remaining`, `X-RateLimit-Reset`), and falls
//!   back to jittered exponential backoff.
//!
//! [`Fetcher::rate_limited_get()`] composes them: cache first, then the
//! executor, with successful results written back through to the cache.
//! Ordinary network/HTTP conditions never surface as errors — they are
//! encoded in the returned [`FetchResult`]'s `status`/`response` fields, so
//! ingestion clients degrade to "no data" instead of aborting a pipeline.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use huginn::{CacheStore, FetchOptions, Fetcher, RetryPolicy, StoreConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> huginn::Result<()> {
//!     let store = Arc::new(CacheStore::open_default(
//!         StoreConfig::new()
//!             .ttl(Duration::from_secs(24 * 3600))
//!             .max_entries(10_000),
//!     )?);
//!     let fetcher = Fetcher::new(RetryPolicy::from_env());
//!
//!     let result = fetcher
//!         .rate_limited_get(
//!             "https://api.github.com/repos/org/repo/issues",
//!             &FetchOptions::new()
//!                 .header("Accept", "application/vnd.github+json")
//!                 .query("state", "all")
//!                 .cache(store.clone(), "github:org/repo:issues:page1")
//!                 .max_age(Duration::from_secs(3600)),
//!         )
//!         .await;
//!
//!     if result.is_success() {
//!         println!("{}", result.response);
//!     }
//!     store.close();
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod fetch;
pub mod jitter;
pub mod policy;
mod retry;
pub mod store;
pub mod telemetry;

// Re-export main types at crate root
pub use error::{HuginnError, Result};
pub use fetch::{FetchOptions, FetchResult, Fetcher};
pub use jitter::{JitterSource, NoJitter, ThreadRngJitter};
pub use policy::{PolicyOverrides, RetryPolicy};
pub use store::{CacheStats, CacheStore, CachedResponse, KeySummary, StoreConfig};
