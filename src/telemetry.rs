//! Telemetry metric name constants.
//!
//! Centralised metric names for huginn operations. Consumers install their
//! own `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `huginn_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `outcome` — attempt classification: "success", "retry", "fail", "error"

/// Total outbound request attempts (each retry counts separately).
///
/// Labels: `outcome` ("success" | "retry" | "fail" | "error").
pub const REQUESTS_TOTAL: &str = "huginn_requests_total";

/// Total retryable outcomes (rate-limited responses and transport errors).
pub const RETRIES_TOTAL: &str = "huginn_retries_total";

/// Total fresh cache hits served without an upstream call.
pub const CACHE_HITS_TOTAL: &str = "huginn_cache_hits_total";

/// Total cache lookups that missed or were stale.
pub const CACHE_MISSES_TOTAL: &str = "huginn_cache_misses_total";

/// Total cache entries evicted by the maintenance pass.
///
/// Labels: `reason` ("ttl" | "size").
pub const CACHE_EVICTIONS_TOTAL: &str = "huginn_cache_evictions_total";
