//! Retry policy resolution.
//!
//! A [`RetryPolicy`] controls how many attempts a logical GET makes and how
//! backoff waits are computed. Values resolve through four layers, strongest
//! first:
//!
//! 1. explicit per-call overrides ([`RetryPolicy::for_call()`]),
//! 2. runtime overrides applied once at startup ([`RetryPolicy::with_overrides()`],
//!    typically from CLI flags),
//! 3. `CONTRIB_*` environment variables,
//! 4. built-in defaults.
//!
//! The policy is an explicit value object passed into the
//! [`Fetcher`](crate::Fetcher) — there is no process-global mutable state, so
//! concurrent tests can run with distinct policies.

/// Environment variable for the maximum attempt count.
pub const ENV_MAX_RETRIES: &str = "CONTRIB_MAX_RETRIES";
/// Environment variable for the initial backoff, in seconds.
pub const ENV_BACKOFF_BASE: &str = "CONTRIB_BACKOFF_BASE";
/// Environment variable for the jitter upper bound, in seconds.
pub const ENV_BACKOFF_JITTER: &str = "CONTRIB_BACKOFF_JITTER";
/// Environment variable for the backoff cap, in seconds.
pub const ENV_MAX_BACKOFF: &str = "CONTRIB_MAX_BACKOFF";

/// Built-in default attempt count.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Built-in default initial backoff, in seconds.
pub const DEFAULT_BACKOFF_BASE: f64 = 0.5;
/// Built-in default backoff cap, in seconds.
pub const DEFAULT_MAX_BACKOFF: f64 = 120.0;

/// Retry/backoff configuration for outbound GET calls.
///
/// Construct with [`RetryPolicy::from_env()`] at startup, then layer runtime
/// overrides on top:
///
/// ```rust
/// # use huginn::{PolicyOverrides, RetryPolicy};
/// let policy = RetryPolicy::from_env()
///     .with_overrides(&PolicyOverrides::new().max_retries(5));
/// assert_eq!(policy.max_retries, 5);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum attempts per logical call. 1 = no retry.
    pub max_retries: u32,
    /// Initial wait before the first retry, in seconds.
    pub backoff_base: f64,
    /// Upper bound of random jitter added to each wait, in seconds.
    /// `None` means "track `backoff_base`" — the documented default.
    pub backoff_jitter: Option<f64>,
    /// Hard cap on the exponential backoff component, in seconds.
    pub max_backoff: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_jitter: None,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with built-in defaults, ignoring the environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a policy from `CONTRIB_*` environment variables, falling back
    /// to built-in defaults. Unparseable values degrade to the next layer
    /// down — they are never fatal.
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Like [`from_env()`](Self::from_env), but with an injected lookup so
    /// tests can exercise the environment layer without mutating process
    /// globals.
    pub fn from_env_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse = |key: &str| lookup(key).and_then(|v| v.trim().parse::<f64>().ok());
        Self {
            max_retries: lookup(ENV_MAX_RETRIES)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_MAX_RETRIES),
            backoff_base: parse(ENV_BACKOFF_BASE).unwrap_or(DEFAULT_BACKOFF_BASE),
            backoff_jitter: parse(ENV_BACKOFF_JITTER),
            max_backoff: parse(ENV_MAX_BACKOFF).unwrap_or(DEFAULT_MAX_BACKOFF),
        }
    }

    /// Set the maximum attempt count.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the initial backoff, in seconds.
    pub fn backoff_base(mut self, secs: f64) -> Self {
        self.backoff_base = secs;
        self
    }

    /// Pin the jitter upper bound, in seconds.
    pub fn backoff_jitter(mut self, secs: f64) -> Self {
        self.backoff_jitter = Some(secs);
        self
    }

    /// Set the backoff cap, in seconds.
    pub fn max_backoff(mut self, secs: f64) -> Self {
        self.max_backoff = secs;
        self
    }

    /// Effective jitter upper bound: the pinned value, or `backoff_base`
    /// when no layer set one explicitly.
    pub fn jitter(&self) -> f64 {
        self.backoff_jitter.unwrap_or(self.backoff_base)
    }

    /// Apply runtime overrides (e.g. from CLI flags). Call once at startup,
    /// before any requests begin; `None` fields leave the current value.
    pub fn with_overrides(mut self, overrides: &PolicyOverrides) -> Self {
        if let Some(n) = overrides.max_retries {
            self.max_retries = n;
        }
        if let Some(b) = overrides.backoff_base {
            self.backoff_base = b;
        }
        if let Some(j) = overrides.backoff_jitter {
            self.backoff_jitter = Some(j);
        }
        if let Some(m) = overrides.max_backoff {
            self.max_backoff = m;
        }
        self
    }

    /// Fold per-call overrides into an effective policy for one request.
    pub fn for_call(&self, overrides: &PolicyOverrides) -> Self {
        self.clone().with_overrides(overrides)
    }
}

/// Optional overrides for any subset of the retry policy fields.
///
/// Used both for the startup-time runtime layer and for per-call overrides
/// carried by [`FetchOptions`](crate::FetchOptions).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyOverrides {
    pub max_retries: Option<u32>,
    pub backoff_base: Option<f64>,
    pub backoff_jitter: Option<f64>,
    pub max_backoff: Option<f64>,
}

impl PolicyOverrides {
    /// Create an empty set of overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the maximum attempt count.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Override the initial backoff, in seconds.
    pub fn backoff_base(mut self, secs: f64) -> Self {
        self.backoff_base = Some(secs);
        self
    }

    /// Override the jitter upper bound, in seconds.
    pub fn backoff_jitter(mut self, secs: f64) -> Self {
        self.backoff_jitter = Some(secs);
        self
    }

    /// Override the backoff cap, in seconds.
    pub fn max_backoff(mut self, secs: f64) -> Self {
        self.max_backoff = Some(secs);
        self
    }

    /// True when no field is overridden.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
