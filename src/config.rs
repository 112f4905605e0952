//! Tunable parameters for the dispatch engine, with env-var overrides.
//!
//! Compile-time defaults that a deployment can override without a
//! recompile, loaded through `dotenv`.

use std::env;
use std::time::Duration;

/// Default spatial clustering radius for the matcher, in kilometres.
pub const DEFAULT_CLUSTER_RADIUS_KM: f64 = 5.0;
/// Default same-direction tolerance used by the compatibility predicate.
pub const DEFAULT_DIRECTION_THRESHOLD_DEG: f64 = 45.0;
/// Default maximum passengers considered for a single pool.
pub const DEFAULT_MAX_POOL_SIZE: usize = 4;
/// Default matcher wall-clock budget.
pub const DEFAULT_MATCHER_BUDGET_MS: u64 = 250;
/// Default 2-opt iteration cap.
pub const DEFAULT_TWO_OPT_ITERATION_CAP: usize = 100;
/// Default lease time-to-live.
pub const DEFAULT_LEASE_TTL_SECS: u64 = 30;
/// Default lease acquisition retry count.
pub const DEFAULT_LEASE_MAX_RETRIES: u32 = 3;
/// Default lease retry base delay (linear backoff: `base * attempt`).
pub const DEFAULT_LEASE_RETRY_DELAY_MS: u64 = 50;
/// Default generic retry-with-backoff attempt count.
pub const DEFAULT_RETRY_MAX_RETRIES: u32 = 3;
/// Default generic retry-with-backoff base delay (exponential: `base * 2^attempt`).
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 100;
/// Default number of pending passengers fetched per matching cycle.
pub const DEFAULT_PENDING_FETCH_LIMIT: usize = 100;
/// Default age bound for forming pools considered by a matching cycle.
pub const DEFAULT_FORMING_POOL_MAX_AGE_SECS: i64 = 10 * 60;

/// Runtime configuration for the dispatch engine.
///
/// `Config::from_env` applies env-var overrides on top of
/// [`Config::default`] via a `dotenv().ok()` + `env::var` pattern.
#[derive(Debug, Clone)]
pub struct Config {
    pub cluster_radius_km: f64,
    pub direction_threshold_deg: f64,
    pub max_pool_size: usize,
    pub matcher_budget: Duration,
    pub two_opt_iteration_cap: usize,
    pub lease_ttl: Duration,
    pub lease_max_retries: u32,
    pub lease_retry_delay: Duration,
    pub retry_max_retries: u32,
    pub retry_base_delay: Duration,
    pub pending_fetch_limit: usize,
    pub forming_pool_max_age_secs: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster_radius_km: DEFAULT_CLUSTER_RADIUS_KM,
            direction_threshold_deg: DEFAULT_DIRECTION_THRESHOLD_DEG,
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            matcher_budget: Duration::from_millis(DEFAULT_MATCHER_BUDGET_MS),
            two_opt_iteration_cap: DEFAULT_TWO_OPT_ITERATION_CAP,
            lease_ttl: Duration::from_secs(DEFAULT_LEASE_TTL_SECS),
            lease_max_retries: DEFAULT_LEASE_MAX_RETRIES,
            lease_retry_delay: Duration::from_millis(DEFAULT_LEASE_RETRY_DELAY_MS),
            retry_max_retries: DEFAULT_RETRY_MAX_RETRIES,
            retry_base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            pending_fetch_limit: DEFAULT_PENDING_FETCH_LIMIT,
            forming_pool_max_age_secs: DEFAULT_FORMING_POOL_MAX_AGE_SECS,
        }
    }
}

impl Config {
    /// Build a config from defaults, overridden by any recognised env vars.
    ///
    /// Unset or unparsable vars silently fall back to the default rather
    /// than failing startup.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let mut cfg = Self::default();

        if let Some(v) = parse_env("DISPATCH_CLUSTER_RADIUS_KM") {
            cfg.cluster_radius_km = v;
        }
        if let Some(v) = parse_env("DISPATCH_DIRECTION_THRESHOLD_DEG") {
            cfg.direction_threshold_deg = v;
        }
        if let Some(v) = parse_env::<usize>("DISPATCH_MAX_POOL_SIZE") {
            cfg.max_pool_size = v;
        }
        if let Some(v) = parse_env::<u64>("DISPATCH_MATCHER_BUDGET_MS") {
            cfg.matcher_budget = Duration::from_millis(v);
        }
        if let Some(v) = parse_env::<usize>("DISPATCH_TWO_OPT_ITERATION_CAP") {
            cfg.two_opt_iteration_cap = v;
        }
        if let Some(v) = parse_env::<u64>("DISPATCH_LEASE_TTL_SECS") {
            cfg.lease_ttl = Duration::from_secs(v);
        }
        if let Some(v) = parse_env::<u32>("DISPATCH_LEASE_MAX_RETRIES") {
            cfg.lease_max_retries = v;
        }
        if let Some(v) = parse_env::<u64>("DISPATCH_PENDING_FETCH_LIMIT") {
            cfg.pending_fetch_limit = v as usize;
        }

        cfg
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
