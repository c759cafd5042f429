use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Look up `key` for `profile`: `{PROFILE}_{KEY}` first, then plain `{KEY}`.
/// Empty values count as unset.
fn profiled_var(profile: &str, key: &str) -> Option<String> {
    let lookup = |name: &str| env::var(name).ok().filter(|v| !v.is_empty());
    let scoped = (!profile.is_empty())
        .then(|| lookup(&format!("{profile}_{key}")))
        .flatten();
    scoped.or_else(|| lookup(key))
}

/// Parsed profiled value; unparseable input falls back to `default`.
fn profiled<T: FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_var(profile, key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub api: ApiConfig,
    pub scan: ScanConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `TASKSCOPE_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env::var("TASKSCOPE_PROFILE").unwrap_or_default();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            api: ApiConfig::from_env_profiled(p),
            scan: ScanConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  api:   url={}, timeout={}s",
            self.api.base_url,
            self.api.request_timeout_secs
        );
        tracing::info!(
            "  scan:  page_size={}, page_timeout={}s, eval_chunk={}, event_capacity={}",
            self.scan.page_size,
            self.scan.page_timeout_secs,
            self.scan.eval_chunk_size,
            self.scan.event_capacity
        );
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: String::new(),
            api: ApiConfig::default(),
            scan: ScanConfig::default(),
        }
    }
}

const DEFAULT_API_URL: &str = "http://localhost:8080/api";

// ── REST API ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the monitoring API, including the `/api` prefix.
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl ApiConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            base_url: profiled_var(p, "TASKSCOPE_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            request_timeout_secs: profiled(p, "TASKSCOPE_REQUEST_TIMEOUT_SECS", 30),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: 30,
        }
    }
}

// ── Filter scans ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Tasks requested per listing call.
    pub page_size: u32,
    /// Upper bound for a single page read; 0 disables the bound.
    pub page_timeout_secs: u64,
    /// Tasks evaluated between cooperative yields to the runtime.
    pub eval_chunk_size: usize,
    /// Buffer size of the mutation event bus.
    pub event_capacity: usize,
}

impl ScanConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            page_size: profiled(p, "TASKSCOPE_PAGE_SIZE", 10_000u32).max(1),
            page_timeout_secs: profiled(p, "TASKSCOPE_PAGE_TIMEOUT_SECS", 0),
            eval_chunk_size: profiled(p, "TASKSCOPE_EVAL_CHUNK", 1000usize).max(1),
            event_capacity: profiled(p, "TASKSCOPE_EVENT_CAPACITY", 1024usize).max(1),
        }
    }

    pub fn page_timeout(&self) -> Option<Duration> {
        (self.page_timeout_secs > 0).then(|| Duration::from_secs(self.page_timeout_secs))
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            page_size: 10_000,
            page_timeout_secs: 0,
            eval_chunk_size: 1000,
            event_capacity: 1024,
        }
    }
}
