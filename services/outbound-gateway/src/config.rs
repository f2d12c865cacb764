// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the outbound gateway.
//!
//! Everything here is read once at startup. Secrets are deliberately kept out
//! of [`Config`] (which is `Serialize` and gets logged) and live in
//! [`SecretStore`] instead.

use crate::request::AuthStyle;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Configuration for the gateway service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Route the proxy operation is mounted on (default: /api/proxy)
    #[serde(default = "default_proxy_path")]
    pub proxy_path: String,

    #[serde(default)]
    pub allowlist: AllowlistConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub client: ClientConfig,

    /// Known downstream providers
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Destination hosts the gateway may call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowlistConfig {
    /// Hostnames reachable directly or via subdomain
    #[serde(default = "default_allowed_hosts")]
    pub hosts: Vec<String>,

    /// Accept exact hostnames only, no subdomains (default: false)
    #[serde(default)]
    pub strict_hosts: bool,
}

/// Sliding-window rate limit per client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests admitted per client per window (default: 60)
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in milliseconds (default: 60000)
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Retry hint returned with a 429 (default: 60)
    #[serde(default = "default_retry_after_secs")]
    pub retry_after_secs: u64,

    /// How often idle client ids are swept (default: 60)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Outbound client defaults and caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Per-attempt timeout when neither provider nor caller sets one (default: 10000)
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Retries for idempotent calls when nothing else is set (default: 2)
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// Linear backoff unit: attempt `n` waits `n * base_delay_ms` (default: 1000)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on a caller-supplied timeout (default: 30000)
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,

    /// Upper bound on caller-supplied retries (default: 5)
    #[serde(default = "default_max_retries_cap")]
    pub max_retries_cap: u32,
}

/// A named downstream provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub auth_style: AuthStyle,
    #[serde(default = "default_query_key_name")]
    pub query_key_name: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Environment variable holding this provider's secret, if it has its own
    #[serde(default)]
    pub secret_env: Option<String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_proxy_path() -> String {
    "/api/proxy".to_string()
}

fn default_allowed_hosts() -> Vec<String> {
    [
        "ipinfo.io",
        "api.ipstack.com",
        "api.github.com",
        "ipapi.co",
        "api.ipgeolocation.io",
    ]
    .iter()
    .map(|h| h.to_string())
    .collect()
}

fn default_max_requests() -> u32 {
    60
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_retry_after_secs() -> u64 {
    60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries_cap() -> u32 {
    5
}

fn default_query_key_name() -> String {
    "api_key".to_string()
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            name: "ipinfo".to_string(),
            base_url: "https://ipinfo.io".to_string(),
            auth_style: AuthStyle::QueryKey,
            query_key_name: "token".to_string(),
            timeout_ms: 5_000,
            max_retries: 2,
            secret_env: Some("IPINFO".to_string()),
        },
        ProviderConfig {
            name: "ipstack".to_string(),
            base_url: "https://api.ipstack.com".to_string(),
            auth_style: AuthStyle::QueryKey,
            query_key_name: "access_key".to_string(),
            timeout_ms: 5_000,
            max_retries: 2,
            secret_env: Some("IPSTACK".to_string()),
        },
        ProviderConfig {
            name: "github".to_string(),
            base_url: "https://api.github.com".to_string(),
            auth_style: AuthStyle::Bearer,
            query_key_name: default_query_key_name(),
            timeout_ms: default_timeout_ms(),
            max_retries: 1,
            secret_env: Some("GITHUB_TOKEN".to_string()),
        },
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            proxy_path: default_proxy_path(),
            allowlist: AllowlistConfig::default(),
            rate_limit: RateLimitConfig::default(),
            client: ClientConfig::default(),
            providers: default_providers(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for AllowlistConfig {
    fn default() -> Self {
        Self {
            hosts: default_allowed_hosts(),
            strict_hosts: false,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
            retry_after_secs: default_retry_after_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            default_max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_timeout_ms: default_max_timeout_ms(),
            max_retries_cap: default_max_retries_cap(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl RateLimitConfig {
    /// Get the rate window duration
    pub fn window_duration(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Sweep period, never shorter than one second.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl ClientConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Config {
    /// Parse a JSON config file. Missing sections fall back to defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load configuration: `GATEWAY_CONFIG` file if set, then env overrides.
    ///
    /// - `BIND_ADDR`: Server bind address
    /// - `ALLOWED_HOSTS`: Comma-separated allowlist, replaces the configured one
    /// - `STRICT_HOSTS`: `true` to disable subdomain matching
    /// - `RATE_LIMIT_MAX`: Requests per client per window
    /// - `RATE_LIMIT_WINDOW_MS`: Window length
    /// - `DEFAULT_TIMEOUT_MS`: Per-attempt timeout default
    /// - `DEFAULT_MAX_RETRIES`: Retry default for idempotent calls
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("GATEWAY_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(addr) = std::env::var("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(hosts) = std::env::var("ALLOWED_HOSTS") {
            config.allowlist.hosts = hosts
                .split(',')
                .map(|h| h.trim().to_lowercase())
                .filter(|h| !h.is_empty())
                .collect();
        }
        if let Some(strict) = env_parse("STRICT_HOSTS")? {
            config.allowlist.strict_hosts = strict;
        }
        if let Some(max) = env_parse("RATE_LIMIT_MAX")? {
            config.rate_limit.max_requests = max;
        }
        if let Some(window) = env_parse("RATE_LIMIT_WINDOW_MS")? {
            config.rate_limit.window_ms = window;
        }
        if let Some(timeout) = env_parse("DEFAULT_TIMEOUT_MS")? {
            config.client.default_timeout_ms = timeout;
        }
        if let Some(retries) = env_parse("DEFAULT_MAX_RETRIES")? {
            config.client.default_max_retries = retries;
        }

        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
        Err(_) => Ok(None),
    }
}

/// Server-held secrets.
///
/// One default secret (`API_KEY`) plus optional per-provider secrets. A call
/// gets exactly one of them; callers can never supply their own.
#[derive(Debug, Default, Clone)]
pub struct SecretStore {
    default: Option<SecretString>,
    providers: HashMap<String, SecretString>,
}

impl SecretStore {
    pub fn new(default: Option<SecretString>) -> Self {
        Self {
            default,
            providers: HashMap::new(),
        }
    }

    /// Attach a provider-specific secret.
    pub fn with_provider(mut self, name: &str, secret: SecretString) -> Self {
        self.providers.insert(name.to_lowercase(), secret);
        self
    }

    /// Read `API_KEY` and every provider's `secret_env` from the environment.
    /// Empty values count as unset.
    pub fn from_env(providers: &[ProviderConfig]) -> Self {
        let read = |var: &str| {
            std::env::var(var)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from)
        };

        let mut store = Self::new(read("API_KEY"));
        for provider in providers {
            if let Some(secret) = provider.secret_env.as_deref().and_then(read) {
                store = store.with_provider(&provider.name, secret);
            }
        }
        store
    }

    /// Secret for a call: the provider's own if it has one, else the default.
    pub fn resolve(&self, provider: Option<&str>) -> Option<SecretString> {
        provider
            .and_then(|name| self.providers.get(&name.to_lowercase()))
            .or(self.default.as_ref())
            .cloned()
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}
