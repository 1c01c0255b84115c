//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable
//! overrides. Sources are merged in order (later overrides earlier):
//!
//! 1. **YAML config file** - base configuration (default: `config.yaml`)
//! 2. **Environment variables** - `TOLLGATE_`-prefixed variables, with `__`
//!    separating nested keys (e.g. `TOLLGATE_UPSTREAM__URL`)
//! 3. **DATABASE_URL** - special case: overrides `database_url` if set
//!
//! A missing config file is fine; defaults cover every field.

use std::time::Duration;

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

/// Simple CLI args - just for specifying the config file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "TOLLGATE_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines to catch config errors before deployment.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g. "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// PostgreSQL connection string (DATABASE_URL overrides this)
    pub database_url: String,
    /// Connection pool settings
    pub pool: PoolSettings,
    /// Upstream inference endpoint the gateway forwards admitted requests to
    pub upstream: UpstreamConfig,
    /// Account inserted at startup if absent; set to null to disable seeding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_account: Option<SeedAccount>,
    /// Enable the Prometheus metrics endpoint at `/metrics`
    pub enable_metrics: bool,
}

/// Connection pool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections to maintain
    pub min_connections: u32,
    /// Maximum time to wait for a connection (seconds). This bounds every
    /// storage call; an acquire timeout is treated as the store being
    /// unavailable.
    pub acquire_timeout_secs: u64,
    /// Time before idle connections are closed (seconds, 0 = never)
    pub idle_timeout_secs: u64,
    /// Maximum lifetime of a connection (seconds, 0 = never)
    pub max_lifetime_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,  // 10 minutes
            max_lifetime_secs: 1800, // 30 minutes
        }
    }
}

/// Upstream inference endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamConfig {
    /// URL the processor POSTs admitted payloads to
    pub url: Url,
    /// Optional bearer token for the upstream endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: Url::parse("http://localhost:8000/infer").unwrap(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Bootstrap account seeded at startup.
///
/// Seeding is insert-if-absent: an existing account with the same key is
/// never overwritten, so balances survive restarts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SeedAccount {
    pub api_key: String,
    #[serde(default = "SeedAccount::default_credits")]
    pub credits: i64,
    #[serde(default = "SeedAccount::default_active")]
    pub is_active: bool,
}

impl SeedAccount {
    fn default_credits() -> i64 {
        50
    }

    fn default_active() -> bool {
        true
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: "postgres://localhost:5432/tollgate".to_string(),
            pool: PoolSettings::default(),
            upstream: UpstreamConfig::default(),
            seed_account: Some(SeedAccount {
                api_key: "test-key-123".to_string(),
                credits: 50,
                is_active: true,
            }),
            enable_metrics: true,
        }
    }
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("TOLLGATE_").split("__"))
            // Common DATABASE_URL pattern
            .merge(Env::raw().only(&["DATABASE_URL"]))
            .extract()?;

        config.validate().map_err(figment::Error::from)?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if !matches!(self.upstream.url.scheme(), "http" | "https") {
            return Err(format!(
                "upstream.url must be http or https, got '{}'",
                self.upstream.url.scheme()
            ));
        }
        if let Some(seed) = &self.seed_account {
            if seed.api_key.is_empty() {
                return Err("seed_account.api_key must not be empty".to_string());
            }
            if seed.credits < 0 {
                return Err("seed_account.credits must not be negative".to_string());
            }
        }
        Ok(())
    }
}
