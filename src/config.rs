//! Layered settings for both binaries.
//!
//! Precedence, lowest first: struct defaults, optional config file,
//! `ARBX_*` environment variables, legacy environment names, CLI flags
//! (applied by the binaries). Everything is validated once at startup and is
//! immutable afterwards.

use std::env;
use std::path::Path;
use std::time::Duration;

use ::config::builder::DefaultState;
use ::config::{ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;

use crate::generator::GeneratorConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] ::config::ConfigError),
    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { key, reason: reason.into() }
}

// Older deployments configure the monitor through these plain names.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("MAX_CONCURRENT_TASKS", "monitor.max_concurrent_tasks"),
    ("PRICES_REQUEST_INTERVAL_S", "monitor.request_interval_s"),
    ("PRICES_SOURCE_PROTOCOL", "source.protocol"),
    ("PRICES_SOURCE_HOST", "source.host"),
    ("PRICES_SOURCE_PORT", "source.port"),
    ("LOGGING_LEVEL", "log_level"),
];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    /// Seconds between ledger summaries, 0 disables them.
    pub status_interval_s: f64,
    /// Port for the Prometheus exporter (only with the `metrics-exporter` feature).
    pub metrics_port: u16,
    pub monitor: MonitorSettings,
    pub source: SourceSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            status_interval_s: 30.0,
            metrics_port: 9000,
            monitor: MonitorSettings::default(),
            source: SourceSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub assets: Vec<String>,
    pub markets: Vec<String>,
    /// Market both sides of a fresh ledger entry point at.
    pub default_market: String,
    pub max_concurrent_tasks: usize,
    /// Minimum pause after a successful cycle, per (asset, market).
    pub request_interval_s: f64,
    pub update_timeout_s: f64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            assets: vec!["Copper".into(), "Oil".into()],
            markets: vec!["US".into(), "UK".into()],
            default_market: "US".into(),
            max_concurrent_tasks: 4,
            request_interval_s: 1.0,
            update_timeout_s: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub request_timeout_s: f64,
    pub retry_delay_ms: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            protocol: "http".into(),
            host: "localhost".into(),
            port: 8000,
            request_timeout_s: 10.0,
            retry_delay_ms: 100,
        }
    }
}

impl SourceSettings {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.request_timeout_s).unwrap_or_default()
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// What the router needs, in runtime units.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub assets: Vec<String>,
    pub markets: Vec<String>,
    pub max_concurrent_tasks: usize,
    pub request_interval: Duration,
}

impl MonitorSettings {
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            assets: self.assets.clone(),
            markets: self.markets.clone(),
            max_concurrent_tasks: self.max_concurrent_tasks,
            request_interval: Duration::try_from_secs_f64(self.request_interval_s).unwrap_or_default(),
        }
    }

    pub fn update_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.update_timeout_s).unwrap_or_default()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        normalise_ids("monitor.assets", &self.assets)?;
        normalise_ids("monitor.markets", &self.markets)?;
        if self.default_market.trim().is_empty() {
            return Err(invalid("monitor.default_market", "must not be empty"));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(invalid("monitor.max_concurrent_tasks", "must be at least 1"));
        }
        non_negative("monitor.request_interval_s", self.request_interval_s)?;
        positive("monitor.update_timeout_s", self.update_timeout_s)?;
        Ok(())
    }
}

impl Settings {
    /// Load from an optional file plus the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let builder = with_file(::config::Config::builder(), path);
        let builder = builder.add_source(
            Environment::with_prefix("ARBX")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("monitor.assets")
                .with_list_parse_key("monitor.markets")
                .try_parsing(true),
        );
        let builder = apply_legacy_env(builder, |name| env::var(name).ok())?;
        Self::build(builder)
    }

    /// Load from TOML text only. Handy for tests and embedded defaults.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Self::build(::config::Config::builder().add_source(File::from_str(text, FileFormat::Toml)))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.monitor.assets = normalise_ids("monitor.assets", &settings.monitor.assets)?;
        settings.monitor.markets = normalise_ids("monitor.markets", &settings.monitor.markets)?;
        settings.monitor.default_market = settings.monitor.default_market.trim().to_string();
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.monitor.validate()?;
        non_negative("status_interval_s", self.status_interval_s)?;
        positive("source.request_timeout_s", self.source.request_timeout_s)?;
        if !matches!(self.source.protocol.as_str(), "http" | "https") {
            return Err(invalid("source.protocol", format!("expected http or https, got {}", self.source.protocol)));
        }
        if self.source.host.trim().is_empty() {
            return Err(invalid("source.host", "must not be empty"));
        }
        Ok(())
    }

    pub fn status_interval(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.status_interval_s)
            .ok()
            .filter(|d| !d.is_zero())
    }
}

/// Settings for the mock price generator service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
    pub log_level: String,
    pub host: String,
    pub port: u16,
    /// Fixed RNG seed for reproducible price paths.
    pub seed: Option<u64>,
    pub prices: GeneratorConfig,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            host: "0.0.0.0".into(),
            port: 8000,
            seed: None,
            prices: GeneratorConfig::default(),
        }
    }
}

impl GeneratorSettings {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let builder = with_file(::config::Config::builder(), path).add_source(
            Environment::with_prefix("ARBX_GENERATOR")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("prices.assets")
                .with_list_parse_key("prices.markets")
                .try_parsing(true),
        );
        Self::build(builder)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Self::build(::config::Config::builder().add_source(File::from_str(text, FileFormat::Toml)))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: GeneratorSettings = builder.build()?.try_deserialize()?;
        settings
            .prices
            .validate()
            .map_err(|e| invalid("prices", e.to_string()))?;
        Ok(settings)
    }
}

fn with_file(builder: ConfigBuilder<DefaultState>, path: Option<&Path>) -> ConfigBuilder<DefaultState> {
    match path {
        Some(path) => builder.add_source(File::from(path)),
        None => builder,
    }
}

fn apply_legacy_env<F>(
    mut builder: ConfigBuilder<DefaultState>,
    lookup: F,
) -> Result<ConfigBuilder<DefaultState>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    for (name, key) in LEGACY_ENV {
        builder = builder.set_override_option(*key, lookup(name))?;
    }
    Ok(builder)
}

fn normalise_ids(key: &'static str, ids: &[String]) -> Result<Vec<String>, ConfigError> {
    if ids.is_empty() {
        return Err(invalid(key, "must list at least one entry"));
    }
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        let id = id.trim();
        if id.is_empty() {
            return Err(invalid(key, "contains an empty entry"));
        }
        if out.iter().any(|seen| seen == id) {
            return Err(invalid(key, format!("duplicate entry {id}")));
        }
        out.push(id.to_string());
    }
    Ok(out)
}

fn non_negative(key: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(key, format!("must be a finite non-negative number, got {value}")))
    }
}

fn positive(key: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(key, format!("must be a finite positive number, got {value}")))
    }
}
