use anyhow::Context;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ProbeError;
use crate::security::redact_key;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionConfig {
    pub url: Option<String>,
    pub key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// Each table gets its own limited read.
    pub tables: Vec<String>,
    pub limit: u32,
    pub timeout_secs: u64,
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    pub probe: ProbeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Values supplied on the command line or through the environment. Anything
/// set here wins over the config files.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub key: Option<String>,
    pub tables: Option<Vec<String>>,
    pub limit: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub log_level: Option<String>,
}

impl AppConfig {
    pub fn load_default() -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(DEFAULT_CONFIG)?;
        Ok(cfg)
    }

    /// Load a user config file layered over the built-in defaults. The file
    /// only needs to contain the keys it changes.
    pub fn load_from(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let p = path.into();
        let s = fs::read_to_string(&p)
            .with_context(|| format!("failed to read config file {}", p.display()))?;
        let user: toml::Table = toml::from_str(&s)
            .with_context(|| format!("failed to parse config file {}", p.display()))?;

        let mut merged: toml::Table = toml::from_str(DEFAULT_CONFIG)?;
        merge_tables(&mut merged, user);
        let cfg = toml::Value::Table(merged)
            .try_into::<AppConfig>()
            .with_context(|| format!("invalid config in {}", p.display()))?;
        Ok(cfg)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if overrides.url.is_some() {
            self.connection.url = overrides.url;
        }
        if overrides.key.is_some() {
            self.connection.key = overrides.key;
        }
        if let Some(tables) = overrides.tables {
            self.probe.tables = tables;
        }
        if let Some(limit) = overrides.limit {
            self.probe.limit = limit;
        }
        if let Some(timeout) = overrides.timeout_secs {
            self.probe.timeout_secs = timeout;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    /// Check the probe settings and pull out the credentials.
    pub fn credentials(&self) -> Result<Credentials, ProbeError> {
        if self.probe.tables.is_empty() {
            return Err(ProbeError::Config("no tables to query".into()));
        }
        if self.probe.tables.iter().any(|t| t.trim().is_empty()) {
            return Err(ProbeError::Config("table name is empty".into()));
        }
        if self.probe.limit == 0 {
            return Err(ProbeError::Config("limit must be at least 1".into()));
        }
        if self.probe.timeout_secs == 0 {
            return Err(ProbeError::Config("timeout_secs must be at least 1".into()));
        }
        Credentials::new(
            self.connection.url.as_deref().unwrap_or_default(),
            self.connection.key.as_deref().unwrap_or_default(),
        )
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (k, v) in overlay {
        if let toml::Value::Table(o) = v {
            if let Some(toml::Value::Table(b)) = base.get_mut(&k) {
                merge_tables(b, o);
                continue;
            }
            base.insert(k, toml::Value::Table(o));
        } else {
            base.insert(k, v);
        }
    }
}

/// Endpoint and API key for the hosted project.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    url: reqwest::Url,
    key: String,
}

impl Credentials {
    /// Only local sanity checks happen here; whether the key is accepted is
    /// up to the remote service.
    pub fn new(url: &str, key: &str) -> Result<Self, ProbeError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ProbeError::Config(
                "supabase url is required (set SUPABASE_URL or --url)".into(),
            ));
        }
        if key.trim().is_empty() {
            return Err(ProbeError::Config(
                "supabase key is required (set SUPABASE_KEY or --key)".into(),
            ));
        }
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| ProbeError::Config(format!("invalid supabase url '{}': {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(ProbeError::Config(format!(
                "invalid supabase url '{}': expected http(s)://host",
                url
            )));
        }
        Ok(Self {
            url: parsed,
            key: key.trim().to_string(),
        })
    }

    pub fn url(&self) -> &reqwest::Url {
        &self.url
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url.as_str())
            .field("key", &redact_key(&self.key))
            .finish()
    }
}
