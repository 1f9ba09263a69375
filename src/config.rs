//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `sensor-hub.toml`.
//!     loads configuration from file or falls back to defaults, then applies
//!     the DB_* environment overrides.
//!
//! structure:
//!     - ServerConfig: listen address, per-request timeout.
//!     - DatabaseConfig: backend (postgres | memory) and connection params.
//!     - DevicesConfig: which esp32 id owns which ingest endpoint.
//!     - LivenessConfig: online window and sweep interval.
//!     - RetentionConfig: size threshold ("650 MB"), max age, check interval.
//!     - LoggingConfig: default log level when RUST_LOG is unset.
//!
//! ==============================================================================

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::retention::RetentionPolicy;
use crate::size::ByteSize;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub devices: DevicesConfig,
    pub liveness: LivenessConfig,
    pub retention: RetentionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_address: String,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: Backend,
    pub name: String,
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub create_schema: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DevicesConfig {
    /// aht21 board posting to /temperature_humidity_data
    pub climate: String,
    /// mq6 board posting to /mq6_data
    pub gas: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LivenessConfig {
    pub window_seconds: u64,
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetentionConfig {
    pub enabled: bool,
    pub size_threshold: ByteSize,
    pub max_age_days: u32,
    pub check_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:5000".to_string(),
            request_timeout_seconds: 30,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Postgres,
            name: "sensors".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            host: "localhost".to_string(),
            port: 5432,
            max_connections: 5,
            acquire_timeout_seconds: 5,
            create_schema: true,
        }
    }
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            climate: "esp32_1".to_string(),
            gas: "esp32_2".to_string(),
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self { window_seconds: 60, sweep_interval_seconds: 5 }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            size_threshold: ByteSize::mb(650),
            max_age_days: 30,
            check_interval_seconds: 3600,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl LivenessConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.window_seconds as i64)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_seconds)
    }
}

impl RetentionConfig {
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            size_threshold: self.size_threshold,
            max_age: chrono::Duration::days(self.max_age_days as i64),
        }
    }

    pub fn check_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.check_interval_seconds)
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(content).context("Failed to parse config")?;
        Ok(config)
    }

    /// Load with default fallback, then apply environment overrides
    pub fn load_or_default() -> anyhow::Result<Self> {
        let mut paths = Vec::new();
        if let Ok(explicit) = std::env::var("SENSOR_HUB_CONFIG") {
            paths.push(PathBuf::from(explicit));
        }
        paths.push(PathBuf::from("config").join("sensor-hub.toml"));
        paths.push(PathBuf::from("..").join("config").join("sensor-hub.toml"));

        let mut config = None;
        for path in &paths {
            if path.exists() {
                config = Some(Self::load(path)?);
                println!("[CONFIG] Loaded from {}", path.display());
                break;
            }
        }
        let mut config = config.unwrap_or_else(|| {
            println!("[CONFIG] Warning: No config file found - using defaults");
            Self::default()
        });

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// DB_NAME, DB_USER, DB_PASSWORD, DB_HOST, DB_PORT win over the file
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db = &mut self.database;
        if let Some(v) = lookup("DB_NAME") {
            db.name = v;
        }
        if let Some(v) = lookup("DB_USER") {
            db.user = v;
        }
        if let Some(v) = lookup("DB_PASSWORD") {
            db.password = v;
        }
        if let Some(v) = lookup("DB_HOST") {
            db.host = v;
        }
        if let Some(v) = lookup("DB_PORT") {
            db.port = v
                .trim()
                .parse()
                .with_context(|| format!("DB_PORT is not a valid port: {v:?}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.liveness.window_seconds == 0 {
            bail!("liveness.window_seconds must be > 0");
        }
        if self.liveness.sweep_interval_seconds == 0 {
            bail!("liveness.sweep_interval_seconds must be > 0");
        }
        if self.retention.enabled && self.retention.check_interval_seconds == 0 {
            bail!("retention.check_interval_seconds must be > 0");
        }
        let ids = [("devices.climate", &self.devices.climate), ("devices.gas", &self.devices.gas)];
        for (key, id) in ids {
            if !is_safe_device_id(id) {
                bail!("{key} must be non-empty and use only ascii letters, digits, '_' or '-', got {id:?}");
            }
        }
        if self.devices.climate == self.devices.gas {
            bail!("devices.climate and devices.gas must differ");
        }
        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│          SENSOR HUB CONFIGURATION        │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Listen: {}", self.server.listen_address);
        println!("│ Backend: {:?}", self.database.backend);
        if self.database.backend == Backend::Postgres {
            println!(
                "│ Database: {}@{}:{}/{}",
                self.database.user, self.database.host, self.database.port, self.database.name
            );
        }
        println!("│ Devices: {} (aht21), {} (mq6)", self.devices.climate, self.devices.gas);
        println!(
            "│ Liveness: {}s window, {}s sweep",
            self.liveness.window_seconds, self.liveness.sweep_interval_seconds
        );
        if self.retention.enabled {
            println!(
                "│ Retention: >= {} -> drop older than {}d",
                self.retention.size_threshold, self.retention.max_age_days
            );
        } else {
            println!("│ Retention: disabled");
        }
        println!("│ Log Level: {}", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}

/// device ids end up verbatim in html ids and page script
fn is_safe_device_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
