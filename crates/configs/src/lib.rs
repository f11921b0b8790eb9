//! # configs
//!
//! Runtime settings for the Canopy binaries. Sources, lowest precedence first:
//!
//! 1. built-in defaults,
//! 2. an optional TOML file (`canopy.toml` unless `CANOPY_CONFIG` names another),
//! 3. environment variables such as `CANOPY__ADDRESS` or `CANOPY__MAX_SESSIONS`.
//!
//! A `.env` file in the working directory is loaded into the environment first.

use config::{Config, Environment, File, FileFormat};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "canopy.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Socket address the HTTP server binds, e.g. `127.0.0.1:5000`
    pub address: String,
    pub database_url: SecretString,
    pub max_connections: u32,

    pub static_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub thumbnail_dir: PathBuf,

    /// URL path the service is mounted at behind a reverse proxy, e.g.
    /// `/canopy`. Empty when hosted at the root.
    pub root_path: String,
    /// Largest accepted request target plus headers, in bytes
    pub max_header_bytes: usize,

    /// Name of the session cookie
    pub login_cookie: String,
    pub login_expire_secs: u64,
    pub max_sessions: usize,

    pub results_per_page: u32,

    pub thumbnail_size: u32,
    pub thumbnail_jpeg_quality: u8,

    pub request_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,

    pub log_format: LogFormat,
}

impl Settings {
    /// Loads `.env`, then the layered sources, then validates.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(?path, "loaded .env");
        }
        let file = std::env::var("CANOPY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        Self::from_sources(Some(&file), true)
    }

    /// Layers defaults, the optional file at `path` and (when `use_env`) the
    /// `CANOPY__*` environment.
    pub fn from_sources(path: Option<&str>, use_env: bool) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("address", "127.0.0.1:5000")?
            .set_default("database_url", "sqlite:data/content.db")?
            .set_default("max_connections", 5)?
            .set_default("static_dir", "static")?
            .set_default("uploads_dir", "uploads")?
            .set_default("thumbnail_dir", "thumbnails")?
            .set_default("root_path", "")?
            .set_default("max_header_bytes", 10_000)?
            .set_default("login_cookie", "canopy_session")?
            .set_default("login_expire_secs", 1500 * 60 * 60)?
            .set_default("max_sessions", 10_000)?
            .set_default("results_per_page", 30)?
            .set_default("thumbnail_size", 200)?
            .set_default("thumbnail_jpeg_quality", 80)?
            .set_default("request_timeout_secs", 30)?
            .set_default("shutdown_timeout_secs", 10)?
            .set_default("log_format", "pretty")?;

        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Toml).required(false));
        }
        if use_env {
            builder = builder.add_source(
                Environment::with_prefix("CANOPY")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.trim().is_empty() {
            return Err(invalid("address", "must not be empty"));
        }
        if self.login_cookie.trim().is_empty() {
            return Err(invalid("login_cookie", "must not be empty"));
        }
        if self.max_connections == 0 {
            return Err(invalid("max_connections", "must be at least 1"));
        }
        if self.max_sessions == 0 {
            return Err(invalid("max_sessions", "must be at least 1"));
        }
        if self.results_per_page == 0 {
            return Err(invalid("results_per_page", "must be at least 1"));
        }
        if self.thumbnail_size == 0 {
            return Err(invalid("thumbnail_size", "must be at least 1"));
        }
        if !(1..=100).contains(&self.thumbnail_jpeg_quality) {
            return Err(invalid("thumbnail_jpeg_quality", "must be between 1 and 100"));
        }
        if !self.root_path.is_empty()
            && (!self.root_path.starts_with('/') || self.root_path.ends_with('/'))
        {
            return Err(invalid(
                "root_path",
                "must be empty or start with '/' and not end with '/'",
            ));
        }
        if self.max_header_bytes < 1024 {
            return Err(invalid("max_header_bytes", "must be at least 1024"));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs", "must be at least 1"));
        }
        Ok(())
    }

    pub fn login_expiry(&self) -> Duration {
        Duration::from_secs(self.login_expire_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
