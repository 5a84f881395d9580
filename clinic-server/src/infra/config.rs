use std::{collections::HashMap, env, str::FromStr, time::Duration};

use clinic_core::CoordinatorSettings;
use clinic_core::database::PoolSettings;
use clinic_core::media_store::CloudinarySettings;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Connection settings, the only part of [`Config`] a migration run needs.
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool: PoolSettings,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Self::from_vars(&Vars { lookup: &lookup })
    }

    fn from_vars(vars: &Vars<'_>) -> Result<Self, ConfigError> {
        let defaults = PoolSettings::default();
        Ok(Self {
            url: vars.required("DATABASE_URL")?,
            pool: PoolSettings {
                max_connections: vars.parse_or("DB_MAX_CONNECTIONS", defaults.max_connections)?,
                min_connections: vars.parse_or("DB_MIN_CONNECTIONS", defaults.min_connections)?,
                acquire_timeout: vars.duration_or("DB_ACQUIRE_TIMEOUT", defaults.acquire_timeout)?,
                statement_timeout: vars
                    .duration_or("DB_STATEMENT_TIMEOUT", defaults.statement_timeout)?,
            },
        })
    }
}

/// Server configuration loaded from environment variables (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Database settings
    pub database: DatabaseConfig,
    pub run_migrations: bool,

    // Media host
    pub media: CloudinarySettings,

    // Coordinator fan-out
    pub coordinator: CoordinatorSettings,

    /// Request body limit for the multipart routes.
    pub max_upload_bytes: usize,

    // CORS settings
    pub cors_allowed_origins: Vec<String>,

    // Development settings
    pub dev_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 5000,
            database: DatabaseConfig::default(),
            run_migrations: true,
            media: CloudinarySettings {
                api_base: "https://api.cloudinary.com/v1_1".to_string(),
                cloud_name: String::new(),
                api_key: String::new(),
                api_secret: String::new(),
                folder: "clinic_images".to_string(),
                request_timeout: Duration::from_secs(60),
            },
            coordinator: CoordinatorSettings::default(),
            max_upload_bytes: 20 * 1024 * 1024,
            cors_allowed_origins: Vec::new(),
            dev_mode: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars { lookup: &lookup };
        let defaults = Self::default();

        Ok(Self {
            server_host: vars.string_or("SERVER_HOST", &defaults.server_host),
            server_port: vars.parse_or("SERVER_PORT", defaults.server_port)?,

            database: DatabaseConfig::from_vars(&vars)?,
            run_migrations: vars.parse_or("RUN_MIGRATIONS", defaults.run_migrations)?,

            media: CloudinarySettings {
                api_base: vars.string_or("MEDIA_API_BASE", &defaults.media.api_base),
                cloud_name: vars.required("CLOUDINARY_CLOUD_NAME")?,
                api_key: vars.required("CLOUDINARY_API_KEY")?,
                api_secret: vars.required("CLOUDINARY_API_SECRET")?,
                folder: vars.string_or("MEDIA_FOLDER", &defaults.media.folder),
                request_timeout: vars
                    .duration_or("MEDIA_REQUEST_TIMEOUT", defaults.media.request_timeout)?,
            },

            coordinator: CoordinatorSettings {
                upload_concurrency: vars
                    .parse_or("UPLOAD_CONCURRENCY", defaults.coordinator.upload_concurrency)?,
                destroy_concurrency: vars
                    .parse_or("DESTROY_CONCURRENCY", defaults.coordinator.destroy_concurrency)?,
                read_concurrency: vars
                    .parse_or("READ_CONCURRENCY", defaults.coordinator.read_concurrency)?,
            },

            max_upload_bytes: vars.parse_or("MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,

            cors_allowed_origins: vars
                .get("CORS_ALLOWED_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),

            dev_mode: vars.parse_or("DEV_MODE", defaults.dev_mode)?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

struct Vars<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Vars<'_> {
    /// Blank values count as unset.
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn parse_or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn duration_or(&self, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => humantime::parse_duration(raw.trim()).map_err(|e| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
        }
    }
}
