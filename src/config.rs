//! Configuration management for Strongbox Server

use serde::Deserialize;
use std::env;
use std::str::FromStr;

use crate::upload::{
    CipherMode, DEFAULT_CHUNK_SIZE, DEFAULT_REGISTRY_TTL_SECS, DEFAULT_STALE_MULTIPART_SECS,
    MAX_CONCURRENT_UPLOADS, MAX_FILE_SIZE,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    /// `None` when bucket or credentials are missing; uploads then fail
    /// with a configuration error instead of contacting S3.
    pub storage: Option<StorageConfig>,
    pub database: DatabaseConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Custom endpoint for MinIO, R2 and friends. AWS is used when unset.
    pub endpoint: Option<String>,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub chunk_size: usize,
    pub max_file_size: u64,
    pub max_concurrent: usize,
    pub cipher: CipherMode,
    pub registry_ttl_secs: u64,
    pub stale_multipart_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_file_size: MAX_FILE_SIZE,
            max_concurrent: MAX_CONCURRENT_UPLOADS,
            cipher: CipherMode::Cbc,
            registry_ttl_secs: DEFAULT_REGISTRY_TTL_SECS,
            stale_multipart_secs: DEFAULT_STALE_MULTIPART_SECS,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
            },
            storage: None,
            database: DatabaseConfig {
                url: "sqlite:./strongbox.db".to_string(),
            },
            upload: UploadConfig::default(),
        }
    }
}

/// Errors raised while reading configuration from the environment
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = UploadConfig::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("SERVER_PORT", 5000)?,
            },
            storage: storage_from_env(),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite:./strongbox.db".to_string()),
            },
            upload: UploadConfig {
                chunk_size: parse_positive("UPLOAD_CHUNK_SIZE", defaults.chunk_size)?,
                max_file_size: parse_var("UPLOAD_MAX_FILE_SIZE", defaults.max_file_size)?,
                max_concurrent: parse_positive("UPLOAD_MAX_CONCURRENT", defaults.max_concurrent)?,
                cipher: parse_var("UPLOAD_CIPHER", defaults.cipher)?,
                registry_ttl_secs: parse_var("UPLOAD_REGISTRY_TTL_SECS", defaults.registry_ttl_secs)?,
                stale_multipart_secs: parse_var(
                    "UPLOAD_STALE_MULTIPART_SECS",
                    defaults.stale_multipart_secs,
                )?,
            },
        })
    }
}

fn storage_from_env() -> Option<StorageConfig> {
    let non_empty = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());

    Some(StorageConfig {
        endpoint: non_empty("S3_ENDPOINT"),
        bucket: non_empty("S3_BUCKET")?,
        access_key: non_empty("S3_ACCESS_KEY")?,
        secret_key: non_empty("S3_SECRET_KEY")?,
        region: non_empty("S3_REGION"),
    })
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        _ => Ok(default),
    }
}

/// Like [`parse_var`], but zero is rejected
fn parse_positive(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    match parse_var(name, default)? {
        0 => Err(ConfigError::InvalidValue {
            name,
            value: "0".to_string(),
        }),
        value => Ok(value),
    }
}
