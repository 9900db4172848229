// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Loaded once at startup. Services receive the sub-configuration they need
//! at construction time and never read the environment themselves.

use std::env;
use std::time::Duration;

/// Which user store backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    Memory,
}

/// Signing secrets and lifetimes for the two session tokens.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_token_secret: Vec<u8>,
    pub access_token_ttl: Duration,
    pub refresh_token_secret: Vec<u8>,
    pub refresh_token_ttl: Duration,
}

/// Cloudinary credentials and request bounds.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub timeout: Duration,
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy)]
pub struct HasherConfig {
    pub memory_cost: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            memory_cost: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// Frontend origin allowed by CORS
    pub frontend_url: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    pub store_backend: StoreBackend,
    pub tokens: TokenConfig,
    pub storage: StorageConfig,
    pub hasher: HasherConfig,
    /// Maximum accepted multipart body size in bytes
    pub max_upload_bytes: usize,
    /// Whether session cookies carry the `Secure` attribute
    pub cookie_secure: bool,
}

impl Config {
    /// Deterministic configuration for tests.
    pub fn test_default() -> Self {
        Self {
            port: 8080,
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            store_backend: StoreBackend::Memory,
            tokens: TokenConfig {
                access_token_secret: b"test_access_secret_32_bytes_min!!".to_vec(),
                access_token_ttl: Duration::from_secs(15 * 60),
                refresh_token_secret: b"test_refresh_secret_32_bytes_min!".to_vec(),
                refresh_token_ttl: Duration::from_secs(10 * 24 * 60 * 60),
            },
            storage: StorageConfig {
                cloud_name: "test-cloud".to_string(),
                api_key: "test_api_key".to_string(),
                api_secret: "test_api_secret".to_string(),
                timeout: Duration::from_secs(5),
            },
            // Cheap parameters so tests stay fast.
            hasher: HasherConfig {
                memory_cost: 1024,
                iterations: 1,
                parallelism: 1,
            },
            max_upload_bytes: 1024 * 1024,
            cookie_secure: true,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is read first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let store_backend = match env::var("USER_STORE")
            .unwrap_or_else(|_| "firestore".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "firestore" => StoreBackend::Firestore,
            "memory" => StoreBackend::Memory,
            _ => return Err(ConfigError::Invalid("USER_STORE")),
        };

        let tokens = TokenConfig {
            access_token_secret: required("ACCESS_TOKEN_SECRET")?.into_bytes(),
            access_token_ttl: duration_var("ACCESS_TOKEN_EXPIRY", "1h")?,
            refresh_token_secret: required("REFRESH_TOKEN_SECRET")?.into_bytes(),
            refresh_token_ttl: duration_var("REFRESH_TOKEN_EXPIRY", "10d")?,
        };

        if tokens.access_token_secret == tokens.refresh_token_secret {
            return Err(ConfigError::Invalid("REFRESH_TOKEN_SECRET"));
        }

        let storage = StorageConfig {
            cloud_name: required("CLOUDINARY_CLOUD_NAME")?,
            api_key: required("CLOUDINARY_API_KEY")?,
            api_secret: required("CLOUDINARY_API_SECRET")?,
            timeout: Duration::from_secs(parsed_var("STORAGE_TIMEOUT_SECS", 30)?),
        };

        let defaults = HasherConfig::default();
        let hasher = HasherConfig {
            memory_cost: parsed_var("ARGON2_MEMORY_COST", defaults.memory_cost)?,
            iterations: parsed_var("ARGON2_ITERATIONS", defaults.iterations)?,
            parallelism: parsed_var("ARGON2_PARALLELISM", defaults.parallelism)?,
        };

        Ok(Self {
            port: parsed_var("PORT", 8080)?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            store_backend,
            tokens,
            storage,
            hasher,
            max_upload_bytes: parsed_var("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
            cookie_secure: parsed_var("COOKIE_SECURE", true)?,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parsed_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

fn duration_var(name: &'static str, default: &str) -> Result<Duration, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    parse_duration(&raw).ok_or(ConfigError::Invalid(name))
}

/// Parse `"900"`, `"15m"`, `"1h"` or `"10d"` style durations.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().last()? {
        (idx, c) if c.is_ascii_alphabetic() => (&raw[..idx], c),
        _ => (raw, 's'),
    };

    let value: u64 = digits.parse().ok()?;
    let multiplier = match unit.to_ascii_lowercase() {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        _ => return None,
    };

    match value.checked_mul(multiplier)? {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("900"), Some(Duration::from_secs(900)));
        assert_eq!(parse_duration("15m"), Some(Duration::from_secs(900)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("10d"), Some(Duration::from_secs(864_000)));
        assert_eq!(parse_duration(" 2H "), Some(Duration::from_secs(7200)));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("d"), None);
        assert_eq!(parse_duration("10w"), None);
        assert_eq!(parse_duration("0"), None);
        assert_eq!(parse_duration("-5m"), None);
    }

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("ACCESS_TOKEN_SECRET", "access_secret");
        env::set_var("REFRESH_TOKEN_SECRET", "refresh_secret");
        env::set_var("CLOUDINARY_CLOUD_NAME", "demo");
        env::set_var("CLOUDINARY_API_KEY", "key");
        env::set_var("CLOUDINARY_API_SECRET", "secret");
        env::set_var("REFRESH_TOKEN_EXPIRY", "7d");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.port, 8080);
        assert_eq!(config.tokens.access_token_secret, b"access_secret");
        assert_eq!(
            config.tokens.refresh_token_ttl,
            Duration::from_secs(7 * 24 * 60 * 60)
        );
        assert_eq!(config.storage.cloud_name, "demo");
        assert!(config.cookie_secure);
    }
}
