use dotenvy::dotenv;
use std::{env, str::FromStr, time::Duration};
use thiserror::Error;
use validator::{Validate, ValidationErrors};

use crate::middleware::RateLimitPolicy;

pub const GENERAL_LIMIT_MESSAGE: &str =
    "Too many requests from this IP, please try again after 15 minutes";
pub const CREATE_LIMIT_MESSAGE: &str =
    "Too many products created from this IP, please try again after an hour";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("{0} must be set when STORE_BACKEND=mongo")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Rejected(#[from] ValidationErrors),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Mongo,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StoreBackend::Mongo),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Validate)]
pub struct LimitConfig {
    #[validate(range(min = 1, message = "rate limit window must be at least one second"))]
    pub window_secs: u64,
    #[validate(range(min = 1, message = "rate limit must allow at least one request"))]
    pub max_requests: u32,
}

impl LimitConfig {
    pub fn policy(&self, message: &str, trust_proxy: bool) -> RateLimitPolicy {
        RateLimitPolicy {
            window: Duration::from_secs(self.window_secs),
            max_requests: self.max_requests,
            message: message.to_string(),
            trust_proxy,
        }
    }
}

/// Built once at startup and shared read-only by every worker.
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    #[validate(nested)]
    pub general_limit: LimitConfig,
    #[validate(nested)]
    pub create_limit: LimitConfig,
    #[validate(range(min = 1, message = "JSON_BODY_LIMIT must be positive"))]
    pub json_body_limit: usize,
    /// Trust `Forwarded` / `X-Forwarded-For` for the client address.
    pub trust_proxy: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            general_limit: LimitConfig {
                window_secs: 15 * 60,
                max_requests: 100,
            },
            create_limit: LimitConfig {
                window_secs: 60 * 60,
                max_requests: 5,
            },
            json_body_limit: 64 * 1024,
            trust_proxy: false,
        }
    }
}

impl SecurityConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|origin| origin == "*")
    }

    pub fn general_policy(&self) -> RateLimitPolicy {
        self.general_limit.policy(GENERAL_LIMIT_MESSAGE, self.trust_proxy)
    }

    pub fn create_policy(&self) -> RateLimitPolicy {
        self.create_limit.policy(CREATE_LIMIT_MESSAGE, self.trust_proxy)
    }
}

#[derive(Debug, Clone, Validate)]
pub struct AppConfig {
    #[validate(length(min = 1, message = "SERVER_HOST must not be empty"))]
    pub host: String,
    #[validate(range(min = 1, message = "SERVER_PORT must be between 1 and 65535"))]
    pub port: u16,
    pub store: StoreBackend,
    pub mongo: Option<MongoConfig>,
    #[validate(nested)]
    pub security: SecurityConfig,
    pub log_format: LogFormat,
    pub log_filter: String,
}

impl AppConfig {
    /// Reads the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = parse_or(&lookup, "STORE_BACKEND", StoreBackend::Mongo)?;
        let mongo = match store {
            StoreBackend::Mongo => Some(MongoConfig {
                uri: required(&lookup, "MONGO_URI")?,
                database: required(&lookup, "MONGO_DATABASE")?,
            }),
            StoreBackend::Memory => None,
        };

        let allowed_origins = lookup("ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_else(|| vec!["*".to_string()]);

        let defaults = SecurityConfig::default();
        let security = SecurityConfig {
            allowed_origins,
            general_limit: LimitConfig {
                window_secs: parse_or(
                    &lookup,
                    "RATE_LIMIT_WINDOW_SECS",
                    defaults.general_limit.window_secs,
                )?,
                max_requests: parse_or(
                    &lookup,
                    "RATE_LIMIT_MAX",
                    defaults.general_limit.max_requests,
                )?,
            },
            create_limit: LimitConfig {
                window_secs: parse_or(
                    &lookup,
                    "CREATE_RATE_LIMIT_WINDOW_SECS",
                    defaults.create_limit.window_secs,
                )?,
                max_requests: parse_or(
                    &lookup,
                    "CREATE_RATE_LIMIT_MAX",
                    defaults.create_limit.max_requests,
                )?,
            },
            json_body_limit: parse_or(&lookup, "JSON_BODY_LIMIT", defaults.json_body_limit)?,
            trust_proxy: parse_or(&lookup, "TRUST_PROXY", defaults.trust_proxy)?,
        };

        let config = AppConfig {
            host: lookup("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(&lookup, "SERVER_PORT", 8080)?,
            store,
            mongo,
            security,
            log_format: parse_or(&lookup, "LOG_FORMAT", LogFormat::Pretty)?,
            log_filter: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_for_memory_backend() {
        let config = load(&[("STORE_BACKEND", "memory")]).unwrap();
        assert_eq!(config.bind_address(), ("127.0.0.1".to_string(), 8080));
        assert_eq!(config.store, StoreBackend::Memory);
        assert!(config.mongo.is_none());
        assert_eq!(config.security, SecurityConfig::default());
        assert!(config.security.allows_any_origin());
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_mongo_requires_uri_and_database() {
        let err = load(&[("MONGO_DATABASE", "catalog")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("MONGO_URI")));

        let config = load(&[
            ("MONGO_URI", "mongodb://localhost:27017"),
            ("MONGO_DATABASE", "catalog"),
        ])
        .unwrap();
        assert_eq!(config.mongo.unwrap().database, "catalog");
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = load(&[("STORE_BACKEND", "memory"), ("SERVER_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SERVER_PORT", .. }));

        let err = load(&[("STORE_BACKEND", "memory"), ("SERVER_PORT", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Rejected(_)));

        let err = load(&[("STORE_BACKEND", "memory"), ("RATE_LIMIT_MAX", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Rejected(_)));
    }

    #[test]
    fn test_explicit_origins_and_policies() {
        let config = load(&[
            ("STORE_BACKEND", "memory"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example"),
            ("CREATE_RATE_LIMIT_MAX", "2"),
            ("TRUST_PROXY", "true"),
        ])
        .unwrap();
        assert_eq!(
            config.security.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert!(!config.security.allows_any_origin());

        let create = config.security.create_policy();
        assert_eq!(create.max_requests, 2);
        assert_eq!(create.window, Duration::from_secs(3600));
        assert_eq!(create.message, CREATE_LIMIT_MESSAGE);
        assert!(create.trust_proxy);
        assert_eq!(config.security.general_policy().message, GENERAL_LIMIT_MESSAGE);
    }
}
