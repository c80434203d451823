//! Environment-based configuration types for grantkeep server runtime settings.

use anyhow::Result;
use http::HeaderValue;
use std::time::Duration;

use crate::errors::ConfigError;

/// Origins allowed by CORS when `ALLOWED_ORIGINS` is not set
pub const DEFAULT_ALLOWED_ORIGINS: &str =
    "http://127.0.0.1:8883,http://localhost:8883,http://localhost:3000";

/// HTTP server port configuration
#[derive(Clone, Debug)]
pub struct HttpPort(u16);

/// Lifetime of an authorization code from the moment it is issued
#[derive(Clone, Debug)]
pub struct AuthorizationCodeExpiration(chrono::Duration);

/// Lifetime of an access/refresh token pair from the moment it is issued
#[derive(Clone, Debug)]
pub struct AccessTokenExpiration(chrono::Duration);

/// Upper bound on a single storage call
#[derive(Clone, Debug)]
pub struct StorageTimeout(Duration);

/// Maximum database pool size
#[derive(Clone, Debug)]
pub struct DatabaseMaxConnections(u32);

/// CORS allowed origins
#[derive(Clone, Debug)]
pub struct AllowedOrigins(Vec<HeaderValue>);

/// Interval between expired-row purges; `None` disables the reaper
#[derive(Clone, Debug)]
pub struct ReaperInterval(Option<Duration>);

/// Boolean flag accepting true/false/1/0/yes/no/on/off
#[derive(Clone, Debug)]
pub struct Flag(bool);

/// Main application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub version: String,
    pub http_port: HttpPort,
    pub external_base: String,
    pub storage_backend: String,
    pub database_url: Option<String>,
    pub database_max_connections: DatabaseMaxConnections,
    pub storage_timeout: StorageTimeout,
    pub authorization_code_expiration: AuthorizationCodeExpiration,
    pub access_token_expiration: AccessTokenExpiration,
    pub allowed_origins: AllowedOrigins,
    pub enable_client_api: Flag,
    pub reaper_interval: ReaperInterval,
}

impl Config {
    /// Create a new configuration from environment variables
    pub fn new() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvSource(lookup);

        let external_base = env.require("EXTERNAL_BASE")?;
        let http_port: HttpPort = env.default("HTTP_PORT", "8080").try_into()?;
        let storage_backend = env.default("STORAGE_BACKEND", "memory");
        let database_url = env.optional("DATABASE_URL");
        let database_max_connections: DatabaseMaxConnections =
            env.default("DATABASE_MAX_CONNECTIONS", "10").try_into()?;
        let storage_timeout: StorageTimeout = env.default("STORAGE_TIMEOUT", "5s").try_into()?;
        let authorization_code_expiration: AuthorizationCodeExpiration =
            env.default("AUTHORIZATION_CODE_EXPIRATION", "10m").try_into()?;
        let access_token_expiration: AccessTokenExpiration =
            env.default("ACCESS_TOKEN_EXPIRATION", "1h").try_into()?;
        let allowed_origins: AllowedOrigins = env
            .default("ALLOWED_ORIGINS", DEFAULT_ALLOWED_ORIGINS)
            .try_into()?;
        let enable_client_api: Flag = env.default("ENABLE_CLIENT_API", "false").try_into()?;
        let reaper_interval: ReaperInterval = env.default("REAPER_INTERVAL", "10m").try_into()?;

        Ok(Self {
            version: version()?,
            http_port,
            external_base: external_base.trim_end_matches('/').to_string(),
            storage_backend,
            database_url,
            database_max_connections,
            storage_timeout,
            authorization_code_expiration,
            access_token_expiration,
            allowed_origins,
            enable_client_api,
            reaper_interval,
        })
    }
}

/// Get application version from build environment
pub fn version() -> Result<String> {
    option_env!("GIT_HASH")
        .or(option_env!("CARGO_PKG_VERSION"))
        .map(|val| val.to_string())
        .ok_or(ConfigError::VersionNotSet.into())
}

struct EnvSource<F>(F);

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn require(&self, name: &str) -> Result<String> {
        self.optional(name)
            .ok_or_else(|| ConfigError::EnvVarRequired(name.to_string()).into())
    }

    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|value| !value.is_empty())
    }

    fn default(&self, name: &str, default_value: &str) -> String {
        self.optional(name)
            .unwrap_or_else(|| default_value.to_string())
    }
}

fn parse_duration(value: String) -> Result<Duration, ConfigError> {
    duration_str::parse(&value).map_err(|e| ConfigError::DurationParsingFailed(value, e.to_string()))
}

impl TryFrom<String> for HttpPort {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Ok(Self(8080))
        } else {
            value
                .parse::<u16>()
                .map(Self)
                .map_err(|err| ConfigError::PortParsingFailed(err).into())
        }
    }
}

impl AsRef<u16> for HttpPort {
    fn as_ref(&self) -> &u16 {
        &self.0
    }
}

impl TryFrom<String> for AuthorizationCodeExpiration {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let duration = parse_duration(value)?;
        Ok(Self(chrono::Duration::from_std(duration)?))
    }
}

impl AsRef<chrono::Duration> for AuthorizationCodeExpiration {
    fn as_ref(&self) -> &chrono::Duration {
        &self.0
    }
}

impl TryFrom<String> for AccessTokenExpiration {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let duration = parse_duration(value)?;
        Ok(Self(chrono::Duration::from_std(duration)?))
    }
}

impl AsRef<chrono::Duration> for AccessTokenExpiration {
    fn as_ref(&self) -> &chrono::Duration {
        &self.0
    }
}

impl TryFrom<String> for StorageTimeout {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(Self(parse_duration(value)?))
    }
}

impl AsRef<Duration> for StorageTimeout {
    fn as_ref(&self) -> &Duration {
        &self.0
    }
}

impl TryFrom<String> for DatabaseMaxConnections {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value
            .parse::<u32>()
            .map(Self)
            .map_err(|err| ConfigError::NumberParsingFailed(value, err).into())
    }
}

impl AsRef<u32> for DatabaseMaxConnections {
    fn as_ref(&self) -> &u32 {
        &self.0
    }
}

impl TryFrom<String> for AllowedOrigins {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let origins = value
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                HeaderValue::from_str(s).map_err(|_| ConfigError::InvalidOrigin(s.to_string()))
            })
            .collect::<Result<Vec<HeaderValue>, ConfigError>>()?;

        Ok(Self(origins))
    }
}

impl AsRef<Vec<HeaderValue>> for AllowedOrigins {
    fn as_ref(&self) -> &Vec<HeaderValue> {
        &self.0
    }
}

impl TryFrom<String> for ReaperInterval {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim() == "0" {
            return Ok(Self(None));
        }
        let duration = parse_duration(value)?;
        Ok(Self((!duration.is_zero()).then_some(duration)))
    }
}

impl AsRef<Option<Duration>> for ReaperInterval {
    fn as_ref(&self) -> &Option<Duration> {
        &self.0
    }
}

impl TryFrom<String> for Flag {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Self(true)),
            "false" | "0" | "no" | "off" => Ok(Self(false)),
            _ => Err(ConfigError::BoolParsingFailed(value).into()),
        }
    }
}

impl AsRef<bool> for Flag {
    fn as_ref(&self) -> &bool {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("EXTERNAL_BASE", "https://auth.example.com/")]).unwrap();

        assert_eq!(config.external_base, "https://auth.example.com");
        assert_eq!(*config.http_port.as_ref(), 8080);
        assert_eq!(config.storage_backend, "memory");
        assert!(config.database_url.is_none());
        assert_eq!(*config.database_max_connections.as_ref(), 10);
        assert_eq!(*config.storage_timeout.as_ref(), Duration::from_secs(5));
        assert_eq!(
            *config.authorization_code_expiration.as_ref(),
            chrono::Duration::seconds(600)
        );
        assert_eq!(
            *config.access_token_expiration.as_ref(),
            chrono::Duration::seconds(3600)
        );
        assert_eq!(config.allowed_origins.as_ref().len(), 3);
        assert!(!*config.enable_client_api.as_ref());
        assert_eq!(
            *config.reaper_interval.as_ref(),
            Some(Duration::from_secs(600))
        );
    }

    #[test]
    fn test_external_base_required() {
        let err = config_from(&[]).unwrap_err();
        assert!(err.to_string().contains("error-grantkeep-config-1"));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("EXTERNAL_BASE", "https://auth.example.com"),
            ("HTTP_PORT", "9000"),
            ("STORAGE_BACKEND", "sqlite"),
            ("DATABASE_URL", "sqlite://grantkeep.db"),
            ("AUTHORIZATION_CODE_EXPIRATION", "30s"),
            ("ACCESS_TOKEN_EXPIRATION", "2h"),
            ("ALLOWED_ORIGINS", "https://app.example.com"),
            ("ENABLE_CLIENT_API", "yes"),
            ("REAPER_INTERVAL", "0"),
        ])
        .unwrap();

        assert_eq!(*config.http_port.as_ref(), 9000);
        assert_eq!(config.storage_backend, "sqlite");
        assert_eq!(
            config.database_url.as_deref(),
            Some("sqlite://grantkeep.db")
        );
        assert_eq!(
            *config.authorization_code_expiration.as_ref(),
            chrono::Duration::seconds(30)
        );
        assert_eq!(
            *config.access_token_expiration.as_ref(),
            chrono::Duration::hours(2)
        );
        assert_eq!(config.allowed_origins.as_ref().len(), 1);
        assert!(*config.enable_client_api.as_ref());
        assert!(config.reaper_interval.as_ref().is_none());
    }

    #[test]
    fn test_invalid_values() {
        let port = config_from(&[("EXTERNAL_BASE", "https://a"), ("HTTP_PORT", "http")]);
        assert!(port.is_err());

        let duration = config_from(&[
            ("EXTERNAL_BASE", "https://a"),
            ("ACCESS_TOKEN_EXPIRATION", "forever"),
        ]);
        assert!(
            duration
                .unwrap_err()
                .to_string()
                .contains("error-grantkeep-config-4")
        );

        let flag = config_from(&[("EXTERNAL_BASE", "https://a"), ("ENABLE_CLIENT_API", "maybe")]);
        assert!(flag.is_err());
    }
}
