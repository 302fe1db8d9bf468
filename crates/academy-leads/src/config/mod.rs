use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::workflows::leads::{PostConvertFailurePolicy, DEFAULT_QUALIFICATION_THRESHOLD};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub leads: LeadsConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = LogFormat::from_str(
            &env::var("APP_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
        );

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                format: log_format,
            },
            leads: LeadsConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Output layout for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
}

impl LogFormat {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" => Self::Pretty,
            _ => Self::Compact,
        }
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

/// Lead engine dials shared by every tenant served by this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadsConfig {
    /// Minimum score for a lead to count as sales-ready.
    pub qualification_threshold: u8,
    pub post_convert_failure_policy: PostConvertFailurePolicy,
}

impl LeadsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let qualification_threshold = match env::var("LEADS_QUALIFICATION_THRESHOLD") {
            Ok(raw) => raw
                .trim()
                .parse::<u8>()
                .ok()
                .filter(|value| *value <= 100)
                .ok_or(ConfigError::InvalidQualificationThreshold(raw))?,
            Err(_) => defaults.qualification_threshold,
        };

        let post_convert_failure_policy = match env::var("LEADS_POST_CONVERT_FAILURE_POLICY") {
            Ok(raw) => PostConvertFailurePolicy::from_label(&raw)
                .ok_or(ConfigError::InvalidFailurePolicy(raw))?,
            Err(_) => defaults.post_convert_failure_policy,
        };

        Ok(Self {
            qualification_threshold,
            post_convert_failure_policy,
        })
    }
}

impl Default for LeadsConfig {
    fn default() -> Self {
        Self {
            qualification_threshold: DEFAULT_QUALIFICATION_THRESHOLD,
            post_convert_failure_policy: PostConvertFailurePolicy::default(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidQualificationThreshold(String),
    InvalidFailurePolicy(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidQualificationThreshold(value) => write!(
                f,
                "LEADS_QUALIFICATION_THRESHOLD must be between 0 and 100 (got '{value}')"
            ),
            ConfigError::InvalidFailurePolicy(value) => write!(
                f,
                "LEADS_POST_CONVERT_FAILURE_POLICY must be 'compensate' or 'retain' (got '{value}')"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidQualificationThreshold(_)
            | ConfigError::InvalidFailurePolicy(_) => None,
        }
    }
}
