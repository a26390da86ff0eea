//! Environment-driven configuration.
//!
//! Every setting comes from the process environment (with `.env` support via
//! dotenvy in the binary). Settings without a default are required and
//! startup fails fast when they are missing.

use std::env;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::CoreError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub log_format: LogFormat,
    pub port: u16,
    /// Base URL used when building links placed into outbound email.
    pub base_url: String,
    pub database: DatabaseConfig,
    pub smtp: SmtpConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            other => Err(format!("unknown environment '{other}', expected dev or prod")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub ttl_hours: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, CoreError> {
        let environment: Environment = env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "dev".to_string())
            .parse()
            .map_err(CoreError::Config)?;

        let log_format = match get_env("LOG_FORMAT", Some("text"))?.as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Config {
            environment,
            service_name: get_env("SERVICE_NAME", Some("identity-service"))?,
            log_level: get_env("LOG_LEVEL", Some("info"))?,
            log_format,
            port: get_env("PORT", Some("9010"))?
                .parse()
                .map_err(|e| CoreError::Config(format!("invalid PORT: {e}")))?,
            base_url: get_env("BASE_URL", Some("http://localhost:9010"))?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None)?,
                max_connections: get_env("DATABASE_MAX_CONNECTIONS", Some("10"))?
                    .parse()
                    .map_err(|e| {
                        CoreError::Config(format!("invalid DATABASE_MAX_CONNECTIONS: {e}"))
                    })?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("localhost"))?,
                username: get_env("SMTP_USERNAME", Some(""))?,
                password: get_env("SMTP_PASSWORD", Some(""))?,
                from_address: get_env("SMTP_FROM", Some("no-reply@localhost"))?,
            },
            session: SessionConfig {
                ttl_hours: get_env("SESSION_TTL_HOURS", Some("24"))?
                    .parse()
                    .map_err(|e| CoreError::Config(format!("invalid SESSION_TTL_HOURS: {e}")))?,
            },
        })
    }
}

/// Read an environment variable, falling back to `default` when present.
/// A variable without a default is required and missing ones fail startup.
fn get_env(name: &str, default: Option<&str>) -> Result<String, CoreError> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => match default {
            Some(value) => Ok(value.to_string()),
            None => Err(CoreError::Config(format!(
                "required environment variable {name} is not set"
            ))),
        },
    }
}
