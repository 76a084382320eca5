use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

use crate::retry::{RetryPolicy, DEFAULT_BASE_DELAY};

const MIN_SECRET_BYTES: usize = 16;

#[derive(Debug, Default, Parser)]
#[command(
    name = "myshop-rs",
    version,
    about = "MyShop session and onboarding service"
)]
pub struct Cli {
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,

    #[arg(long, value_name = "FILE")]
    pub accounts_file: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    #[arg(long, value_name = "COUNT")]
    pub retry_attempts: Option<u32>,

    /// Keep onboarding progress in memory instead of under the data dir.
    #[arg(long)]
    pub ephemeral: bool,

    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub accounts_file: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub session_secret: String,
    pub production: bool,
    pub ephemeral: bool,
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind", &self.bind)
            .field("accounts_file", &self.accounts_file)
            .field("data_dir", &self.data_dir)
            .field("session_secret", &"<redacted>")
            .field("production", &self.production)
            .field("ephemeral", &self.ephemeral)
            .field("retry", &self.retry)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config in {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid boolean value for env var {key}: {value}")]
    InvalidEnvBool { key: String, value: String },
    #[error("env var {key} is not valid unicode")]
    NonUnicodeEnv { key: String },
    #[error(
        "session secret missing; set MYSHOP_SESSION_SECRET or session_secret in the config file"
    )]
    MissingSecret,
    #[error("session secret must be at least 16 bytes")]
    WeakSecret,
    #[error("session secret must not start or end with whitespace")]
    SecretWhitespace,
    #[error("invalid retry_base_delay {value}: {source}")]
    InvalidDelay {
        value: String,
        source: humantime::DurationError,
    },
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    bind: Option<SocketAddr>,
    accounts_file: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    session_secret: Option<String>,
    production: Option<bool>,
    ephemeral: Option<bool>,
    retry_attempts: Option<u32>,
    retry_base_delay: Option<String>,
}

/// Values taken from the process environment, read once at startup.
#[derive(Debug, Default)]
struct EnvConfig {
    session_secret: Option<String>,
    production: Option<bool>,
}

impl EnvConfig {
    fn from_process() -> Result<Self, ConfigError> {
        Ok(Self {
            session_secret: read_env_string("MYSHOP_SESSION_SECRET")?,
            production: read_env_bool("MYSHOP_PRODUCTION")?,
        })
    }
}

impl AppConfig {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let from_file = read_file_config(cli.config.as_deref())?;
        let from_env = EnvConfig::from_process()?;
        Self::merge(cli, from_file, from_env)
    }

    fn merge(cli: Cli, file: FileConfig, env: EnvConfig) -> Result<Self, ConfigError> {
        let bind = cli
            .bind
            .or(file.bind)
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8080)));
        let accounts_file = cli.accounts_file.or(file.accounts_file);
        let data_dir = cli
            .data_dir
            .or(file.data_dir)
            .unwrap_or_else(|| PathBuf::from("./data"));

        let session_secret = env
            .session_secret
            .or(file.session_secret)
            .filter(|secret| !secret.is_empty())
            .ok_or(ConfigError::MissingSecret)?;
        if session_secret.trim() != session_secret {
            return Err(ConfigError::SecretWhitespace);
        }
        if session_secret.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::WeakSecret);
        }

        let base_delay = match file.retry_base_delay {
            Some(raw) => {
                humantime::parse_duration(&raw).map_err(|source| ConfigError::InvalidDelay {
                    value: raw.clone(),
                    source,
                })?
            }
            None => DEFAULT_BASE_DELAY,
        };
        let retry = RetryPolicy {
            max_attempts: cli
                .retry_attempts
                .or(file.retry_attempts)
                .unwrap_or(RetryPolicy::default().max_attempts)
                .max(1),
            base_delay,
        };

        Ok(Self {
            bind,
            accounts_file,
            data_dir,
            session_secret,
            production: env.production.or(file.production).unwrap_or(false),
            ephemeral: cli.ephemeral || file.ephemeral.unwrap_or(false),
            retry,
        })
    }

    /// Session cookies carry `Secure` only in production.
    pub fn secure_cookies(&self) -> bool {
        self.production
    }
}

fn read_file_config(path: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };

    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn read_env_string(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::NonUnicodeEnv {
            key: String::from(key),
        }),
    }
}

fn read_env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match read_env_string(key)? {
        Some(value) => parse_bool_value(key, &value).map(Some),
        None => Ok(None),
    }
}

fn parse_bool_value(key: &str, raw: &str) -> Result<bool, ConfigError> {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvBool {
            key: String::from(key),
            value: String::from(raw),
        }),
    }
}
