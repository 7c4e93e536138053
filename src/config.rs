//! Configuration manager for mediahub.
//!
//! Values come from `config.yaml` then from environment variables, which
//! take precedence. The resulting [`Configuration`] is built once at start
//! and handed to constructors.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use axum::extract::FromRef;
use serde::Deserialize;

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_NAME: &str = "mediahub";
const DEFAULT_PORT: u16 = 8000;

const ACCESS_TOKEN_SECRET: &str = "ACCESS_TOKEN_SECRET";
const ACCESS_TOKEN_EXPIRY: &str = "ACCESS_TOKEN_EXPIRY";
const REFRESH_TOKEN_SECRET: &str = "REFRESH_TOKEN_SECRET";
const REFRESH_TOKEN_EXPIRY: &str = "REFRESH_TOKEN_EXPIRY";

/// Upper bound for token lifetimes, one year.
pub const MAX_LIFETIME: u64 = 365 * 24 * 60 * 60;

/// Errors preventing the service from starting.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot parse `{path}`: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error(
        "invalid lifetime `{0}`, expected seconds or <n>s|m|h|d up to one year"
    )]
    Lifetime(String),
    #[error("access and refresh tokens must use different secrets")]
    SharedSecret,
    #[error("invalid port `{0}`")]
    Port(String),
}

#[derive(Debug, Clone)]
pub struct Configuration {
    /// Instance name, also used as token issuer.
    pub name: String,
    /// Listening port.
    pub port: u16,
    /// Related to JsonWebToken configuration.
    pub token: Token,
    /// Related to PostgreSQL configuration.
    pub postgres: Option<Postgres>,
    /// Related to Argon2 configuration.
    pub argon2: Option<Argon2>,
    /// Related to session cookies.
    pub cookie: Cookie,
}

fn default_name() -> String {
    DEFAULT_NAME.to_owned()
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// Cookie attributes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Cookie {
    /// Send cookies only over HTTPS.
    pub secure: bool,
}

impl Default for Cookie {
    fn default() -> Self {
        Self { secure: true }
    }
}

/// Json Web Token configuration.
///
/// Every field is required.
#[derive(Clone, PartialEq)]
pub struct Token {
    pub access_secret: String,
    pub access_lifetime: Lifetime,
    pub refresh_secret: String,
    pub refresh_lifetime: Lifetime,
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_secret", &"[REDACTED]")
            .field("access_lifetime", &self.access_lifetime)
            .field("refresh_secret", &"[REDACTED]")
            .field("refresh_lifetime", &self.refresh_lifetime)
            .finish()
    }
}

/// Token lifetime in seconds.
///
/// Parsed from an integer or from a string such as `15m` or `10d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawLifetime")]
pub struct Lifetime(u64);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLifetime {
    Seconds(u64),
    Text(String),
}

impl Lifetime {
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    fn checked(
        secs: Option<u64>,
        text: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        match secs {
            Some(secs) if (1..=MAX_LIFETIME).contains(&secs) => {
                Ok(Self(secs))
            },
            _ => Err(ConfigError::Lifetime(text.into())),
        }
    }
}

impl TryFrom<RawLifetime> for Lifetime {
    type Error = ConfigError;

    fn try_from(raw: RawLifetime) -> Result<Self, Self::Error> {
        match raw {
            RawLifetime::Seconds(secs) => {
                Self::checked(Some(secs), secs.to_string())
            },
            RawLifetime::Text(text) => text.parse(),
        }
    }
}

impl FromStr for Lifetime {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ConfigError::Lifetime(s.to_owned());

        let (digits, unit) = match s.char_indices().last() {
            Some((idx, c)) if c.is_ascii_alphabetic() => (&s[..idx], c),
            Some(_) => (s, 's'),
            None => return Err(invalid()),
        };
        let multiplier = match unit {
            's' => 1,
            'm' => 60,
            'h' => 60 * 60,
            'd' => 24 * 60 * 60,
            _ => return Err(invalid()),
        };

        let value = digits.parse::<u64>().map_err(|_| invalid())?;
        Self::checked(value.checked_mul(multiplier), s)
    }
}

/// Configuration file with every section optional, so that environment
/// variables can fill the gaps.
#[derive(Debug, Default, Deserialize)]
struct RawConfiguration {
    name: Option<String>,
    port: Option<u16>,
    token: Option<RawToken>,
    postgres: Option<Postgres>,
    argon2: Option<Argon2>,
    cookie: Option<Cookie>,
}

#[derive(Debug, Default, Deserialize)]
struct RawToken {
    access_secret: Option<String>,
    access_lifetime: Option<Lifetime>,
    refresh_secret: Option<String>,
    refresh_lifetime: Option<Lifetime>,
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

/// Loads configuration from a file and the process environment.
#[derive(Debug, Default)]
pub struct Loader {
    path: Option<PathBuf>,
}

impl Loader {
    /// Read the file at `path` instead of `config.yaml`.
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    /// Reads the configuration file, then applies environment overrides.
    ///
    /// A missing file is not an error; missing token settings are.
    pub fn read(self) -> Result<Arc<Configuration>, ConfigError> {
        let file_path = self
            .path
            .unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH).to_path_buf());

        let raw = match File::open(&file_path) {
            Ok(file) => serde_yaml::from_reader(file).map_err(|source| {
                ConfigError::Parse {
                    path: file_path.clone(),
                    source,
                }
            })?,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    path = %file_path.display(),
                    "configuration file not found, using environment only"
                );
                RawConfiguration::default()
            },
        };

        resolve(raw, |key| std::env::var(key).ok()).map(Arc::new)
    }

    /// Parses a YAML document, then applies overrides from `env`.
    pub fn from_yaml(
        yaml: &str,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Configuration, ConfigError> {
        let raw = serde_yaml::from_str(yaml).map_err(|source| {
            ConfigError::Parse {
                path: PathBuf::from("<inline>"),
                source,
            }
        })?;
        resolve(raw, env)
    }
}

fn resolve(
    raw: RawConfiguration,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Configuration, ConfigError> {
    let token = raw.token.unwrap_or_default();

    let secret = |key: &'static str, file: Option<String>| {
        env(key)
            .or(file)
            .filter(|secret| !secret.trim().is_empty())
            .ok_or(ConfigError::Missing(key))
    };
    let lifetime = |key: &'static str, file: Option<Lifetime>| {
        match env(key) {
            Some(value) => value.parse(),
            None => file.ok_or(ConfigError::Missing(key)),
        }
    };

    let token = Token {
        access_secret: secret(ACCESS_TOKEN_SECRET, token.access_secret)?,
        access_lifetime: lifetime(ACCESS_TOKEN_EXPIRY, token.access_lifetime)?,
        refresh_secret: secret(REFRESH_TOKEN_SECRET, token.refresh_secret)?,
        refresh_lifetime: lifetime(
            REFRESH_TOKEN_EXPIRY,
            token.refresh_lifetime,
        )?,
    };
    if token.access_secret == token.refresh_secret {
        return Err(ConfigError::SharedSecret);
    }

    let port = match env("PORT") {
        Some(port) => port.parse().map_err(|_| ConfigError::Port(port))?,
        None => raw.port.unwrap_or(DEFAULT_PORT),
    };

    Ok(Configuration {
        name: raw.name.unwrap_or_else(default_name),
        port,
        token,
        postgres: raw.postgres,
        argon2: raw.argon2,
        cookie: raw.cookie.unwrap_or_default(),
    })
}
