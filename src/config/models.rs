// src/config/models.rs
use crate::health::CompositeChecker;
use crate::probes::{TcpChecker, UrlChecker};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Checker #{0} has an empty name")]
    EmptyCheckerName(usize),

    #[error("Status path must start with '/': {0}")]
    InvalidPath(String),

    #[error("Checker {0} has a zero timeout")]
    ZeroTimeout(String),

    #[error("Checker {name} has an invalid HTTP method: {method}")]
    InvalidMethod { name: String, method: String },

    #[error("Checker {name} has an invalid expected status code: {code}")]
    InvalidStatusCode { name: String, code: u16 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    #[serde(default = "default_path")]
    pub path: String,

    /// Zero disables background refresh: every request evaluates live.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    #[serde(default)]
    pub info: BTreeMap<String, Value>,

    #[serde(default)]
    pub checkers: Vec<CheckerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckerConfig {
    pub name: String,

    #[serde(flatten)]
    pub kind: CheckerKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckerKind {
    Tcp {
        addr: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    Url {
        url: Url,
        #[serde(default = "default_method")]
        method: String,
        #[serde(default = "default_status_code")]
        expect_status_code: u16,
        #[serde(default)]
        expect_body_contains: Option<String>,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_path() -> String {
    "/health".to_string()
}

fn default_refresh_interval_secs() -> u64 {
    10
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_status_code() -> u16 {
    200
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.path.starts_with('/') {
            return Err(ConfigError::InvalidPath(self.path.clone()));
        }

        for (index, checker) in self.checkers.iter().enumerate() {
            if checker.name.trim().is_empty() {
                return Err(ConfigError::EmptyCheckerName(index));
            }
            checker.validate()?;
        }

        Ok(())
    }

    /// `None` when background refresh is disabled.
    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }

    /// Builds an aggregator with every configured probe and static info.
    /// Expects a config that passed [`Config::validate`].
    pub fn build_checker(&self) -> Result<CompositeChecker, ConfigError> {
        let client = Client::new();
        let mut composite = CompositeChecker::new();

        for (key, value) in &self.info {
            composite.add_info(key.clone(), value.clone());
        }

        for checker in &self.checkers {
            match &checker.kind {
                CheckerKind::Tcp { addr, .. } => {
                    composite.add_checker(checker.name.clone(), TcpChecker::new(addr.clone(), checker.timeout()));
                }
                CheckerKind::Url {
                    url,
                    method,
                    expect_status_code,
                    expect_body_contains,
                    ..
                } => {
                    let mut probe = UrlChecker::with_timeout(url.clone(), checker.timeout())
                        .method(parse_method(&checker.name, method)?)
                        .expect_status_code(parse_status_code(&checker.name, *expect_status_code)?)
                        .with_client(client.clone());
                    if let Some(needle) = expect_body_contains {
                        probe = probe.expect_body_contains(needle.clone());
                    }
                    composite.add_checker(checker.name.clone(), probe);
                }
            }
        }

        Ok(composite)
    }
}

impl CheckerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout().is_zero() {
            return Err(ConfigError::ZeroTimeout(self.name.clone()));
        }
        if let CheckerKind::Url {
            method,
            expect_status_code,
            ..
        } = &self.kind
        {
            parse_method(&self.name, method)?;
            parse_status_code(&self.name, *expect_status_code)?;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        match self.kind {
            CheckerKind::Tcp { timeout_secs, .. } | CheckerKind::Url { timeout_secs, .. } => {
                Duration::from_secs(timeout_secs)
            }
        }
    }
}

fn parse_method(name: &str, raw: &str) -> Result<Method, ConfigError> {
    Method::from_str(&raw.to_ascii_uppercase()).map_err(|_| ConfigError::InvalidMethod {
        name: name.to_string(),
        method: raw.to_string(),
    })
}

fn parse_status_code(name: &str, code: u16) -> Result<StatusCode, ConfigError> {
    StatusCode::from_u16(code).map_err(|_| ConfigError::InvalidStatusCode {
        name: name.to_string(),
        code,
    })
}
