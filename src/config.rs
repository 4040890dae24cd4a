//! Server configuration from environment variables.
//!
//! - `BIND_ADDR` (default `0.0.0.0`), `PORT` (default `8080`)
//! - `JOURNAL_PATH`: when set, mutations are journaled to this file and replayed at startup
//! - `LIMIT_MARKETS`, `AUCTION_MARKETS`: comma-separated market ids created at startup
//! - `CREATE_MARKETS` (default `true`): whether a placement may create an unknown market.
//!   Set to `false` to serve only the configured markets.
//!
//! Log level comes from `RUST_LOG` (env_logger).

use std::path::PathBuf;
use thiserror::Error;

use crate::types::MarketId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    pub journal_path: Option<PathBuf>,
    pub limit_markets: Vec<MarketId>,
    pub auction_markets: Vec<MarketId>,
    pub create_markets: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            port: 8080,
            journal_path: None,
            limit_markets: Vec::new(),
            auction_markets: Vec::new(),
            create_markets: true,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let bind_addr = lookup("BIND_ADDR")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.bind_addr);
        let port = match lookup("PORT") {
            Some(v) => v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                name: "PORT",
                value: v.clone(),
            })?,
            None => defaults.port,
        };
        let journal_path = lookup("JOURNAL_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        let limit_markets = parse_markets("LIMIT_MARKETS", lookup("LIMIT_MARKETS"))?;
        let auction_markets = parse_markets("AUCTION_MARKETS", lookup("AUCTION_MARKETS"))?;
        let create_markets = match lookup("CREATE_MARKETS") {
            Some(v) => parse_bool("CREATE_MARKETS", &v)?,
            None => defaults.create_markets,
        };
        Ok(Self {
            bind_addr,
            port,
            journal_path,
            limit_markets,
            auction_markets,
            create_markets,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn parse_bool(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: raw.to_string(),
        }),
    }
}

fn parse_markets(name: &'static str, raw: Option<String>) -> Result<Vec<MarketId>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map(MarketId).map_err(|_| ConfigError::InvalidValue {
                name,
                value: s.to_string(),
            })
        })
        .collect()
}
