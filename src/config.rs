use std::env;

use thiserror::Error;

use crate::blockchain::chain::DEFAULT_DIFFICULTY;

/// Environment variable holding the address to bind
pub const HOST_VAR: &str = "LEDGER_HOST";

/// Environment variable holding the port to bind
pub const PORT_VAR: &str = "LEDGER_PORT";

/// Environment variable holding the mining difficulty
pub const DIFFICULTY_VAR: &str = "LEDGER_DIFFICULTY";

/// A SHA-256 hex digest has 64 characters
pub const MAX_DIFFICULTY: u8 = 64;

/// Errors that can occur while reading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Server and ledger settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address the HTTP server binds to
    pub host: String,

    /// Port the HTTP server binds to
    pub port: u16,

    /// Number of leading zeros required in a block hash
    pub difficulty: u8,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            difficulty: DEFAULT_DIFFICULTY,
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment
    ///
    /// Unset variables fall back to the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(host) = lookup(HOST_VAR) {
            config.host = host;
        }

        if let Some(port) = lookup(PORT_VAR) {
            config.port = port.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidValue {
                    name: PORT_VAR,
                    value: port.clone(),
                    reason: e.to_string(),
                }
            })?;
        }

        if let Some(difficulty) = lookup(DIFFICULTY_VAR) {
            config.difficulty = parse_difficulty(&difficulty)?;
        }

        Ok(config)
    }
}

fn parse_difficulty(value: &str) -> Result<u8, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        name: DIFFICULTY_VAR,
        value: value.to_string(),
        reason,
    };

    let difficulty: u8 = value.trim().parse().map_err(|e: std::num::ParseIntError| invalid(e.to_string()))?;
    if difficulty > MAX_DIFFICULTY {
        return Err(invalid(format!("must be at most {}", MAX_DIFFICULTY)));
    }

    Ok(difficulty)
}
