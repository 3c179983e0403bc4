//! Host configuration and the validated form the session runs on.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_ANALYTICS_ENDPOINT: &str = "/api/analytics";
pub const DEFAULT_TICK_INTERVAL_MS: u32 = 200;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config is not valid json")]
    InvalidJson(#[from] serde_json::Error),
    #[error("contract address must be 0x followed by 40 hex digits: {value}")]
    InvalidContractAddress { value: String },
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: u32 },
}

/// Host-supplied configuration, usually passed to the wasm handle as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PulseTapConfig {
    pub contract_address: Option<String>,
    pub analytics_endpoint: String,
    pub page_url: String,
    pub tick_interval_ms: u32,
}

impl Default for PulseTapConfig {
    fn default() -> Self {
        Self {
            contract_address: None,
            analytics_endpoint: DEFAULT_ANALYTICS_ENDPOINT.to_string(),
            page_url: String::new(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
        }
    }
}

impl PulseTapConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// A missing or malformed contract address is not fatal: it leaves the
    /// on-chain check-in disabled.
    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidNonZero {
                field: "tick_interval_ms",
                value: self.tick_interval_ms,
            });
        }
        let contract = match self.contract_address.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => match ContractAddress::parse(raw) {
                Ok(address) => Some(address),
                Err(err) => {
                    warn!(%err, "check-in disabled");
                    None
                }
            },
        };
        let analytics_endpoint = if self.analytics_endpoint.trim().is_empty() {
            DEFAULT_ANALYTICS_ENDPOINT.to_string()
        } else {
            self.analytics_endpoint
        };
        Ok(ValidatedConfig {
            contract,
            analytics_endpoint,
            page_url: self.page_url,
            tick_interval_ms: self.tick_interval_ms,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedConfig {
    pub contract: Option<ContractAddress>,
    pub analytics_endpoint: String,
    pub page_url: String,
    pub tick_interval_ms: u32,
}

impl Default for ValidatedConfig {
    fn default() -> Self {
        Self {
            contract: None,
            analytics_endpoint: DEFAULT_ANALYTICS_ENDPOINT.to_string(),
            page_url: String::new(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
        }
    }
}

/// EVM contract address, kept in the caller's casing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContractAddress(String);

impl ContractAddress {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let valid = raw
            .strip_prefix("0x")
            .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()));
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(ConfigError::InvalidContractAddress {
                value: raw.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
