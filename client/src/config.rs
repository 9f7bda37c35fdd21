//! Application configuration loaded from environment variables.

use crate::errors::{ClientError, Result};

/// Application id of the deployed crowdfunding contract on TestNet.
pub const DEFAULT_APP_ID: u64 = 746_106_150;

/// Public algod endpoint used when none is configured.
pub const DEFAULT_ALGOD_URL: &str = "https://testnet-api.algonode.cloud";

#[derive(Debug, Clone)]
pub struct Config {
    /// Algod v2 REST endpoint (e.g. https://testnet-api.algonode.cloud)
    pub algod_url: String,
    /// API token for the algod endpoint; empty for public nodes
    pub algod_token: String,
    /// Application id of the crowdfunding contract
    pub app_id: u64,
    /// How many rounds to wait for a transaction before giving up
    pub max_wait_rounds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            algod_url: env_var("RISE_ALGOD_URL")
                .unwrap_or_else(|_| DEFAULT_ALGOD_URL.to_string()),
            algod_token: env_var("RISE_ALGOD_TOKEN").unwrap_or_default(),
            app_id: env_var("RISE_APP_ID")
                .unwrap_or_else(|_| DEFAULT_APP_ID.to_string())
                .parse()
                .map_err(|_| ClientError::Config("Invalid RISE_APP_ID".to_string()))?,
            max_wait_rounds: env_var("RISE_MAX_WAIT_ROUNDS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| ClientError::Config("Invalid RISE_MAX_WAIT_ROUNDS".to_string()))?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            algod_url: DEFAULT_ALGOD_URL.to_string(),
            algod_token: String::new(),
            app_id: DEFAULT_APP_ID,
            max_wait_rounds: 10,
        }
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ClientError::Config(format!("Missing env var: {key}")))
}
