//! Configuration management for the skill Lambda.

use std::env;

/// Application configuration loaded from environment variables.
///
/// The Wyze credentials and phone id are required; their absence is a
/// startup-time fatal condition, not a per-request error.
#[derive(Debug, Clone)]
pub struct Config {
    /// Wyze account email
    pub username: String,
    /// Wyze account password
    pub password: String,
    /// Phone id registered with the Wyze API; also keys the settings table
    pub phone_id: String,
    /// DynamoDB table holding the persisted token pair
    pub tokens_table: String,
    /// Wyze API base URL
    pub api_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            username: env::var("WYZE_USERNAME")?,
            password: env::var("WYZE_PASSWORD")?,
            phone_id: env::var("PHONE_ID")?,
            tokens_table: env::var("TOKENS_TABLE").unwrap_or_else(|_| "WYZE_SETTINGS".to_string()),
            api_url: env::var("WYZE_API_URL")
                .unwrap_or_else(|_| crate::wyze::DEFAULT_API_URL.to_string()),
        })
    }
}
