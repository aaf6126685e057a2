//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! field has a default so the server starts with no config file at all.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use tracing::warn;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub rewards: RewardsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Passive-income amounts per viewer state, and the cycle interval.
#[derive(Debug, Deserialize, Clone)]
pub struct RewardsConfig {
    #[serde(default = "default_reward_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_offline")]
    pub offline: i64,
    #[serde(default = "default_online")]
    pub online: i64,
    #[serde(default = "default_offline_subscriber")]
    pub offline_subscriber: i64,
    #[serde(default = "default_online_subscriber")]
    pub online_subscriber: i64,
    /// Tag each cycle's credits with a unique id, making a replayed cycle a
    /// no-op instead of a double award. Off by default to keep the historic
    /// behavior.
    #[serde(default)]
    pub tag_unique_ids: bool,
}

impl RewardsConfig {
    /// Amount one present viewer earns in a cycle.
    pub fn award(&self, online: bool, subscriber: bool) -> i64 {
        match (online, subscriber) {
            (false, false) => self.offline,
            (true, false) => self.online,
            (false, true) => self.offline_subscriber,
            (true, true) => self.online_subscriber,
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_database_url() -> String {
    "sqlite://scales.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_reward_interval() -> u64 {
    300
}

fn default_offline() -> i64 {
    3
}

fn default_online() -> i64 {
    7
}

fn default_offline_subscriber() -> i64 {
    5
}

fn default_online_subscriber() -> i64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reward_interval(),
            offline: default_offline(),
            online: default_online(),
            offline_subscriber: default_offline_subscriber(),
            online_subscriber: default_online_subscriber(),
            tag_unique_ids: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Load from `path`, or fall back to defaults when the file is absent.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if std::path::Path::new(path).exists() {
            Self::load(path)
        } else {
            warn!(path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }
}
