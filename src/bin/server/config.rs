//! Server configuration.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path of the SQLite storage file
    pub database: String,

    /// Welcome note sent with a confirmed presence
    pub welcome: String,

    /// Shared secret for the connection handshake; unset disables it
    pub secret: Option<String>,

    /// Seconds a client gets to answer the handshake challenge
    pub handshake_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: "server_storage.sqlite".to_string(),
            welcome: "chat-server confirm connection".to_string(),
            secret: None,
            handshake_timeout_secs: 5,
        }
    }
}

impl Config {
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }
}
