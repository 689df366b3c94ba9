//! Broker configuration file. Grounded on
//! `rumblefrog-lrthrome/server/src/config.rs` (plain `serde::Deserialize`
//! structs mapped onto TOML tables) and on the teacher's
//! `coordinator/src/settings.rs` (`toml::from_str` plus a `Context`-wrapped
//! error). Unknown keys reject startup, the Rust equivalent of the original
//! Go `meta.Undecoded()` check in `sidekick.go`.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{BrokerError, BrokerResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Conf {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub address: String,
    pub web_root: String,
    pub base_url: String,
    #[serde(default = "default_http_timeout_secs")]
    pub read_timeout: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub write_timeout: u64,
    pub frontend: WebSocketConf,
    pub backend: WebSocketConf,
    pub auth: AuthConf,
    /// C4 is optional per spec.md §4.4; omitting this table disables
    /// token-based worker authentication and falls back to `auth` alone.
    #[serde(default)]
    pub token: Option<TokenConf>,
}

/// Placeholder worker keychain. Spec.md §4.3 notes the provided source uses
/// "a placeholder equality check" for Basic auth; we keep that shape rather
/// than inventing a credential store this system was never asked to own.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConf {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenConf {
    pub secret: String,
    pub audience: String,
    #[serde(default = "default_token_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_token_ttl_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebSocketConf {
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    pub max_message_size: u64,
    pub message_queue_size: usize,
    pub ping_interval: u64,
    pub pong_timeout: u64,
    pub write_timeout: u64,
    pub rate_limit: u32,
    pub rate_limit_burst: u32,
}

impl WebSocketConf {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_http_timeout_secs() -> u64 {
    10
}

impl Conf {
    pub async fn read(path: &Path) -> BrokerResult<Conf> {
        let data = tokio::fs::read_to_string(path)
            .await
            .map_err(BrokerError::Io)?;
        toml::from_str(&data).map_err(|e| BrokerError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_keys() {
        let toml = r#"
            address = "0.0.0.0:8080"
            web_root = "./web"
            base_url = "/bridge/"
            bogus_key = 1

            [auth]
            username = "worker"
            password = "secret"

            [frontend]
            read_buffer_size = 4096
            write_buffer_size = 4096
            max_message_size = 65536
            message_queue_size = 32
            ping_interval = 30
            pong_timeout = 60
            write_timeout = 10
            rate_limit = 10
            rate_limit_burst = 20

            [backend]
            read_buffer_size = 4096
            write_buffer_size = 4096
            max_message_size = 65536
            message_queue_size = 32
            ping_interval = 30
            pong_timeout = 60
            write_timeout = 10
            rate_limit = 10
            rate_limit_burst = 20
        "#;
        let err = toml::from_str::<Conf>(toml).unwrap_err();
        assert!(err.to_string().contains("bogus_key") || err.to_string().contains("unknown field"));
    }
}
