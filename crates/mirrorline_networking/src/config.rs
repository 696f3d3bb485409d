//! # Configuration
//!
//! Server and client settings, loaded from TOML. Every field is optional in
//! the file and falls back to the shared defaults.
//!
//! ```toml
//! bind_address = "0.0.0.0:7878"
//! tick_rate = 30
//! max_clients = 64
//! ```

use std::net::SocketAddr;
use std::path::Path;

use mirrorline_shared::constants::{
    DEFAULT_PORT, DEFAULT_SERVER_ADDR, FLOOR_HEIGHT, GRAVITY, MAX_CLIENTS, MAX_FRAME_SIZE,
    OUTBOUND_QUEUE_FRAMES, TICK_RATE,
};
use serde::Deserialize;

use crate::error::{NetError, NetResult};

/// Server configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_address: SocketAddr,
    /// Broadcast ticks per second.
    pub tick_rate: u32,
    /// Maximum number of concurrent clients.
    pub max_clients: usize,
    /// Vertical acceleration for bullets.
    pub gravity: f32,
    /// Bullets below this height are removed.
    pub floor_height: f32,
    /// Largest inbound frame accepted.
    pub max_frame_size: usize,
    /// Frames queued per client before it is dropped as too slow.
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            tick_rate: TICK_RATE,
            max_clients: MAX_CLIENTS,
            gravity: GRAVITY,
            floor_height: FLOOR_HEIGHT,
            max_frame_size: MAX_FRAME_SIZE,
            outbound_queue: OUTBOUND_QUEUE_FRAMES,
        }
    }
}

impl ServerConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// [`NetError::Config`] on syntax errors, [`NetError::InvalidConfig`]
    /// on out-of-range values.
    pub fn from_toml_str(text: &str) -> NetResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// [`NetError::Io`] if the file cannot be read, otherwise as
    /// [`ServerConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> NetResult<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// [`NetError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> NetResult<()> {
        if self.tick_rate == 0 || self.tick_rate > 1_000 {
            return Err(NetError::InvalidConfig(format!(
                "tick_rate must be in 1..=1000, got {}",
                self.tick_rate
            )));
        }
        if self.max_clients == 0 {
            return Err(NetError::InvalidConfig("max_clients must be positive".into()));
        }
        if !self.gravity.is_finite() || !self.floor_height.is_finite() {
            return Err(NetError::InvalidConfig("gravity and floor_height must be finite".into()));
        }
        if self.max_frame_size < 64 {
            return Err(NetError::InvalidConfig(format!(
                "max_frame_size must be at least 64, got {}",
                self.max_frame_size
            )));
        }
        // room for the id frame and the snapshot
        if self.outbound_queue < 2 {
            return Err(NetError::InvalidConfig(format!(
                "outbound_queue must be at least 2, got {}",
                self.outbound_queue
            )));
        }
        Ok(())
    }
}

/// Client configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Server address (`host:port`).
    pub server_address: String,
    /// Input batches sent per second.
    pub send_rate: u32,
    /// Largest inbound frame accepted.
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: DEFAULT_SERVER_ADDR.to_string(),
            send_rate: TICK_RATE,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl ClientConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// [`NetError::Config`] on syntax errors, [`NetError::InvalidConfig`]
    /// on out-of-range values.
    pub fn from_toml_str(text: &str) -> NetResult<Self> {
        let config: Self = toml::from_str(text)?;
        if config.send_rate == 0 {
            return Err(NetError::InvalidConfig("send_rate must be positive".into()));
        }
        Ok(config)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// [`NetError::Io`] if the file cannot be read, otherwise as
    /// [`ClientConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> NetResult<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        assert_eq!(ServerConfig::from_toml_str("").unwrap(), ServerConfig::default());
        assert_eq!(ClientConfig::from_toml_str("").unwrap(), ClientConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = ServerConfig::from_toml_str(
            r#"
            bind_address = "127.0.0.1:9000"
            tick_rate = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.bind_address.port(), 9000);
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.max_clients, MAX_CLIENTS);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            ServerConfig::from_toml_str("tick_rate = 0"),
            Err(NetError::InvalidConfig(_))
        ));
        assert!(matches!(
            ServerConfig::from_toml_str("tick_rate = \"fast\""),
            Err(NetError::Config(_))
        ));
        assert!(matches!(
            ServerConfig::from_toml_str("unknown_key = 1"),
            Err(NetError::Config(_))
        ));
        assert!(matches!(
            ServerConfig::from_toml_str("outbound_queue = 1"),
            Err(NetError::InvalidConfig(_))
        ));
        assert!(matches!(
            ClientConfig::from_toml_str("send_rate = 0"),
            Err(NetError::InvalidConfig(_))
        ));
    }
}
