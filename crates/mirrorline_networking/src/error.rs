//! # Network Error Types

use mirrorline_core::ReplicaError;
use thiserror::Error;

/// Errors raised by the transport, the server and the client.
#[derive(Error, Debug)]
pub enum NetError {
    /// Socket or file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame header announced more bytes than allowed.
    #[error("frame of {len} bytes exceeds the {limit} byte limit")]
    FrameTooLarge {
        /// Announced length.
        len: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The frame kind byte is neither text nor binary.
    #[error("unknown frame kind {0}")]
    UnknownFrameKind(u8),

    /// A text frame did not hold UTF-8.
    #[error("text frame is not valid UTF-8")]
    InvalidText,

    /// The peer went away.
    #[error("connection closed")]
    ConnectionClosed,

    /// The connect sequence did not go as expected.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// No room for another connection.
    #[error("server full ({0} clients)")]
    ServerFull(usize),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configuration file could not be parsed.
    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// The replication engine refused something.
    #[error(transparent)]
    Replica(#[from] ReplicaError),
}

/// Result type for networking operations.
pub type NetResult<T> = Result<T, NetError>;
