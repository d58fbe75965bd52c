//! # Error Types
//!
//! Error handling for the packet transport.
//!
//! Two layers of errors live here:
//! - [`TransportError`]: returned by fallible setup operations (configuration,
//!   logging, construction). These bubble up to the caller with `?`.
//! - [`ProcessorError`]: the per-packet failure taxonomy reported by a
//!   [`PacketProcessor`](crate::core::processor::PacketProcessor). The pipeline
//!   never returns these to the application; it maps each one to a counter.
//!
//! ## Example Usage
//! ```rust
//! use packet_transport::config::NetworkConfig;
//! use packet_transport::error::Result;
//! use tracing::{error, info};
//!
//! fn load(content: &str) -> Result<NetworkConfig> {
//!     let config = NetworkConfig::from_toml(content)?;
//!     config.validate_strict()?;
//!     Ok(config)
//! }
//!
//! match load("[transport]\nprotocol_id = 7\n") {
//!     Ok(config) => info!(protocol_id = config.transport.protocol_id, "Config loaded"),
//!     Err(e) => error!(error = %e, "Config rejected"),
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Setup errors
    pub const ERR_ZERO_PROTOCOL_ID: &str = "Protocol id must be non-zero";
    pub const ERR_NO_PACKET_FACTORY: &str = "No packet factory attached";
    pub const ERR_NO_PACKET_TYPES: &str = "Packet factory declares no packet types";
    pub const ERR_PACKET_TYPE_MISMATCH: &str =
        "Packet factory declares a different number of packet types";

    /// Per-packet errors
    pub const ERR_KEY_MISSING: &str = "No encryption key for packet that requires one";
    pub const ERR_CRYPTO_FAILED: &str = "Packet encryption or decryption failed";
    pub const ERR_TOO_SMALL: &str = "Packet buffer too small";
    pub const ERR_MALFORMED: &str = "Packet encoding is malformed";
}

/// Primary error type for transport setup operations
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    #[serde(skip_serializing, skip_deserializing)]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    #[serde(skip_serializing, skip_deserializing)]
    Serialization(#[from] bincode::Error),

    #[error("Deserialize error: {0}")]
    DeserializeError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Packet factory error: {0}")]
    PacketFactoryError(String),

    #[error("Logging error: {0}")]
    LoggingError(String),
}

/// Failure reported by a packet processor for a single packet.
///
/// Every variant is terminal for that packet only.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessorError {
    #[error("{}", constants::ERR_KEY_MISSING)]
    KeyMissing,

    #[error("{}", constants::ERR_CRYPTO_FAILED)]
    CryptoFailed,

    #[error("{}", constants::ERR_TOO_SMALL)]
    TooSmall,

    #[error("{}", constants::ERR_MALFORMED)]
    MalformedEncoding,
}

/// Type alias for Results using TransportError
pub type Result<T> = std::result::Result<T, TransportError>;
