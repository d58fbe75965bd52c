//! # Configuration Management
//!
//! Centralized configuration for the packet transport.
//!
//! This module provides structured configuration for a transport instance:
//! queue capacities, packet size limits, mapping directory sizes and expiry,
//! and logging output.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides via `from_env()`
//!
//! ## Security Considerations
//! - The default mapping timeout (10s) bounds how long a silent peer keeps its keys
//! - Queue capacities are fixed for the transport lifetime; size them for peak bursts

use crate::error::{TransportError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default protocol id, mixed into every packet so unrelated traffic is rejected
pub const DEFAULT_PROTOCOL_ID: u32 = 0x1234_5678;

/// Default maximum size of a single datagram on the wire
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1200;

/// Default capacity of the send and receive queues
pub const DEFAULT_QUEUE_SIZE: usize = 1024;

/// Default number of pooled serialization buffers
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 64;

/// Default capacity of the encryption key directory
pub const MAX_ENCRYPTION_MAPPINGS: usize = 1024;

/// Default capacity of the context directory
pub const MAX_CONTEXT_MAPPINGS: usize = 1024;

/// Encryption mappings not accessed for this long are treated as absent
pub const ENCRYPTION_MAPPING_TIMEOUT: Duration = Duration::from_secs(10);

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Packet pipeline configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Encryption and context directory configuration
    #[serde(default)]
    pub mappings: MappingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| TransportError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| TransportError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| TransportError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(id) = std::env::var("PACKET_TRANSPORT_PROTOCOL_ID") {
            if let Ok(val) = id.parse::<u32>() {
                config.transport.protocol_id = val;
            }
        }

        if let Ok(size) = std::env::var("PACKET_TRANSPORT_MAX_PACKET_SIZE") {
            if let Ok(val) = size.parse::<usize>() {
                config.transport.max_packet_size = val;
            }
        }

        if let Ok(size) = std::env::var("PACKET_TRANSPORT_QUEUE_SIZE") {
            if let Ok(val) = size.parse::<usize>() {
                config.transport.send_queue_size = val;
                config.transport.receive_queue_size = val;
            }
        }

        if let Ok(timeout) = std::env::var("PACKET_TRANSPORT_MAPPING_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.mappings.encryption_mapping_timeout = Duration::from_millis(val);
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TransportError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| TransportError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.transport.validate());
        errors.extend(self.mappings.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(TransportError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Packet pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Protocol id bound into every packet (must be non-zero)
    pub protocol_id: u32,

    /// Maximum size in bytes of a single datagram
    pub max_packet_size: usize,

    /// Capacity of the outbound packet queue
    pub send_queue_size: usize,

    /// Capacity of the inbound packet queue
    pub receive_queue_size: usize,

    /// Number of serialization buffers pre-allocated in the stream allocator
    pub buffer_pool_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            protocol_id: DEFAULT_PROTOCOL_ID,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            send_queue_size: DEFAULT_QUEUE_SIZE,
            receive_queue_size: DEFAULT_QUEUE_SIZE,
            buffer_pool_size: DEFAULT_BUFFER_POOL_SIZE,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.protocol_id == 0 {
            errors.push(crate::error::constants::ERR_ZERO_PROTOCOL_ID.to_string());
        }

        // Header plus AEAD tag must fit with room for a payload
        if self.max_packet_size < 64 {
            errors.push("Max packet size too small (minimum: 64 bytes)".to_string());
        } else if self.max_packet_size > 65_507 {
            errors.push(format!(
                "Max packet size too large: {} bytes (maximum UDP payload: 65507)",
                self.max_packet_size
            ));
        }

        if self.send_queue_size == 0 {
            errors.push("Send queue size must be greater than 0".to_string());
        } else if self.send_queue_size > 1_000_000 {
            errors.push(format!(
                "Send queue size too large: {} (max recommended: 1,000,000)",
                self.send_queue_size
            ));
        }

        if self.receive_queue_size == 0 {
            errors.push("Receive queue size must be greater than 0".to_string());
        } else if self.receive_queue_size > 1_000_000 {
            errors.push(format!(
                "Receive queue size too large: {} (max recommended: 1,000,000)",
                self.receive_queue_size
            ));
        }

        if self.buffer_pool_size > 65_536 {
            errors.push(format!(
                "Buffer pool size too large: {} (max recommended: 65,536)",
                self.buffer_pool_size
            ));
        }

        errors
    }
}

/// Encryption and context directory configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Maximum number of live encryption mappings
    pub max_encryption_mappings: usize,

    /// Idle time after which an encryption mapping expires
    #[serde(with = "duration_serde")]
    pub encryption_mapping_timeout: Duration,

    /// Maximum number of context mappings
    pub max_context_mappings: usize,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            max_encryption_mappings: MAX_ENCRYPTION_MAPPINGS,
            encryption_mapping_timeout: ENCRYPTION_MAPPING_TIMEOUT,
            max_context_mappings: MAX_CONTEXT_MAPPINGS,
        }
    }
}

impl MappingConfig {
    /// Validate mapping configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_encryption_mappings == 0 {
            errors.push("Max encryption mappings must be greater than 0".to_string());
        } else if self.max_encryption_mappings > 1_000_000 {
            errors.push(format!(
                "Max encryption mappings too large: {} (max recommended: 1,000,000)",
                self.max_encryption_mappings
            ));
        }

        if self.encryption_mapping_timeout.as_millis() < 100 {
            errors.push("Encryption mapping timeout too short (minimum: 100ms)".to_string());
        } else if self.encryption_mapping_timeout.as_secs() > 3600 {
            errors.push("Encryption mapping timeout too long (maximum: 1 hour)".to_string());
        }

        if self.max_context_mappings == 0 {
            errors.push("Max context mappings must be greater than 0".to_string());
        } else if self.max_context_mappings > 1_000_000 {
            errors.push(format!(
                "Max context mappings too large: {} (max recommended: 1,000,000)",
                self.max_context_mappings
            ));
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("packet-transport"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
