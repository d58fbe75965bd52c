//! # Utility Modules
//!
//! Supporting utilities for buffer reuse, cryptography, logging, and counters.
//!
//! ## Components
//! - **Buffer Pool**: reusable serialization buffers, shareable across transports
//! - **Crypto**: ChaCha20-Poly1305 AEAD primitives and key generation
//! - **Logging**: Structured logging configuration
//! - **Metrics**: Per-transport outcome counters
//!
//! ## Security
//! - Cryptographically secure RNG (getrandom)
//! - Memory zeroing for sensitive data (zeroize crate)

pub mod buffer_pool;
pub mod crypto;
pub mod logging;
pub mod metrics;
