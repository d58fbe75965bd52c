//! # Core Packet Components
//!
//! The pieces a transport is assembled from, independent of any socket.
//!
//! ## Components
//! - **Packet**: the `Packet` / `PacketFactory` traits and the per-peer `StreamContext`
//! - **Queue**: fixed-capacity FIFO used for the send and receive queues
//! - **Packet Types**: per-type encryption classification
//! - **Processor**: wire format, serialization and AEAD
//!
//! ## Security
//! - Encrypted packet types are rejected when they arrive in plaintext
//! - Sequence numbers are authenticated through the AEAD nonce
//! - Datagram size is bounded by the processor's maximum packet size

pub mod packet;
pub mod packet_types;
pub mod processor;
pub mod queue;
