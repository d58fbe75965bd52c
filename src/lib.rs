//! # Packet Transport
//!
//! An encrypted, sequenced datagram transport core. Applications hand typed
//! packets to a [`Transport`]; it serializes them, encrypts them with a per-peer
//! key, and writes them to a datagram socket. Incoming datagrams are
//! authenticated, decoded into packets and queued for the application.
//!
//! ## Layout
//! - [`core`]: packet traits, bounded queues, packet-type classification and
//!   the wire-format processor
//! - [`transport`]: the [`Transport`] pipeline, key and context directories,
//!   socket backends
//! - [`utils`]: buffer pool, crypto primitives, logging and counters
//! - [`config`]: TOML / environment configuration
//! - [`error`]: error types
//!
//! ## Quick Start
//! ```rust
//! use std::any::Any;
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//!
//! use packet_transport::config::NetworkConfig;
//! use packet_transport::core::packet::{decode_payload, encode_payload, Packet, PacketFactory, StreamContext};
//! use packet_transport::transport::local::LocalNetwork;
//! use packet_transport::transport::Transport;
//! use packet_transport::utils::crypto::generate_key;
//!
//! #[derive(Debug, Default)]
//! struct Ping(u32);
//!
//! impl Packet for Ping {
//!     fn packet_type(&self) -> usize { 0 }
//!     fn serialize(&self, out: &mut Vec<u8>, _: &StreamContext<'_>) -> packet_transport::Result<()> {
//!         encode_payload(&self.0, out)
//!     }
//!     fn deserialize(&mut self, input: &[u8], _: &StreamContext<'_>) -> packet_transport::Result<()> {
//!         self.0 = decode_payload(input)?;
//!         Ok(())
//!     }
//!     fn as_any(&self) -> &dyn Any { self }
//! }
//!
//! struct Factory;
//!
//! impl PacketFactory for Factory {
//!     fn create_packet(&self, packet_type: usize) -> Option<Box<dyn Packet>> {
//!         (packet_type == 0).then(|| Box::new(Ping::default()) as Box<dyn Packet>)
//!     }
//!     fn num_packet_types(&self) -> usize { 1 }
//! }
//!
//! # fn main() -> packet_transport::Result<()> {
//! let network = LocalNetwork::new();
//! let a_addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
//! let b_addr: SocketAddr = "127.0.0.1:5001".parse().unwrap();
//!
//! let config = NetworkConfig::default();
//! let mut a = Transport::new(network.bind(a_addr), &config)?;
//! let mut b = Transport::new(network.bind(b_addr), &config)?;
//!
//! let factory: Arc<dyn PacketFactory> = Arc::new(Factory);
//! for t in [&mut a, &mut b] {
//!     t.set_packet_factory(factory.clone())?;
//!     t.enable_packet_encryption()?;
//! }
//!
//! let (k1, k2) = (generate_key()?, generate_key()?);
//! a.add_encryption_mapping(b_addr, &k1, &k2);
//! b.add_encryption_mapping(a_addr, &k2, &k1);
//!
//! a.send_packet(b_addr, Box::new(Ping(7)), 1, false);
//! a.write_packets();
//! b.read_packets();
//!
//! let entry = b.receive_packet().expect("packet");
//! assert_eq!(entry.packet.downcast_ref::<Ping>().map(|p| p.0), Some(7));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod transport;
pub mod utils;

pub use crate::core::packet::{ContextData, Packet, PacketFactory, StreamContext};
pub use crate::core::processor::{AeadPacketProcessor, PacketProcessor, ReadPacket};
pub use crate::core::queue::PacketEntry;
pub use crate::error::{ProcessorError, Result, TransportError};
pub use crate::transport::socket::{DatagramSocket, UdpDatagramSocket};
pub use crate::transport::{Transport, TRANSPORT_FLAG_INSECURE_MODE};
pub use crate::utils::buffer_pool::BufferPool;
pub use crate::utils::metrics::TransportCounter;
