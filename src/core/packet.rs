//! # Packets and Packet Factories
//!
//! Application packets are trait objects identified by an integer type id. A
//! [`PacketFactory`] maps a type id to a freshly constructed packet; the packet
//! processor uses it to instantiate packets while reading, then fills them in
//! through [`Packet::deserialize`].
//!
//! Dropping a `Box<dyn Packet>` destroys the packet. The transport takes
//! ownership of every packet handed to it and drops it once it has been
//! written or rejected.
//!
//! ## Serde Packets
//! Most packets are plain data; [`encode_payload`] and [`decode_payload`] let
//! a packet implement its (de)serialization with bincode in two lines.
//!
//! ```rust
//! use packet_transport::core::packet::{decode_payload, encode_payload, Packet, StreamContext};
//! use packet_transport::error::Result;
//! use serde::{Deserialize, Serialize};
//! use std::any::Any;
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct Chat { text: String }
//!
//! impl Packet for Chat {
//!     fn packet_type(&self) -> usize { 0 }
//!     fn serialize(&self, out: &mut Vec<u8>, _: &StreamContext<'_>) -> Result<()> {
//!         encode_payload(self, out)
//!     }
//!     fn deserialize(&mut self, input: &[u8], _: &StreamContext<'_>) -> Result<()> {
//!         *self = decode_payload(input)?;
//!         Ok(())
//!     }
//!     fn as_any(&self) -> &dyn Any { self }
//! }
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, TransportError};
use crate::utils::buffer_pool::BufferPool;

/// Opaque per-transport or per-peer value made available to packet serialization
pub type ContextData = Arc<dyn Any + Send + Sync>;

/// Serialization context resolved for one remote address
#[derive(Clone, Copy)]
pub struct StreamContext<'a> {
    /// Allocator for serialization buffers
    pub allocator: &'a BufferPool,
    /// Factory used to instantiate packets while reading
    pub packet_factory: &'a dyn PacketFactory,
    /// Opaque user data (transport default or per-address override)
    pub context_data: Option<&'a (dyn Any + Send + Sync)>,
}

impl<'a> StreamContext<'a> {
    /// Downcast the opaque context data to a concrete type
    pub fn data<T: Any>(&self) -> Option<&'a T> {
        self.context_data.and_then(|d| d.downcast_ref::<T>())
    }
}

impl fmt::Debug for StreamContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamContext")
            .field("allocator", self.allocator)
            .field("num_packet_types", &self.packet_factory.num_packet_types())
            .field("has_context_data", &self.context_data.is_some())
            .finish()
    }
}

/// A typed application message carried by the transport
pub trait Packet: Any + fmt::Debug {
    /// Type id, in `0..factory.num_packet_types()`
    fn packet_type(&self) -> usize;

    /// Whether the packet is in a state fit to be sent
    fn is_valid(&self) -> bool {
        true
    }

    /// Append the packet body to `out`
    fn serialize(&self, out: &mut Vec<u8>, ctx: &StreamContext<'_>) -> Result<()>;

    /// Fill the packet from a body written by [`Packet::serialize`]
    fn deserialize(&mut self, input: &[u8], ctx: &StreamContext<'_>) -> Result<()>;

    /// Upcast for downcasting received packets to their concrete type
    fn as_any(&self) -> &dyn Any;
}

impl dyn Packet {
    /// Borrow the packet as its concrete type
    pub fn downcast_ref<T: Packet>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Instantiates packets by type id
pub trait PacketFactory {
    /// Construct an empty packet of `packet_type`, `None` if the type is unknown
    fn create_packet(&self, packet_type: usize) -> Option<Box<dyn Packet>>;

    /// Number of packet types this factory knows; ids are `0..n`
    fn num_packet_types(&self) -> usize;
}

/// Serialize a serde value with bincode, appending to `out`
pub fn encode_payload<T: Serialize>(value: &T, out: &mut Vec<u8>) -> Result<()> {
    bincode::serialize_into(out, value)?;
    Ok(())
}

/// Deserialize a bincode-encoded serde value, rejecting trailing bytes.
///
/// Length prefixes are bounded by the input size, so a hostile prefix fails
/// to decode instead of reserving memory it claims.
pub fn decode_payload<T: DeserializeOwned>(input: &[u8]) -> Result<T> {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(input.len() as u64)
        .reject_trailing_bytes()
        .deserialize(input)
        .map_err(|e| TransportError::DeserializeError(e.to_string()))
}
