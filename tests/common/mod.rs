//! Shared fixtures for integration tests
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::any::Any;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use packet_transport::config::NetworkConfig;
use packet_transport::core::packet::{decode_payload, encode_payload, Packet, PacketFactory, StreamContext};
use packet_transport::error::Result;
use packet_transport::transport::local::{LocalNetwork, LocalSocket};
use packet_transport::transport::Transport;

/// Number of packet types every test factory declares
pub const NUM_TYPES: usize = 4;

/// Packet with a byte payload; counts its own drops when tracked
#[derive(Debug)]
pub struct TestPacket {
    pub kind: usize,
    pub payload: Vec<u8>,
    pub valid: bool,
    /// Id of the factory that created this packet, zero when built by hand
    pub origin: u8,
    drops: Option<Arc<AtomicUsize>>,
}

impl TestPacket {
    pub fn new(kind: usize, payload: &[u8]) -> Box<dyn Packet> {
        Box::new(Self {
            kind,
            payload: payload.to_vec(),
            valid: true,
            origin: 0,
            drops: None,
        })
    }

    pub fn tracked(kind: usize, payload: &[u8], drops: &Arc<AtomicUsize>) -> Box<dyn Packet> {
        Box::new(Self {
            kind,
            payload: payload.to_vec(),
            valid: true,
            origin: 0,
            drops: Some(Arc::clone(drops)),
        })
    }
}

impl Packet for TestPacket {
    fn packet_type(&self) -> usize {
        self.kind
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn serialize(&self, out: &mut Vec<u8>, ctx: &StreamContext<'_>) -> Result<()> {
        // A `u8` context value is mixed into the payload so tests can see which context was used
        match ctx.data::<u8>() {
            Some(mask) => {
                let masked: Vec<u8> = self.payload.iter().map(|b| b ^ mask).collect();
                encode_payload(&masked, out)
            }
            None => encode_payload(&self.payload, out),
        }
    }

    fn deserialize(&mut self, input: &[u8], ctx: &StreamContext<'_>) -> Result<()> {
        let payload: Vec<u8> = decode_payload(input)?;
        self.payload = match ctx.data::<u8>() {
            Some(mask) => payload.iter().map(|b| b ^ mask).collect(),
            None => payload,
        };
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for TestPacket {
    fn drop(&mut self) {
        if let Some(drops) = &self.drops {
            drops.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Factory for [`TestPacket`]s stamped with its `origin` id
pub struct TestFactory {
    pub origin: u8,
    pub num_types: usize,
}

impl TestFactory {
    pub fn new(origin: u8) -> Arc<dyn PacketFactory> {
        Arc::new(Self {
            origin,
            num_types: NUM_TYPES,
        })
    }
}

impl PacketFactory for TestFactory {
    fn create_packet(&self, packet_type: usize) -> Option<Box<dyn Packet>> {
        if packet_type >= self.num_types {
            return None;
        }
        Some(Box::new(TestPacket {
            kind: packet_type,
            payload: Vec::new(),
            valid: true,
            origin: self.origin,
            drops: None,
        }))
    }

    fn num_packet_types(&self) -> usize {
        self.num_types
    }
}

/// Packet carrying a string, decoded through a length-prefixed serde field
#[derive(Debug, Default)]
pub struct NamedPacket {
    pub kind: usize,
    pub name: String,
}

impl NamedPacket {
    pub fn new(kind: usize, name: &str) -> Box<dyn Packet> {
        Box::new(Self {
            kind,
            name: name.to_string(),
        })
    }
}

impl Packet for NamedPacket {
    fn packet_type(&self) -> usize {
        self.kind
    }

    fn serialize(&self, out: &mut Vec<u8>, _: &StreamContext<'_>) -> Result<()> {
        encode_payload(&self.name, out)
    }

    fn deserialize(&mut self, input: &[u8], _: &StreamContext<'_>) -> Result<()> {
        self.name = decode_payload(input)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory for [`NamedPacket`]s
pub struct NamedFactory;

impl NamedFactory {
    pub fn new() -> Arc<dyn PacketFactory> {
        Arc::new(Self)
    }
}

impl PacketFactory for NamedFactory {
    fn create_packet(&self, packet_type: usize) -> Option<Box<dyn Packet>> {
        (packet_type < NUM_TYPES).then(|| {
            Box::new(NamedPacket {
                kind: packet_type,
                name: String::new(),
            }) as Box<dyn Packet>
        })
    }

    fn num_packet_types(&self) -> usize {
        NUM_TYPES
    }
}

/// Plaintext datagram for `packet_type` whose body is a string length prefix of `claimed_len`
pub fn hostile_string_datagram(protocol_id: u32, packet_type: u16, claimed_len: u64) -> Vec<u8> {
    let mut datagram = vec![0x10, 0x01];
    datagram.extend_from_slice(&protocol_id.to_le_bytes());
    datagram.extend_from_slice(&packet_type.to_be_bytes());
    datagram.extend_from_slice(&claimed_len.to_le_bytes());
    datagram.extend_from_slice(b"abc");
    datagram
}

pub fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Transport on `network` at `address` with a primary [`TestFactory`] (origin 0)
pub fn transport_at(
    network: &LocalNetwork,
    address: SocketAddr,
    config: &NetworkConfig,
) -> Transport<LocalSocket> {
    let mut transport = Transport::new(network.bind(address), config).expect("transport");
    transport
        .set_packet_factory(TestFactory::new(0))
        .expect("factory");
    transport
}

/// Transport on `network` at `address` with a primary [`NamedFactory`]
pub fn named_transport_at(
    network: &LocalNetwork,
    address: SocketAddr,
    config: &NetworkConfig,
) -> Transport<LocalSocket> {
    let mut transport = Transport::new(network.bind(address), config).expect("transport");
    transport
        .set_packet_factory(NamedFactory::new())
        .expect("factory");
    transport
}

/// Two connected transports at ports 1 and 2 with default config
pub fn pair(network: &LocalNetwork) -> (Transport<LocalSocket>, Transport<LocalSocket>) {
    let config = NetworkConfig::default();
    (
        transport_at(network, addr(1), &config),
        transport_at(network, addr(2), &config),
    )
}

/// Map matching keys in both directions between `a` and `b`
pub fn link_keys(a: &mut Transport<LocalSocket>, b: &mut Transport<LocalSocket>) {
    let a_to_b = [0xA1; 32];
    let b_to_a = [0xB2; 32];
    let (a_addr, b_addr) = (a.address(), b.address());
    assert!(a.add_encryption_mapping(b_addr, &a_to_b, &b_to_a));
    assert!(b.add_encryption_mapping(a_addr, &b_to_a, &a_to_b));
}

/// Payload and origin of a received test packet
pub fn unpack(packet: &dyn Packet) -> (Vec<u8>, u8) {
    let packet = packet.as_any().downcast_ref::<TestPacket>().expect("TestPacket");
    (packet.payload.clone(), packet.origin)
}
