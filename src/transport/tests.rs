// test-only module included via transport/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::any::Any;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use super::socket::DatagramSocket;
use super::{Transport, TRANSPORT_FLAG_INSECURE_MODE};
use crate::config::NetworkConfig;
use crate::core::packet::{Packet, PacketFactory, StreamContext};
use crate::core::packet_types::PacketTypeSets;
use crate::core::processor::{PacketProcessor, ReadPacket};
use crate::error::{ProcessorError, Result};
use crate::utils::crypto::Key;
use crate::utils::metrics::TransportCounter;

#[derive(Debug)]
struct Marker {
    kind: usize,
    valid: bool,
}

impl Packet for Marker {
    fn packet_type(&self) -> usize {
        self.kind
    }
    fn is_valid(&self) -> bool {
        self.valid
    }
    fn serialize(&self, _: &mut Vec<u8>, _: &StreamContext<'_>) -> Result<()> {
        Ok(())
    }
    fn deserialize(&mut self, _: &[u8], _: &StreamContext<'_>) -> Result<()> {
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn marker(kind: usize) -> Box<dyn Packet> {
    Box::new(Marker { kind, valid: true })
}

struct MarkerFactory;

impl PacketFactory for MarkerFactory {
    fn create_packet(&self, packet_type: usize) -> Option<Box<dyn Packet>> {
        (packet_type < 3).then(|| marker(packet_type))
    }
    fn num_packet_types(&self) -> usize {
        3
    }
}

/// Processor that fails on demand and records what the transport asked of it
#[derive(Default)]
struct ScriptedProcessor {
    write_error: Option<ProcessorError>,
    read_error: Option<ProcessorError>,
    last_encrypt: Option<bool>,
    last_key: Option<Key>,
    buffer: Vec<u8>,
}

impl PacketProcessor for ScriptedProcessor {
    fn max_packet_size(&self) -> usize {
        64
    }

    fn write_packet(
        &mut self,
        packet: &dyn Packet,
        _sequence: u64,
        encrypt: bool,
        key: Option<&Key>,
        _ctx: &StreamContext<'_>,
    ) -> std::result::Result<&[u8], ProcessorError> {
        self.last_encrypt = Some(encrypt);
        self.last_key = key.copied();
        if let Some(error) = self.write_error {
            return Err(error);
        }
        self.buffer = vec![packet.packet_type() as u8];
        Ok(self.buffer.as_slice())
    }

    fn read_packet(
        &mut self,
        data: &[u8],
        _key: Option<&Key>,
        _types: PacketTypeSets<'_>,
        ctx: &StreamContext<'_>,
    ) -> std::result::Result<ReadPacket, ProcessorError> {
        if let Some(error) = self.read_error {
            return Err(error);
        }
        let packet = ctx
            .packet_factory
            .create_packet(usize::from(data[0]))
            .ok_or(ProcessorError::MalformedEncoding)?;
        Ok(ReadPacket {
            packet,
            sequence: 9,
            encrypted: false,
        })
    }
}

struct MemorySocket {
    address: SocketAddr,
    sent: Vec<(SocketAddr, Vec<u8>)>,
    inbox: VecDeque<(SocketAddr, Vec<u8>)>,
}

impl MemorySocket {
    fn new() -> Self {
        Self {
            address: peer(1),
            sent: Vec::new(),
            inbox: VecDeque::new(),
        }
    }
}

impl DatagramSocket for MemorySocket {
    fn local_addr(&self) -> SocketAddr {
        self.address
    }

    fn send_packet(&mut self, to: SocketAddr, data: &[u8]) {
        self.sent.push((to, data.to_vec()));
    }

    fn receive_packet(&mut self, buffer: &mut [u8]) -> Option<(SocketAddr, usize)> {
        let (from, data) = self.inbox.pop_front()?;
        buffer[..data.len()].copy_from_slice(&data);
        Some((from, data.len()))
    }

    fn has_pending(&mut self) -> bool {
        !self.inbox.is_empty()
    }
}

fn peer(port: u16) -> SocketAddr {
    SocketAddr::from(([192, 168, 0, 1], port))
}

fn scripted() -> Transport<MemorySocket, ScriptedProcessor> {
    let config = NetworkConfig::default_with_overrides(|c| {
        c.transport.send_queue_size = 4;
        c.transport.receive_queue_size = 4;
    });
    let mut transport =
        Transport::with_processor(MemorySocket::new(), ScriptedProcessor::default(), &config)
            .expect("transport");
    transport
        .set_packet_factory(Arc::new(MarkerFactory))
        .expect("factory");
    transport
}

#[test]
fn test_write_failures_map_to_counters() {
    let cases = [
        (ProcessorError::KeyMissing, TransportCounter::EncryptionMappingFailures),
        (ProcessorError::CryptoFailed, TransportCounter::EncryptPacketFailures),
        (ProcessorError::TooSmall, TransportCounter::WritePacketFailures),
        (ProcessorError::MalformedEncoding, TransportCounter::WritePacketFailures),
    ];

    for (error, counter) in cases {
        let mut transport = scripted();
        transport.processor.write_error = Some(error);

        transport.send_packet(peer(2), marker(0), 1, true);

        assert_eq!(transport.counter(counter), 1, "{error:?}");
        assert_eq!(transport.counter(TransportCounter::PacketsSent), 1);
        assert_eq!(transport.counter(TransportCounter::PacketsWritten), 0);
        assert!(transport.socket().sent.is_empty());
    }
}

#[test]
fn test_read_failures_map_to_counters() {
    let cases = [
        (ProcessorError::KeyMissing, TransportCounter::EncryptionMappingFailures),
        (ProcessorError::CryptoFailed, TransportCounter::DecryptPacketFailures),
        (ProcessorError::TooSmall, TransportCounter::PacketTooSmallFailures),
        (ProcessorError::MalformedEncoding, TransportCounter::ReadPacketFailures),
    ];

    for (error, counter) in cases {
        let mut transport = scripted();
        transport.processor.read_error = Some(error);
        transport.socket_mut().inbox.push_back((peer(2), vec![0]));
        transport.socket_mut().inbox.push_back((peer(2), vec![1]));

        transport.read_packets();

        assert_eq!(transport.counter(counter), 2, "{error:?}");
        assert_eq!(transport.counter(TransportCounter::PacketsRead), 0);
        assert!(transport.receive_packet().is_none());
        assert!(transport.socket().inbox.is_empty());
    }
}

#[test]
fn test_successful_write_and_read_counters() {
    let mut transport = scripted();
    transport.send_packet(peer(2), marker(2), 5, false);
    assert_eq!(transport.send_queue_len(), 1);
    assert!(transport.socket().sent.is_empty());

    transport.write_packets();
    assert_eq!(transport.socket().sent, vec![(peer(2), vec![2])]);
    assert_eq!(transport.counter(TransportCounter::PacketsWritten), 1);
    assert_eq!(transport.counter(TransportCounter::UnencryptedPacketsWritten), 1);

    transport.socket_mut().inbox.push_back((peer(3), vec![1]));
    transport.read_packets();
    let entry = transport.receive_packet().expect("entry");
    assert_eq!(entry.address, peer(3));
    assert_eq!(entry.sequence, 9);
    assert_eq!(entry.packet.packet_type(), 1);
    assert_eq!(transport.counter(TransportCounter::PacketsRead), 1);
    assert_eq!(transport.counter(TransportCounter::UnencryptedPacketsRead), 1);
    assert_eq!(transport.counter(TransportCounter::PacketsReceived), 1);
}

#[test]
fn test_encrypt_decision() {
    let key = [9u8; 32];

    // Secure mode: encrypted types always request encryption, key or not
    let mut transport = scripted();
    transport.enable_packet_encryption().unwrap();
    transport.send_packet(peer(2), marker(0), 0, true);
    assert_eq!(transport.processor.last_encrypt, Some(true));
    assert_eq!(transport.processor.last_key, None);

    // Insecure mode without a key falls back to plaintext
    transport.set_flags(TRANSPORT_FLAG_INSECURE_MODE);
    transport.send_packet(peer(2), marker(0), 0, true);
    assert_eq!(transport.processor.last_encrypt, Some(false));

    // Insecure mode with a key still encrypts
    assert!(transport.add_encryption_mapping(peer(2), &key, &[0; 32]));
    transport.send_packet(peer(2), marker(0), 0, true);
    assert_eq!(transport.processor.last_encrypt, Some(true));
    assert_eq!(transport.processor.last_key, Some(key));

    // Exempt types never encrypt
    transport.set_flags(0);
    transport.disable_encryption_for_packet_type(1).unwrap();
    transport.send_packet(peer(2), marker(1), 0, true);
    assert_eq!(transport.processor.last_encrypt, Some(false));
}

#[test]
fn test_invalid_sends_are_rejected() {
    let mut transport = scripted();

    transport.send_packet(peer(2), Box::new(Marker { kind: 0, valid: false }), 0, false);
    transport.send_packet(peer(2), marker(3), 0, false);
    transport.send_packet(SocketAddr::from(([0, 0, 0, 0], 4000)), marker(0), 0, false);
    transport.send_packet(SocketAddr::from(([10, 0, 0, 1], 0)), marker(0), 0, false);

    assert_eq!(transport.counter(TransportCounter::WritePacketFailures), 4);
    assert_eq!(transport.counter(TransportCounter::PacketsSent), 0);
    assert_eq!(transport.send_queue_len(), 0);
}

#[test]
fn test_send_queue_overflow() {
    let mut transport = scripted();
    for seq in 0..6 {
        transport.send_packet(peer(2), marker(0), seq, false);
    }

    assert_eq!(transport.counter(TransportCounter::PacketsSent), 4);
    assert_eq!(transport.counter(TransportCounter::SendQueueOverflow), 2);
    assert_eq!(transport.send_queue_len(), 4);
}

#[test]
fn test_without_factory() {
    let mut transport =
        Transport::with_processor(MemorySocket::new(), ScriptedProcessor::default(), &NetworkConfig::default())
            .unwrap();

    transport.send_packet(peer(2), marker(0), 0, false);
    assert_eq!(transport.counter(TransportCounter::WritePacketFailures), 1);
    assert!(transport.create_packet(0).is_none());
    assert!(transport.enable_packet_encryption().is_err());
    assert!(!transport.is_encrypted_packet_type(0));

    transport.socket_mut().inbox.push_back((peer(2), vec![0]));
    transport.read_packets();
    assert_eq!(transport.socket().inbox.len(), 1);
    assert!(transport.receive_packet().is_none());
}

#[test]
fn test_factory_attach_rules() {
    struct NoTypes;
    impl PacketFactory for NoTypes {
        fn create_packet(&self, _: usize) -> Option<Box<dyn Packet>> {
            None
        }
        fn num_packet_types(&self) -> usize {
            0
        }
    }

    let mut transport = scripted();
    assert!(transport.set_packet_factory(Arc::new(MarkerFactory)).is_err());

    transport.send_packet(peer(2), marker(0), 0, false);
    transport.clear_packet_factory();
    assert_eq!(transport.send_queue_len(), 0);
    assert!(transport.packet_factory().is_none());

    assert!(transport.set_packet_factory(Arc::new(NoTypes)).is_err());
    assert!(transport.set_packet_factory(Arc::new(MarkerFactory)).is_ok());
    assert!(!transport.is_encrypted_packet_type(0));
    assert!(transport.disable_encryption_for_packet_type(7).is_err());
}

#[test]
fn test_context_mapping_requires_matching_factory() {
    struct TwoTypes;
    impl PacketFactory for TwoTypes {
        fn create_packet(&self, _: usize) -> Option<Box<dyn Packet>> {
            None
        }
        fn num_packet_types(&self) -> usize {
            2
        }
    }

    let mut transport = scripted();
    let mismatched: Arc<dyn PacketFactory> = Arc::new(TwoTypes);
    let matching: Arc<dyn PacketFactory> = Arc::new(MarkerFactory);
    let pool = transport.stream_allocator().clone();

    assert!(!transport.add_context_mapping(peer(2), pool.clone(), &mismatched, None));
    assert!(transport.add_context_mapping(peer(2), pool.clone(), &matching, None));
    assert!(!transport.add_context_mapping(peer(2), pool, &matching, None));
    assert!(transport.remove_context_mapping(&peer(2)));
}

#[test]
fn test_time_and_counter_index() {
    let mut transport = scripted();
    transport.advance_time(1.5);
    transport.advance_time(1.5);
    assert_eq!(transport.time(), 1.5);

    assert_eq!(
        transport.counter_by_index(TransportCounter::PacketsSent.index()),
        Some(0)
    );
    assert_eq!(transport.counter_by_index(crate::utils::metrics::NUM_COUNTERS), None);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "transport time moved backwards")]
fn test_time_cannot_move_backwards() {
    let mut transport = scripted();
    transport.advance_time(2.0);
    transport.advance_time(1.0);
}

#[test]
fn test_stream_allocator_sized_by_processor() {
    let transport = scripted();
    assert_ne!(
        crate::config::DEFAULT_MAX_PACKET_SIZE,
        64,
        "scripted processor must differ from the config"
    );
    assert_eq!(transport.stream_allocator().buffer_capacity(), 64);
}
