#![no_main]

use std::any::Any;

use libfuzzer_sys::fuzz_target;
use packet_transport::core::packet::{decode_payload, encode_payload, Packet, PacketFactory, StreamContext};
use packet_transport::core::packet_types::PacketTypeTable;
use packet_transport::core::processor::{AeadPacketProcessor, PacketProcessor};
use packet_transport::utils::buffer_pool::BufferPool;

#[derive(Debug, Default)]
struct Bytes(Vec<u8>);

impl Packet for Bytes {
    fn packet_type(&self) -> usize {
        0
    }
    fn serialize(&self, out: &mut Vec<u8>, _: &StreamContext<'_>) -> packet_transport::Result<()> {
        encode_payload(&self.0, out)
    }
    fn deserialize(&mut self, input: &[u8], _: &StreamContext<'_>) -> packet_transport::Result<()> {
        self.0 = decode_payload(input)?;
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Default)]
struct Named(String);

impl Packet for Named {
    fn packet_type(&self) -> usize {
        1
    }
    fn serialize(&self, out: &mut Vec<u8>, _: &StreamContext<'_>) -> packet_transport::Result<()> {
        encode_payload(&self.0, out)
    }
    fn deserialize(&mut self, input: &[u8], _: &StreamContext<'_>) -> packet_transport::Result<()> {
        self.0 = decode_payload(input)?;
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct Factory;

impl PacketFactory for Factory {
    fn create_packet(&self, packet_type: usize) -> Option<Box<dyn Packet>> {
        match packet_type {
            0 => Some(Box::new(Bytes::default()) as Box<dyn Packet>),
            1 => Some(Box::new(Named::default()) as Box<dyn Packet>),
            _ => None,
        }
    }
    fn num_packet_types(&self) -> usize {
        2
    }
}

fuzz_target!(|data: &[u8]| {
    // Datagram decoding must reject garbage without panicking, keyed or not
    let pool = BufferPool::new(1, 1200);
    let ctx = StreamContext {
        allocator: &pool,
        packet_factory: &Factory,
        context_data: None,
    };
    let mut table = PacketTypeTable::new(2);
    table.enable_encryption_for_all();
    table.disable_encryption_for(0);

    let mut processor = AeadPacketProcessor::new(0x1234_5678, 1200);
    let _ = processor.read_packet(data, None, table.accepted_sets(false), &ctx);
    let _ = processor.read_packet(data, Some(&[0u8; 32]), table.accepted_sets(true), &ctx);

    // Same bytes as the body of a plaintext string packet, so length prefixes are attacker-chosen
    let mut datagram = vec![0x10, 0x01];
    datagram.extend_from_slice(&0x1234_5678u32.to_le_bytes());
    datagram.extend_from_slice(&1u16.to_be_bytes());
    datagram.extend_from_slice(data);
    let _ = processor.read_packet(&datagram, None, table.accepted_sets(true), &ctx);
});
