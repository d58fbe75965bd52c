//! # Packet Processor
//!
//! Turns a typed packet into wire bytes and back. The transport drives a
//! [`PacketProcessor`] for every packet; the processor owns the wire format and
//! the cryptography, the transport owns the decisions (which key, which
//! context, whether to encrypt).
//!
//! [`AeadPacketProcessor`] is the default implementation, built on
//! ChaCha20-Poly1305.
//!
//! ## Wire Format
//! ```text
//! prefix(1)   encrypted bit 0x01 | sequence byte count (1..=8) << 4
//! sequence    little-endian, as many bytes as the prefix declares
//!
//! plaintext:  protocol_id(4, LE) | type(2, BE) | payload
//! encrypted:  AEAD(type(2, BE) | payload) | tag(16)
//!             nonce = sequence(8, LE) | 0(4), aad = protocol_id(4, LE) | prefix
//! ```
//!
//! Plaintext packets carry the protocol id in the clear; encrypted packets bind
//! it through the AAD so packets from another protocol fail authentication.

use bytes::{Buf, BufMut};
use tracing::trace;

use crate::core::packet::{Packet, StreamContext};
use crate::core::packet_types::PacketTypeSets;
use crate::error::ProcessorError;
use crate::utils::crypto::{self, Key, TAG_BYTES};

/// Prefix bit marking an encrypted packet
const PREFIX_ENCRYPTED: u8 = 0x01;

/// Bits of the prefix that must be zero
const PREFIX_RESERVED: u8 = 0x0E;

/// Size of the plaintext protocol id field
const PROTOCOL_ID_BYTES: usize = 4;

/// Size of the packet type field
const TYPE_BYTES: usize = 2;

/// A packet decoded by [`PacketProcessor::read_packet`]
#[derive(Debug)]
pub struct ReadPacket {
    pub packet: Box<dyn Packet>,
    pub sequence: u64,
    /// Whether the packet arrived encrypted
    pub encrypted: bool,
}

/// Serializes, encrypts, decrypts and deserializes packets
pub trait PacketProcessor {
    /// Largest datagram this processor writes or accepts
    fn max_packet_size(&self) -> usize;

    /// Serialize `packet` into wire bytes.
    ///
    /// The returned slice borrows the processor's internal buffer and is valid
    /// until the next call.
    fn write_packet(
        &mut self,
        packet: &dyn Packet,
        sequence: u64,
        encrypt: bool,
        key: Option<&Key>,
        ctx: &StreamContext<'_>,
    ) -> Result<&[u8], ProcessorError>;

    /// Decode one datagram, accepting only types allowed by `types`.
    fn read_packet(
        &mut self,
        data: &[u8],
        key: Option<&Key>,
        types: PacketTypeSets<'_>,
        ctx: &StreamContext<'_>,
    ) -> Result<ReadPacket, ProcessorError>;
}

/// ChaCha20-Poly1305 packet processor with a reusable wire buffer
#[derive(Debug)]
pub struct AeadPacketProcessor {
    protocol_id: u32,
    max_packet_size: usize,
    buffer: Vec<u8>,
}

impl AeadPacketProcessor {
    /// Create a processor bound to `protocol_id`
    ///
    /// # Panics
    /// Panics if `protocol_id` is zero.
    pub fn new(protocol_id: u32, max_packet_size: usize) -> Self {
        assert!(protocol_id != 0, "{}", crate::error::constants::ERR_ZERO_PROTOCOL_ID);
        Self {
            protocol_id,
            max_packet_size,
            buffer: Vec::with_capacity(max_packet_size),
        }
    }

    pub fn protocol_id(&self) -> u32 {
        self.protocol_id
    }

    #[inline]
    fn aad(&self, prefix: u8) -> [u8; PROTOCOL_ID_BYTES + 1] {
        let mut aad = [0u8; PROTOCOL_ID_BYTES + 1];
        aad[..PROTOCOL_ID_BYTES].copy_from_slice(&self.protocol_id.to_le_bytes());
        aad[PROTOCOL_ID_BYTES] = prefix;
        aad
    }
}

/// Minimal number of bytes needed to hold `sequence`, at least one
#[inline]
fn sequence_bytes(sequence: u64) -> usize {
    let significant = (64 - sequence.leading_zeros() as usize).div_ceil(8);
    significant.max(1)
}

impl PacketProcessor for AeadPacketProcessor {
    fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    fn write_packet(
        &mut self,
        packet: &dyn Packet,
        sequence: u64,
        encrypt: bool,
        key: Option<&Key>,
        ctx: &StreamContext<'_>,
    ) -> Result<&[u8], ProcessorError> {
        let key = match (encrypt, key) {
            (true, None) => return Err(ProcessorError::KeyMissing),
            (true, Some(key)) => Some(key),
            (false, _) => None,
        };

        let packet_type = packet.packet_type();
        if packet_type >= ctx.packet_factory.num_packet_types() {
            return Err(ProcessorError::MalformedEncoding);
        }
        let type_id = u16::try_from(packet_type).map_err(|_| ProcessorError::MalformedEncoding)?;

        let mut body = ctx.allocator.acquire();
        if let Err(e) = packet.serialize(&mut body, ctx) {
            trace!(packet_type, error = %e, "Packet serialization failed");
            return Err(ProcessorError::MalformedEncoding);
        }

        let seq_bytes = sequence_bytes(sequence);
        let header_len = 1 + seq_bytes;
        let total = match key {
            Some(_) => header_len + TYPE_BYTES + body.len() + TAG_BYTES,
            None => header_len + PROTOCOL_ID_BYTES + TYPE_BYTES + body.len(),
        };
        if total > self.max_packet_size {
            trace!(packet_type, total, max = self.max_packet_size, "Packet exceeds max size");
            return Err(ProcessorError::MalformedEncoding);
        }

        let prefix = ((seq_bytes as u8) << 4) | if key.is_some() { PREFIX_ENCRYPTED } else { 0 };
        self.buffer.clear();
        self.buffer.put_u8(prefix);
        self.buffer
            .extend_from_slice(&sequence.to_le_bytes()[..seq_bytes]);

        match key {
            Some(key) => {
                self.buffer.put_u16(type_id);
                self.buffer.extend_from_slice(&body);
                let aad = self.aad(prefix);
                let tag = crypto::seal_in_place(key, sequence, &aad, &mut self.buffer[header_len..])?;
                self.buffer.extend_from_slice(&tag);
            }
            None => {
                self.buffer.put_u32_le(self.protocol_id);
                self.buffer.put_u16(type_id);
                self.buffer.extend_from_slice(&body);
            }
        }

        Ok(self.buffer.as_slice())
    }

    fn read_packet(
        &mut self,
        data: &[u8],
        key: Option<&Key>,
        types: PacketTypeSets<'_>,
        ctx: &StreamContext<'_>,
    ) -> Result<ReadPacket, ProcessorError> {
        if data.len() > self.max_packet_size {
            return Err(ProcessorError::MalformedEncoding);
        }

        let (&prefix, rest) = data.split_first().ok_or(ProcessorError::TooSmall)?;
        if prefix & PREFIX_RESERVED != 0 {
            return Err(ProcessorError::MalformedEncoding);
        }
        let seq_bytes = (prefix >> 4) as usize;
        if !(1..=8).contains(&seq_bytes) {
            return Err(ProcessorError::MalformedEncoding);
        }
        if rest.len() < seq_bytes {
            return Err(ProcessorError::TooSmall);
        }

        let (seq_raw, body) = rest.split_at(seq_bytes);
        let mut seq_le = [0u8; 8];
        seq_le[..seq_bytes].copy_from_slice(seq_raw);
        let sequence = u64::from_le_bytes(seq_le);

        let encrypted = prefix & PREFIX_ENCRYPTED != 0;
        let mut plain: &[u8] = if encrypted {
            let key = key.ok_or(ProcessorError::KeyMissing)?;
            if body.len() < TYPE_BYTES + TAG_BYTES {
                return Err(ProcessorError::TooSmall);
            }
            let (ciphertext, tag) = body.split_at(body.len() - TAG_BYTES);
            let tag: [u8; TAG_BYTES] = tag
                .try_into()
                .map_err(|_| ProcessorError::MalformedEncoding)?;

            self.buffer.clear();
            self.buffer.extend_from_slice(ciphertext);
            let aad = self.aad(prefix);
            crypto::open_in_place(key, sequence, &aad, &mut self.buffer, &tag)?;
            &self.buffer
        } else {
            if body.len() < PROTOCOL_ID_BYTES + TYPE_BYTES {
                return Err(ProcessorError::TooSmall);
            }
            let mut cursor = body;
            if cursor.get_u32_le() != self.protocol_id {
                return Err(ProcessorError::MalformedEncoding);
            }
            cursor
        };

        let packet_type = plain.get_u16() as usize;
        if packet_type >= ctx.packet_factory.num_packet_types()
            || !types.accepts(packet_type, encrypted)
        {
            trace!(packet_type, encrypted, "Packet type not accepted");
            return Err(ProcessorError::MalformedEncoding);
        }

        let mut packet = ctx
            .packet_factory
            .create_packet(packet_type)
            .ok_or(ProcessorError::MalformedEncoding)?;
        if packet.packet_type() != packet_type {
            return Err(ProcessorError::MalformedEncoding);
        }
        if let Err(e) = packet.deserialize(plain, ctx) {
            trace!(packet_type, error = %e, "Packet deserialization failed");
            return Err(ProcessorError::MalformedEncoding);
        }

        Ok(ReadPacket {
            packet,
            sequence,
            encrypted,
        })
    }
}
