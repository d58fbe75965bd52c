//! # Transport
//!
//! [`Transport`] sits between the application and a [`DatagramSocket`]. It
//! queues outgoing packets, serializes and encrypts them through a
//! [`PacketProcessor`], and on the way in decrypts, validates and queues
//! packets for the application to pop.
//!
//! Every per-packet failure (full queue, missing key, bad datagram) drops that
//! packet and bumps a [`TransportCounter`]; nothing on the packet path returns
//! an error or stops the pipeline.
//!
//! ## Components
//! - **Encryption**: per-address send/receive keys with idle expiry
//! - **Context**: per-address allocator, packet factory and user data
//! - **Socket**: UDP and in-process datagram backends
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use packet_transport::config::NetworkConfig;
//! use packet_transport::core::packet::PacketFactory;
//! use packet_transport::transport::{Transport, socket::UdpDatagramSocket};
//!
//! # fn run(factory: Arc<dyn PacketFactory>) -> packet_transport::error::Result<()> {
//! let socket = UdpDatagramSocket::bind("0.0.0.0:40000")?;
//! let mut transport = Transport::new(socket, &NetworkConfig::default())?;
//! transport.set_packet_factory(factory)?;
//! transport.enable_packet_encryption()?;
//!
//! loop {
//!     transport.read_packets();
//!     while let Some(entry) = transport.receive_packet() {
//!         // handle entry.packet from entry.address
//!     }
//!     transport.write_packets();
//! #   break;
//! }
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod encryption;
pub mod local;
pub mod socket;

#[cfg(test)]
mod tests;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::config::NetworkConfig;
use crate::core::packet::{ContextData, Packet, PacketFactory, StreamContext};
use crate::core::packet_types::PacketTypeTable;
use crate::core::processor::{AeadPacketProcessor, PacketProcessor};
use crate::core::queue::{BoundedQueue, PacketEntry};
use crate::error::{constants, ProcessorError, Result, TransportError};
use crate::utils::buffer_pool::BufferPool;
use crate::utils::crypto::Key;
use crate::utils::metrics::{Counters, TransportCounter};

use self::context::{ContextManager, ContextMapping};
use self::encryption::EncryptionManager;
use self::socket::DatagramSocket;

/// Accept plaintext for encrypted types and send them in plaintext when no
/// key is mapped. Development only.
pub const TRANSPORT_FLAG_INSECURE_MODE: u64 = 1;

/// Packet pipeline over one datagram socket
pub struct Transport<S: DatagramSocket, P: PacketProcessor = AeadPacketProcessor> {
    socket: S,
    processor: P,
    time: f64,
    flags: u64,
    context: Option<ContextData>,
    stream_allocator: BufferPool,
    packet_factory: Option<Arc<dyn PacketFactory>>,
    packet_types: Option<PacketTypeTable>,
    send_queue: BoundedQueue<PacketEntry>,
    receive_queue: BoundedQueue<PacketEntry>,
    encryption: EncryptionManager,
    contexts: ContextManager,
    counters: Counters,
    receive_buffer: Box<[u8]>,
}

impl<S: DatagramSocket> Transport<S> {
    /// Build a transport with the default ChaCha20-Poly1305 processor
    pub fn new(socket: S, config: &NetworkConfig) -> Result<Self> {
        config.validate_strict()?;
        let processor = AeadPacketProcessor::new(
            config.transport.protocol_id,
            config.transport.max_packet_size,
        );
        Ok(Self::assemble(socket, processor, config))
    }
}

impl<S: DatagramSocket, P: PacketProcessor> Transport<S, P> {
    /// Build a transport around a caller-supplied processor
    pub fn with_processor(socket: S, processor: P, config: &NetworkConfig) -> Result<Self> {
        config.validate_strict()?;
        Ok(Self::assemble(socket, processor, config))
    }

    fn assemble(socket: S, processor: P, config: &NetworkConfig) -> Self {
        let transport = &config.transport;
        let mappings = &config.mappings;
        let max_packet_size = processor.max_packet_size();
        // One spare byte so an oversized datagram is seen as oversized, not truncated
        let receive_buffer = vec![0u8; max_packet_size + 1].into_boxed_slice();

        info!(
            address = %socket.local_addr(),
            protocol_id = transport.protocol_id,
            max_packet_size,
            send_queue = transport.send_queue_size,
            receive_queue = transport.receive_queue_size,
            "Transport created"
        );

        Self {
            socket,
            processor,
            time: 0.0,
            flags: 0,
            context: None,
            stream_allocator: BufferPool::new(transport.buffer_pool_size, max_packet_size),
            packet_factory: None,
            packet_types: None,
            send_queue: BoundedQueue::new(transport.send_queue_size),
            receive_queue: BoundedQueue::new(transport.receive_queue_size),
            encryption: EncryptionManager::new(
                mappings.max_encryption_mappings,
                mappings.encryption_mapping_timeout,
            ),
            contexts: ContextManager::new(mappings.max_context_mappings),
            counters: Counters::new(),
            receive_buffer,
        }
    }

    /// Attach the primary packet factory.
    ///
    /// Every type starts unencrypted. Fails if a factory is already attached
    /// or the factory declares no packet types.
    pub fn set_packet_factory(&mut self, factory: Arc<dyn PacketFactory>) -> Result<()> {
        if self.packet_factory.is_some() {
            return Err(TransportError::PacketFactoryError(
                "Packet factory already attached; clear it first".into(),
            ));
        }
        let num_packet_types = factory.num_packet_types();
        if num_packet_types == 0 {
            return Err(TransportError::PacketFactoryError(
                constants::ERR_NO_PACKET_TYPES.into(),
            ));
        }
        if num_packet_types > usize::from(u16::MAX) + 1 {
            return Err(TransportError::PacketFactoryError(format!(
                "Packet factory declares {num_packet_types} types, at most 65536 fit the wire format"
            )));
        }

        self.packet_types = Some(PacketTypeTable::new(num_packet_types));
        self.packet_factory = Some(factory);
        info!(num_packet_types, "Packet factory attached");
        Ok(())
    }

    /// Detach the primary factory, dropping every queued packet
    pub fn clear_packet_factory(&mut self) {
        self.clear_send_queue();
        self.clear_receive_queue();
        self.packet_types = None;
        if self.packet_factory.take().is_some() {
            info!("Packet factory detached");
        }
    }

    pub fn packet_factory(&self) -> Option<&Arc<dyn PacketFactory>> {
        self.packet_factory.as_ref()
    }

    /// Create a packet of `packet_type` through the primary factory
    pub fn create_packet(&self, packet_type: usize) -> Option<Box<dyn Packet>> {
        self.packet_factory.as_ref()?.create_packet(packet_type)
    }

    /// Send a packet to `address`.
    ///
    /// With `immediate` the packet is written to the socket now; otherwise it
    /// waits in the send queue until [`write_packets`](Self::write_packets).
    /// Invalid packets, unsendable addresses and a full queue drop the packet.
    pub fn send_packet(
        &mut self,
        address: SocketAddr,
        packet: Box<dyn Packet>,
        sequence: u64,
        immediate: bool,
    ) {
        let Some(num_packet_types) = self.packet_factory.as_ref().map(|f| f.num_packet_types())
        else {
            warn!(%address, "send_packet without a packet factory");
            self.counters.increment(TransportCounter::WritePacketFailures);
            return;
        };

        let packet_type = packet.packet_type();
        if !packet.is_valid() || packet_type >= num_packet_types || !is_valid_address(&address) {
            debug!(%address, packet_type, "Dropping invalid packet");
            self.counters.increment(TransportCounter::WritePacketFailures);
            return;
        }

        if immediate {
            self.counters.increment(TransportCounter::PacketsSent);
            self.write_and_flush_packet(address, packet.as_ref(), sequence);
            return;
        }

        let entry = PacketEntry {
            sequence,
            address,
            packet,
        };
        match self.send_queue.push(entry) {
            Ok(()) => self.counters.increment(TransportCounter::PacketsSent),
            Err(rejected) => {
                debug!(%address, packet_type, "Send queue overflow");
                self.counters.increment(TransportCounter::SendQueueOverflow);
                drop(rejected);
            }
        }
    }

    /// Pop the next received packet
    pub fn receive_packet(&mut self) -> Option<PacketEntry> {
        self.packet_factory.as_ref()?;
        let entry = self.receive_queue.pop()?;
        self.counters.increment(TransportCounter::PacketsReceived);
        Some(entry)
    }

    /// Write every queued packet to the socket, oldest first
    #[instrument(level = "trace", skip(self))]
    pub fn write_packets(&mut self) {
        if self.packet_factory.is_none() {
            return;
        }
        while let Some(entry) = self.send_queue.pop() {
            self.write_and_flush_packet(entry.address, entry.packet.as_ref(), entry.sequence);
        }
    }

    /// Drain pending datagrams from the socket into the receive queue.
    ///
    /// Stops early when the receive queue is full; anything still pending
    /// stays in the socket for the next call.
    #[instrument(level = "trace", skip(self))]
    pub fn read_packets(&mut self) {
        let (Some(primary), Some(types)) =
            (self.packet_factory.as_deref(), self.packet_types.as_ref())
        else {
            return;
        };
        let type_sets = types.accepted_sets(self.flags & TRANSPORT_FLAG_INSECURE_MODE != 0);

        loop {
            if self.receive_queue.is_full() {
                if self.socket.has_pending() {
                    debug!(capacity = self.receive_queue.capacity(), "Receive queue overflow");
                    self.counters.increment(TransportCounter::ReceiveQueueOverflow);
                }
                break;
            }

            let Some((address, len)) = self.socket.receive_packet(&mut self.receive_buffer) else {
                break;
            };
            let data = &self.receive_buffer[..len];

            let key = self.encryption.receive_key(&address, self.time);
            let mapping = self.contexts.context(&address);
            let mapped_factory = mapping.and_then(ContextMapping::packet_factory);
            let ctx = stream_context(
                mapping,
                mapped_factory.as_deref(),
                primary,
                &self.stream_allocator,
                self.context.as_ref(),
            );

            match self.processor.read_packet(data, key, type_sets, &ctx) {
                Ok(read) => {
                    self.counters.increment(TransportCounter::PacketsRead);
                    self.counters.increment(if read.encrypted {
                        TransportCounter::EncryptedPacketsRead
                    } else {
                        TransportCounter::UnencryptedPacketsRead
                    });
                    let entry = PacketEntry {
                        sequence: read.sequence,
                        address,
                        packet: read.packet,
                    };
                    if self.receive_queue.push(entry).is_err() {
                        self.counters.increment(TransportCounter::ReceiveQueueOverflow);
                        break;
                    }
                }
                Err(error) => {
                    let counter = match error {
                        ProcessorError::KeyMissing => TransportCounter::EncryptionMappingFailures,
                        ProcessorError::CryptoFailed => TransportCounter::DecryptPacketFailures,
                        ProcessorError::TooSmall => TransportCounter::PacketTooSmallFailures,
                        ProcessorError::MalformedEncoding => TransportCounter::ReadPacketFailures,
                    };
                    debug!(%address, len, %error, "Dropping received datagram");
                    self.counters.increment(counter);
                }
            }
        }
    }

    fn write_and_flush_packet(&mut self, address: SocketAddr, packet: &dyn Packet, sequence: u64) {
        let (Some(primary), Some(types)) =
            (self.packet_factory.as_deref(), self.packet_types.as_ref())
        else {
            return;
        };

        let packet_type = packet.packet_type();
        let insecure = self.flags & TRANSPORT_FLAG_INSECURE_MODE != 0;
        let key = self.encryption.send_key(&address, self.time);
        let encrypt = types.is_encrypted(packet_type) && (!insecure || key.is_some());

        let mapping = self.contexts.context(&address);
        let mapped_factory = mapping.and_then(ContextMapping::packet_factory);
        let ctx = stream_context(
            mapping,
            mapped_factory.as_deref(),
            primary,
            &self.stream_allocator,
            self.context.as_ref(),
        );

        match self
            .processor
            .write_packet(packet, sequence, encrypt, key, &ctx)
        {
            Ok(bytes) => {
                self.socket.send_packet(address, bytes);
                self.counters.increment(TransportCounter::PacketsWritten);
                self.counters.increment(if encrypt {
                    TransportCounter::EncryptedPacketsWritten
                } else {
                    TransportCounter::UnencryptedPacketsWritten
                });
            }
            Err(error) => {
                let counter = match error {
                    ProcessorError::KeyMissing => TransportCounter::EncryptionMappingFailures,
                    ProcessorError::CryptoFailed => TransportCounter::EncryptPacketFailures,
                    ProcessorError::TooSmall | ProcessorError::MalformedEncoding => {
                        TransportCounter::WritePacketFailures
                    }
                };
                debug!(%address, packet_type, %error, "Dropping outgoing packet");
                self.counters.increment(counter);
            }
        }
    }

    /// Drop queued packets and every mapping
    pub fn reset(&mut self) {
        self.clear_send_queue();
        self.clear_receive_queue();
        self.encryption.reset_encryption_mappings();
        self.contexts.reset_context_mappings();
        info!(address = %self.socket.local_addr(), "Transport reset");
    }

    pub fn clear_send_queue(&mut self) {
        let dropped = self.send_queue.clear();
        if dropped > 0 {
            debug!(dropped, "Send queue cleared");
        }
    }

    pub fn clear_receive_queue(&mut self) {
        let dropped = self.receive_queue.clear();
        if dropped > 0 {
            debug!(dropped, "Receive queue cleared");
        }
    }

    /// Encrypt every packet type
    pub fn enable_packet_encryption(&mut self) -> Result<()> {
        self.packet_types_mut()?.enable_encryption_for_all();
        Ok(())
    }

    /// Send and accept `packet_type` in plaintext
    pub fn disable_encryption_for_packet_type(&mut self, packet_type: usize) -> Result<()> {
        if self.packet_types_mut()?.disable_encryption_for(packet_type) {
            Ok(())
        } else {
            Err(TransportError::PacketFactoryError(format!(
                "Packet type {packet_type} is out of range"
            )))
        }
    }

    pub fn is_encrypted_packet_type(&self, packet_type: usize) -> bool {
        self.packet_types
            .as_ref()
            .is_some_and(|types| types.is_encrypted(packet_type))
    }

    fn packet_types_mut(&mut self) -> Result<&mut PacketTypeTable> {
        self.packet_types.as_mut().ok_or_else(|| {
            TransportError::PacketFactoryError(constants::ERR_NO_PACKET_FACTORY.into())
        })
    }

    /// Map `address` to a key pair; an existing mapping is replaced
    pub fn add_encryption_mapping(
        &mut self,
        address: SocketAddr,
        send_key: &Key,
        receive_key: &Key,
    ) -> bool {
        self.encryption
            .add_encryption_mapping(address, send_key, receive_key, self.time)
    }

    pub fn remove_encryption_mapping(&mut self, address: &SocketAddr) -> bool {
        self.encryption.remove_encryption_mapping(address, self.time)
    }

    pub fn reset_encryption_mappings(&mut self) {
        self.encryption.reset_encryption_mappings();
    }

    /// Serialize traffic with `address` through its own allocator, factory and data.
    ///
    /// Requires an attached primary factory; `packet_factory` must declare the
    /// same number of packet types. The transport keeps only a weak reference
    /// to it, so remove the mapping before dropping the factory.
    pub fn add_context_mapping(
        &mut self,
        address: SocketAddr,
        allocator: BufferPool,
        packet_factory: &Arc<dyn PacketFactory>,
        context_data: Option<ContextData>,
    ) -> bool {
        let Some(primary) = self.packet_factory.as_ref() else {
            warn!(%address, "{}", constants::ERR_NO_PACKET_FACTORY);
            return false;
        };
        if packet_factory.num_packet_types() != primary.num_packet_types() {
            warn!(
                %address,
                expected = primary.num_packet_types(),
                got = packet_factory.num_packet_types(),
                "{}",
                constants::ERR_PACKET_TYPE_MISMATCH
            );
            return false;
        }
        self.contexts
            .add_context_mapping(address, allocator, packet_factory, context_data)
    }

    pub fn remove_context_mapping(&mut self, address: &SocketAddr) -> bool {
        self.contexts.remove_context_mapping(address)
    }

    pub fn reset_context_mappings(&mut self) {
        self.contexts.reset_context_mappings();
    }

    /// Advance logical time (seconds). Time never moves backwards.
    pub fn advance_time(&mut self, time: f64) {
        debug_assert!(time >= self.time, "transport time moved backwards");
        if time < self.time {
            warn!(current = self.time, requested = time, "Ignoring backwards time step");
            return;
        }
        self.time = time;
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn counter(&self, counter: TransportCounter) -> u64 {
        self.counters.get(counter)
    }

    /// Counter by raw index, `None` past the last defined counter
    pub fn counter_by_index(&self, index: usize) -> Option<u64> {
        self.counters.get_index(index)
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn log_counters(&self) {
        self.counters.log_counters();
    }

    pub fn set_flags(&mut self, flags: u64) {
        self.flags = flags;
    }

    pub fn flags(&self) -> u64 {
        self.flags
    }

    /// User data handed to packets of addresses without a context mapping
    pub fn set_context(&mut self, context: Option<ContextData>) {
        self.context = context;
    }

    pub fn context(&self) -> Option<&ContextData> {
        self.context.as_ref()
    }

    /// Allocator used for addresses without a context mapping
    pub fn set_stream_allocator(&mut self, allocator: BufferPool) {
        self.stream_allocator = allocator;
    }

    pub fn stream_allocator(&self) -> &BufferPool {
        &self.stream_allocator
    }

    pub fn max_packet_size(&self) -> usize {
        self.processor.max_packet_size()
    }

    pub fn address(&self) -> SocketAddr {
        self.socket.local_addr()
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    pub fn socket_mut(&mut self) -> &mut S {
        &mut self.socket
    }

    pub fn send_queue_len(&self) -> usize {
        self.send_queue.len()
    }

    pub fn receive_queue_len(&self) -> usize {
        self.receive_queue.len()
    }
}

impl<S: DatagramSocket, P: PacketProcessor> std::fmt::Debug for Transport<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("address", &self.socket.local_addr())
            .field("time", &self.time)
            .field("flags", &self.flags)
            .field("has_packet_factory", &self.packet_factory.is_some())
            .field("send_queue", &self.send_queue.len())
            .field("receive_queue", &self.receive_queue.len())
            .field("encryption", &self.encryption)
            .field("context_mappings", &self.contexts.len())
            .finish()
    }
}

/// Unspecified IPs and port zero cannot be sent to
#[inline]
fn is_valid_address(address: &SocketAddr) -> bool {
    !address.ip().is_unspecified() && address.port() != 0
}

/// Serialization context for one address: its mapping if any, else the defaults
fn stream_context<'a>(
    mapping: Option<&'a ContextMapping>,
    mapped_factory: Option<&'a dyn PacketFactory>,
    primary: &'a dyn PacketFactory,
    default_allocator: &'a BufferPool,
    default_data: Option<&'a ContextData>,
) -> StreamContext<'a> {
    let packet_factory = mapped_factory.unwrap_or(primary);
    debug_assert_eq!(
        packet_factory.num_packet_types(),
        primary.num_packet_types(),
        "{}",
        constants::ERR_PACKET_TYPE_MISMATCH
    );

    let (allocator, data) = match mapping {
        Some(mapping) => (mapping.allocator(), mapping.context_data()),
        None => (default_allocator, default_data),
    };

    StreamContext {
        allocator,
        packet_factory,
        context_data: data.map(|d| &**d),
    }
}
