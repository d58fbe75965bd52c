//! Transport Counters
//!
//! One monotonic counter per pipeline outcome. Counters live on the transport
//! instance (no global state) and are never reset; observers read them by
//! [`TransportCounter`] or by raw index.

use tracing::info;

/// Outcome categories tracked by a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum TransportCounter {
    /// Packets accepted by `send_packet` (queued or sent immediately)
    PacketsSent = 0,
    /// Packets popped by the application from the receive queue
    PacketsReceived,
    /// Datagrams successfully decoded into packets
    PacketsRead,
    /// Packets successfully serialized and handed to the socket
    PacketsWritten,
    /// Packets dropped because the send queue was full
    SendQueueOverflow,
    /// Read cycles stopped because the receive queue was full
    ReceiveQueueOverflow,
    /// Datagrams rejected as malformed
    ReadPacketFailures,
    /// Packets that could not be serialized or were invalid
    WritePacketFailures,
    /// Packets that failed to encrypt
    EncryptPacketFailures,
    /// Datagrams that failed authentication or decryption
    DecryptPacketFailures,
    /// Datagrams shorter than the minimum packet size
    PacketTooSmallFailures,
    /// Encrypted packets read
    EncryptedPacketsRead,
    /// Encrypted packets written
    EncryptedPacketsWritten,
    /// Plaintext packets read
    UnencryptedPacketsRead,
    /// Plaintext packets written
    UnencryptedPacketsWritten,
    /// Packets dropped because no key was mapped for an encrypted type
    EncryptionMappingFailures,
}

/// Number of defined counters
pub const NUM_COUNTERS: usize = 16;

impl TransportCounter {
    /// Every counter, in index order
    pub const ALL: [TransportCounter; NUM_COUNTERS] = [
        TransportCounter::PacketsSent,
        TransportCounter::PacketsReceived,
        TransportCounter::PacketsRead,
        TransportCounter::PacketsWritten,
        TransportCounter::SendQueueOverflow,
        TransportCounter::ReceiveQueueOverflow,
        TransportCounter::ReadPacketFailures,
        TransportCounter::WritePacketFailures,
        TransportCounter::EncryptPacketFailures,
        TransportCounter::DecryptPacketFailures,
        TransportCounter::PacketTooSmallFailures,
        TransportCounter::EncryptedPacketsRead,
        TransportCounter::EncryptedPacketsWritten,
        TransportCounter::UnencryptedPacketsRead,
        TransportCounter::UnencryptedPacketsWritten,
        TransportCounter::EncryptionMappingFailures,
    ];

    /// Position of this counter in the counter array
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Counter for a raw index, if defined
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Stable snake_case name for logs and exporters
    pub fn name(self) -> &'static str {
        match self {
            TransportCounter::PacketsSent => "packets_sent",
            TransportCounter::PacketsReceived => "packets_received",
            TransportCounter::PacketsRead => "packets_read",
            TransportCounter::PacketsWritten => "packets_written",
            TransportCounter::SendQueueOverflow => "send_queue_overflow",
            TransportCounter::ReceiveQueueOverflow => "receive_queue_overflow",
            TransportCounter::ReadPacketFailures => "read_packet_failures",
            TransportCounter::WritePacketFailures => "write_packet_failures",
            TransportCounter::EncryptPacketFailures => "encrypt_packet_failures",
            TransportCounter::DecryptPacketFailures => "decrypt_packet_failures",
            TransportCounter::PacketTooSmallFailures => "packet_too_small_failures",
            TransportCounter::EncryptedPacketsRead => "encrypted_packets_read",
            TransportCounter::EncryptedPacketsWritten => "encrypted_packets_written",
            TransportCounter::UnencryptedPacketsRead => "unencrypted_packets_read",
            TransportCounter::UnencryptedPacketsWritten => "unencrypted_packets_written",
            TransportCounter::EncryptionMappingFailures => "encryption_mapping_failures",
        }
    }
}

/// Fixed-size set of monotonic outcome counters
#[derive(Debug, Clone, Default)]
pub struct Counters {
    values: [u64; NUM_COUNTERS],
}

impl Counters {
    /// Create a counter set with every value at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence of `counter`
    #[inline]
    pub fn increment(&mut self, counter: TransportCounter) {
        self.values[counter.index()] += 1;
    }

    /// Current value of `counter`
    #[inline]
    pub fn get(&self, counter: TransportCounter) -> u64 {
        self.values[counter.index()]
    }

    /// Current value at a raw index, `None` if the index is out of range
    pub fn get_index(&self, index: usize) -> Option<u64> {
        self.values.get(index).copied()
    }

    /// Iterate `(counter, value)` pairs in index order
    pub fn iter(&self) -> impl Iterator<Item = (TransportCounter, u64)> + '_ {
        TransportCounter::ALL
            .iter()
            .map(move |c| (*c, self.values[c.index()]))
    }

    /// Log current counters
    pub fn log_counters(&self) {
        info!(
            packets_sent = self.get(TransportCounter::PacketsSent),
            packets_received = self.get(TransportCounter::PacketsReceived),
            packets_read = self.get(TransportCounter::PacketsRead),
            packets_written = self.get(TransportCounter::PacketsWritten),
            send_queue_overflow = self.get(TransportCounter::SendQueueOverflow),
            receive_queue_overflow = self.get(TransportCounter::ReceiveQueueOverflow),
            read_packet_failures = self.get(TransportCounter::ReadPacketFailures),
            write_packet_failures = self.get(TransportCounter::WritePacketFailures),
            encrypt_packet_failures = self.get(TransportCounter::EncryptPacketFailures),
            decrypt_packet_failures = self.get(TransportCounter::DecryptPacketFailures),
            packet_too_small_failures = self.get(TransportCounter::PacketTooSmallFailures),
            encrypted_packets_read = self.get(TransportCounter::EncryptedPacketsRead),
            encrypted_packets_written = self.get(TransportCounter::EncryptedPacketsWritten),
            unencrypted_packets_read = self.get(TransportCounter::UnencryptedPacketsRead),
            unencrypted_packets_written = self.get(TransportCounter::UnencryptedPacketsWritten),
            encryption_mapping_failures = self.get(TransportCounter::EncryptionMappingFailures),
            "Transport counters snapshot"
        );
    }
}
