//! Fixed-capacity packet queues.
//!
//! [`BoundedQueue`] is a circular buffer whose capacity is set once at
//! construction. Pushing onto a full queue never overwrites or blocks: the
//! rejected item is handed back to the caller, who decides its fate. The same
//! structure backs both the send and the receive queue of a transport.

use std::fmt;
use std::net::SocketAddr;

use crate::core::packet::Packet;

/// A packet waiting in a send or receive queue
pub struct PacketEntry {
    /// Sequence number carried with the packet
    pub sequence: u64,
    /// Destination (send queue) or origin (receive queue)
    pub address: SocketAddr,
    /// The packet itself; the queue owns it until popped
    pub packet: Box<dyn Packet>,
}

impl fmt::Debug for PacketEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketEntry")
            .field("sequence", &self.sequence)
            .field("address", &self.address)
            .field("packet_type", &self.packet.packet_type())
            .finish()
    }
}

/// Fixed-capacity FIFO ring buffer
pub struct BoundedQueue<T> {
    slots: Box<[Option<T>]>,
    head: usize,
    len: usize,
}

impl<T> BoundedQueue<T> {
    /// Create an empty queue holding at most `capacity` items
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    /// Append `item` at the back; a full queue hands the item back untouched
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        let tail = (self.head + self.len) % self.slots.len();
        self.slots[tail] = Some(item);
        self.len += 1;
        Ok(())
    }

    /// Remove and return the oldest item
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let item = self.slots[self.head].take();
        self.head = (self.head + 1) % self.slots.len();
        self.len -= 1;
        item
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Drop every queued item and reset to empty; returns how many were dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.len;
        while self.pop().is_some() {}
        self.head = 0;
        dropped
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("len", &self.len)
            .field("capacity", &self.slots.len())
            .finish()
    }
}
