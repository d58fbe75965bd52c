//! In-process datagram network.
//!
//! [`LocalNetwork`] routes datagrams between [`LocalSocket`]s through
//! per-endpoint FIFO inboxes, with optional random loss. It lets two
//! transports talk in the same process without touching the OS, which is how
//! the integration tests and benches drive the full pipeline.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use rand::Rng;
use tracing::{debug, trace, warn};

use crate::transport::socket::DatagramSocket;

/// Inbox depth used by [`LocalNetwork::new`]
pub const DEFAULT_INBOX_CAPACITY: usize = 1024;

struct Datagram {
    from: SocketAddr,
    data: Vec<u8>,
}

/// Datagrams queued for one bound endpoint
struct Inbox {
    // Distinguishes successive binds of the same address
    binding: u64,
    queue: VecDeque<Datagram>,
}

struct NetworkInner {
    inboxes: HashMap<SocketAddr, Inbox>,
    next_binding: u64,
    inbox_capacity: usize,
    packet_loss: f64,
    delivered: u64,
    dropped: u64,
}

/// Shared handle to a simulated datagram network
#[derive(Clone)]
pub struct LocalNetwork {
    inner: Arc<Mutex<NetworkInner>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::with_inbox_capacity(DEFAULT_INBOX_CAPACITY)
    }

    /// Network whose endpoints hold at most `inbox_capacity` undelivered datagrams
    pub fn with_inbox_capacity(inbox_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(NetworkInner {
                inboxes: HashMap::new(),
                next_binding: 0,
                inbox_capacity,
                packet_loss: 0.0,
                delivered: 0,
                dropped: 0,
            })),
        }
    }

    /// Drop each datagram with probability `percent` / 100
    pub fn set_packet_loss(&self, percent: f64) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.packet_loss = (percent / 100.0).clamp(0.0, 1.0);
        }
    }

    /// Attach an endpoint at `address`, replacing any previous inbox there.
    ///
    /// A replaced socket is detached: it no longer receives, and dropping it
    /// leaves the new endpoint bound.
    pub fn bind(&self, address: SocketAddr) -> LocalSocket {
        let mut binding = 0;
        if let Ok(mut inner) = self.inner.lock() {
            binding = inner.next_binding;
            inner.next_binding += 1;
            let inbox = Inbox {
                binding,
                queue: VecDeque::new(),
            };
            if inner.inboxes.insert(address, inbox).is_some() {
                warn!(%address, "Local endpoint rebound, pending datagrams discarded");
            }
        }
        debug!(%address, binding, "Local endpoint bound");
        LocalSocket {
            address,
            binding,
            network: self.clone(),
        }
    }

    /// Deliver raw bytes to `to` as if sent from `from`
    pub fn inject(&self, from: SocketAddr, to: SocketAddr, data: &[u8]) {
        self.deliver(from, to, data);
    }

    /// Datagrams waiting in the inbox of `address`
    pub fn pending(&self, address: &SocketAddr) -> usize {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.inboxes.get(address).map(|inbox| inbox.queue.len()))
            .unwrap_or(0)
    }

    /// Datagrams that reached an inbox
    pub fn delivered(&self) -> u64 {
        self.inner.lock().map(|inner| inner.delivered).unwrap_or(0)
    }

    /// Datagrams lost to simulated loss, a full inbox, or an unbound address
    pub fn dropped(&self) -> u64 {
        self.inner.lock().map(|inner| inner.dropped).unwrap_or(0)
    }

    fn deliver(&self, from: SocketAddr, to: SocketAddr, data: &[u8]) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };

        if inner.packet_loss > 0.0 && rand::rng().random::<f64>() < inner.packet_loss {
            inner.dropped += 1;
            trace!(%from, %to, "Datagram lost");
            return;
        }

        let capacity = inner.inbox_capacity;
        let accepted = match inner.inboxes.get_mut(&to) {
            Some(inbox) if inbox.queue.len() < capacity => {
                inbox.queue.push_back(Datagram {
                    from,
                    data: data.to_vec(),
                });
                true
            }
            Some(_) => {
                trace!(%to, "Inbox full, datagram dropped");
                false
            }
            None => {
                trace!(%to, "No endpoint bound, datagram dropped");
                false
            }
        };

        if accepted {
            inner.delivered += 1;
        } else {
            inner.dropped += 1;
        }
    }

    fn take(&self, address: &SocketAddr, binding: u64) -> Option<Datagram> {
        let mut inner = self.inner.lock().ok()?;
        let inbox = inner.inboxes.get_mut(address)?;
        if inbox.binding != binding {
            return None;
        }
        inbox.queue.pop_front()
    }

    fn is_bound(&self, address: &SocketAddr, binding: u64) -> bool {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.inboxes.get(address).map(|inbox| inbox.binding == binding))
            .unwrap_or(false)
    }

    /// Remove the inbox at `address` if `binding` still owns it
    fn unbind(&self, address: &SocketAddr, binding: u64) {
        if let Ok(mut inner) = self.inner.lock() {
            if inner
                .inboxes
                .get(address)
                .is_some_and(|inbox| inbox.binding == binding)
            {
                inner.inboxes.remove(address);
            }
        }
    }
}

impl Default for LocalNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LocalNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.lock() {
            Ok(inner) => f
                .debug_struct("LocalNetwork")
                .field("endpoints", &inner.inboxes.len())
                .field("packet_loss", &inner.packet_loss)
                .field("delivered", &inner.delivered)
                .field("dropped", &inner.dropped)
                .finish(),
            Err(_) => f.write_str("LocalNetwork(<poisoned>)"),
        }
    }
}

/// Endpoint on a [`LocalNetwork`]; unbinds itself when dropped
#[derive(Debug)]
pub struct LocalSocket {
    address: SocketAddr,
    binding: u64,
    network: LocalNetwork,
}

impl LocalSocket {
    pub fn network(&self) -> &LocalNetwork {
        &self.network
    }
}

impl DatagramSocket for LocalSocket {
    fn local_addr(&self) -> SocketAddr {
        self.address
    }

    fn send_packet(&mut self, to: SocketAddr, data: &[u8]) {
        self.network.deliver(self.address, to, data);
    }

    fn receive_packet(&mut self, buffer: &mut [u8]) -> Option<(SocketAddr, usize)> {
        let datagram = self.network.take(&self.address, self.binding)?;
        // Oversized datagrams are truncated, as a UDP receive would
        let len = datagram.data.len().min(buffer.len());
        buffer[..len].copy_from_slice(&datagram.data[..len]);
        Some((datagram.from, len))
    }

    fn has_pending(&mut self) -> bool {
        self.network.is_bound(&self.address, self.binding) && self.network.pending(&self.address) > 0
    }
}

impl Drop for LocalSocket {
    fn drop(&mut self) {
        self.network.unbind(&self.address, self.binding);
    }
}
