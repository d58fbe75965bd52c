//! Raw datagram I/O.
//!
//! A [`DatagramSocket`] moves opaque byte buffers to and from network
//! addresses. The transport never blocks on it: `receive_packet` returns
//! `None` as soon as nothing is pending.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use tracing::{debug, info, instrument, warn};

use crate::error::Result;

/// Non-blocking datagram send/receive
pub trait DatagramSocket {
    /// Address this socket is bound to
    fn local_addr(&self) -> SocketAddr;

    /// Send one datagram. Delivery failures are the socket's to report.
    fn send_packet(&mut self, to: SocketAddr, data: &[u8]);

    /// Receive one datagram into `buffer`, `None` when nothing is pending
    fn receive_packet(&mut self, buffer: &mut [u8]) -> Option<(SocketAddr, usize)>;

    /// Whether at least one datagram is waiting, without consuming it
    fn has_pending(&mut self) -> bool;
}

/// Non-blocking UDP socket
#[derive(Debug)]
pub struct UdpDatagramSocket {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpDatagramSocket {
    /// Bind a non-blocking UDP socket
    #[instrument(skip(addr))]
    pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;
        info!(%local_addr, "UDP socket bound");
        Ok(Self { socket, local_addr })
    }
}

impl DatagramSocket for UdpDatagramSocket {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn send_packet(&mut self, to: SocketAddr, data: &[u8]) {
        match self.socket.send_to(data, to) {
            Ok(sent) if sent == data.len() => {}
            Ok(sent) => warn!(%to, sent, len = data.len(), "Short datagram send"),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!(%to, "Socket send buffer full, datagram dropped")
            }
            Err(e) => warn!(%to, error = %e, "Datagram send failed"),
        }
    }

    fn receive_packet(&mut self, buffer: &mut [u8]) -> Option<(SocketAddr, usize)> {
        match self.socket.recv_from(buffer) {
            Ok((len, from)) => Some((from, len)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => None,
            Err(e) => {
                debug!(error = %e, "Datagram receive failed");
                None
            }
        }
    }

    fn has_pending(&mut self) -> bool {
        let mut probe = [0u8; 1];
        match self.socket.peek_from(&mut probe) {
            Ok(_) => true,
            Err(e) => e.kind() != io::ErrorKind::WouldBlock,
        }
    }
}
