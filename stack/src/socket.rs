// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Sockets and their in-flight packet bookkeeping

use crate::errors::SocketError;
use ahash::RandomState;
use concurrency::WaitQueue;
use net::interface::InterfaceId;
use net::packet::{LayerTags, Packet};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Socket address domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SockDomain {
    /// IPv4 internet sockets, the only supported domain.
    Inet = 2,
}

/// Socket type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SockType {
    /// Connection-oriented byte stream.
    Stream = 1,
    /// Datagram socket matched on its bound local port.
    Dgram = 2,
    /// Raw socket matched on protocol alone.
    Raw = 3,
}

/// Socket protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Protocol {
    /// ICMPv4.
    Icmp = 1,
    /// DNS over UDP.
    Dns = 2,
    /// TCP.
    Tcp = 3,
}

// Raw-value conversions for the syscall boundary.  Inside the subsystem the
// enums make illegal values unrepresentable; the adapters below are where
// the invalid-domain/type/protocol errors of the taxonomy live.

impl TryFrom<u32> for SockDomain {
    type Error = SocketError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(SockDomain::Inet),
            _ => Err(SocketError::InvalidDomain),
        }
    }
}

impl TryFrom<u32> for SockType {
    type Error = SocketError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SockType::Stream),
            2 => Ok(SockType::Dgram),
            3 => Ok(SockType::Raw),
            _ => Err(SocketError::InvalidType),
        }
    }
}

impl TryFrom<u32> for Protocol {
    type Error = SocketError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Protocol::Icmp),
            2 => Ok(Protocol::Dns),
            3 => Ok(Protocol::Tcp),
            _ => Err(SocketError::InvalidProtocol),
        }
    }
}

/// A socket-local handle for a prepared outbound packet, valid between
/// prepare and finalize.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketFd(u64);

impl Display for PacketFd {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <_ as Display>::fmt(&self.0, f)
    }
}

/// A prepared outbound packet staged between prepare and finalize.
///
/// The header bytes live in the caller's buffer; the subsystem keeps only
/// the metadata needed to finish and enqueue the frame.
#[derive(Debug, Clone)]
pub struct PendingPacket {
    /// The interface the frame was prepared for.
    pub iface: InterfaceId,
    /// Header offsets recorded by the codec during prepare.
    pub tags: LayerTags,
    /// Bytes of the buffer occupied by headers; the user payload starts here.
    pub header_len: usize,
    /// Total frame length, headers plus user payload.
    pub total_len: usize,
}

/// The mutable state of a socket.
#[derive(Debug, Clone, Copy)]
pub struct SockState {
    /// Whether the dispatcher may deliver inbound packets here.
    pub listen: bool,
    /// Whether a stream socket is currently connected.
    pub connected: bool,
    /// The allocated local port (zero until bound or connected).
    pub local_port: u16,
    /// The remote port of a stream socket.
    pub server_port: u16,
    /// The remote address of a stream socket.
    pub server_address: Ipv4Addr,
}

impl Default for SockState {
    fn default() -> Self {
        SockState {
            listen: false,
            connected: false,
            local_port: 0,
            server_port: 0,
            server_address: Ipv4Addr::UNSPECIFIED,
        }
    }
}

/// A socket owned by one process.
///
/// Domain, type, and protocol are fixed at open; everything else lives
/// behind locks because the dispatcher reads sockets from the RX workers
/// while the owning process mutates them.
#[derive(Debug)]
pub struct Socket {
    domain: SockDomain,
    ty: SockType,
    protocol: Protocol,
    state: Mutex<SockState>,
    pending: Mutex<HashMap<PacketFd, PendingPacket, RandomState>>,
    next_packet_fd: AtomicU64,
    inbox: WaitQueue<Packet>,
}

impl Socket {
    /// Create a fresh socket in the unconnected, non-listening state.
    #[must_use]
    pub fn new(domain: SockDomain, ty: SockType, protocol: Protocol) -> Socket {
        Socket {
            domain,
            ty,
            protocol,
            state: Mutex::new(SockState::default()),
            pending: Mutex::new(HashMap::with_hasher(RandomState::with_seed(0))),
            next_packet_fd: AtomicU64::new(1),
            inbox: WaitQueue::new(),
        }
    }

    /// The socket's domain.
    #[must_use]
    pub fn domain(&self) -> SockDomain {
        self.domain
    }

    /// The socket's type.
    #[must_use]
    pub fn ty(&self) -> SockType {
        self.ty
    }

    /// The socket's protocol.
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// A snapshot of the mutable state.
    #[must_use]
    pub fn state(&self) -> SockState {
        *self.state.lock()
    }

    /// Whether the dispatcher may deliver inbound packets here.
    #[must_use]
    pub fn listen(&self) -> bool {
        self.state.lock().listen
    }

    /// Enable or disable inbound delivery.
    pub fn set_listen(&self, listen: bool) {
        self.state.lock().listen = listen;
    }

    /// Whether a stream socket is currently connected.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Flip the connected flag.
    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    /// The allocated local port (zero until bound or connected).
    #[must_use]
    pub fn local_port(&self) -> u16 {
        self.state.lock().local_port
    }

    /// Record the allocated local port.
    pub fn set_local_port(&self, port: u16) {
        self.state.lock().local_port = port;
    }

    /// Record the remote endpoint of a stream socket.
    pub fn set_server(&self, address: Ipv4Addr, port: u16) {
        let mut state = self.state.lock();
        state.server_address = address;
        state.server_port = port;
    }

    /// Stage a prepared packet, returning its handle.
    #[must_use]
    pub fn register_packet(&self, pending: PendingPacket) -> PacketFd {
        let fd = PacketFd(self.next_packet_fd.fetch_add(1, Ordering::Relaxed));
        self.pending.lock().insert(fd, pending);
        fd
    }

    /// True iff `fd` names a staged packet of this socket.
    #[must_use]
    pub fn has_packet(&self, fd: PacketFd) -> bool {
        self.pending.lock().contains_key(&fd)
    }

    /// Remove and return the staged packet named by `fd`.
    #[must_use]
    pub fn take_packet(&self, fd: PacketFd) -> Option<PendingPacket> {
        self.pending.lock().remove(&fd)
    }

    /// Re-stage a packet under its original handle after a failed finalize.
    pub fn restore_packet(&self, fd: PacketFd, pending: PendingPacket) {
        self.pending.lock().insert(fd, pending);
    }

    /// The inbound packet queue served by `wait_for_packet`.
    #[must_use]
    pub fn inbox(&self) -> &WaitQueue<Packet> {
        &self.inbox
    }

    /// Deliver an inbound packet, waking one sleeper.
    pub fn deliver(&self, packet: Packet) {
        self.inbox.push(packet);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fresh_socket_state() {
        let socket = Socket::new(SockDomain::Inet, SockType::Dgram, Protocol::Dns);
        let state = socket.state();
        assert!(!state.listen);
        assert!(!state.connected);
        assert_eq!(state.local_port, 0);
        assert_eq!(state.server_port, 0);
    }

    #[test]
    fn pending_packets_round_trip() {
        let socket = Socket::new(SockDomain::Inet, SockType::Raw, Protocol::Icmp);
        let pending = PendingPacket {
            iface: InterfaceId::new(0),
            tags: LayerTags::empty(),
            header_len: 42,
            total_len: 46,
        };
        let fd = socket.register_packet(pending.clone());
        assert!(socket.has_packet(fd));
        let taken = socket.take_packet(fd).unwrap();
        assert_eq!(taken.header_len, 42);
        assert!(!socket.has_packet(fd));
        socket.restore_packet(fd, taken);
        assert!(socket.has_packet(fd));
    }

    #[test]
    fn raw_value_conversions() {
        assert_eq!(SockDomain::try_from(2).unwrap(), SockDomain::Inet);
        assert!(SockDomain::try_from(1).is_err());
        assert_eq!(SockType::try_from(3).unwrap(), SockType::Raw);
        assert!(SockType::try_from(9).is_err());
        assert_eq!(Protocol::try_from(3).unwrap(), Protocol::Tcp);
        assert!(Protocol::try_from(0).is_err());
    }
}
