// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Protocol codec contracts
//!
//! The subsystem treats protocol implementations as packet codecs with a
//! uniform prepare/finalize/decode surface.
//! Outbound, a codec writes the header stack into the caller's buffer during
//! prepare and turns the finished buffer into a kernel-owned frame during
//! finalize.
//! Inbound, the link-layer codec peels the protocol layers and hands each
//! decoded packet to the [`DeliverySink`] for dispatch.

use crate::socket::{PendingPacket, Protocol, Socket};
use iface::Interface;
use net::packet::{LayerTags, Packet};
use std::fmt::Debug;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// Errors reported by codecs and transports, relayed to callers verbatim.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The caller's buffer cannot hold the frame.
    #[error("buffer too small: need {need} bytes, got {got}")]
    BufferTooSmall {
        /// Bytes the frame requires.
        need: usize,
        /// Bytes the caller provided.
        got: usize,
    },
    /// The frame or descriptor is not decodable/encodable.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// The codec does not implement this operation.
    #[error("operation not supported by this codec")]
    Unsupported,
    /// A transport-level failure (connect, disconnect).
    #[error("transport error: {0}")]
    Transport(String),
}

/// What prepare leaves behind: the shape of the frame written into the
/// caller's buffer.
#[derive(Debug, Clone, Copy)]
pub struct PreparedFrame {
    /// Bytes of headers written; the user payload starts at this offset.
    pub header_len: usize,
    /// Total frame length once the payload is filled in.
    pub total_len: usize,
    /// Header offsets recorded while encoding.
    pub tags: LayerTags,
}

/// Descriptor for an outbound ICMP message.
#[derive(Debug, Clone, Copy)]
pub struct IcmpDescriptor {
    /// Destination address; also selects the carrying interface.
    pub target: Ipv4Addr,
    /// Bytes of ICMP payload the user will fill in.
    pub payload_size: usize,
    /// ICMP type field (8 = echo request).
    pub icmp_type: u8,
    /// ICMP code field.
    pub code: u8,
}

/// Descriptor for an outbound DNS message.
#[derive(Debug, Clone, Copy)]
pub struct DnsDescriptor {
    /// True for a query; sending responses is not implemented.
    pub query: bool,
    /// The DNS server; also selects the carrying interface.
    pub target: Ipv4Addr,
    /// UDP source port; overridden by the socket's bound port on datagram
    /// sockets.
    pub source_port: u16,
    /// Bytes of question section the user will fill in.
    pub payload_size: usize,
}

/// Descriptor for an outbound TCP segment.
#[derive(Debug, Clone, Copy)]
pub struct TcpDescriptor {
    /// Bytes of segment payload the user will fill in.
    pub payload_size: usize,
}

/// The protocol-specific half of a prepare request.
#[derive(Debug, Clone, Copy)]
pub enum PacketDescriptor {
    /// An ICMP message.
    Icmp(IcmpDescriptor),
    /// A DNS message.
    Dns(DnsDescriptor),
    /// A TCP segment.
    Tcp(TcpDescriptor),
}

/// A connectionless packet codec (ICMP, DNS).
pub trait DatagramCodec: Send + Sync + Debug {
    /// Write the header stack for `desc` into `buf`.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the buffer is too small or the descriptor
    /// does not describe a frame this codec can build.
    fn prepare(
        &self,
        iface: &Interface,
        desc: &PacketDescriptor,
        buf: &mut [u8],
    ) -> Result<PreparedFrame, CodecError>;

    /// Finish the frame in `buf` (checksums) and clone it into a
    /// kernel-owned packet ready for the interface TX queue.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the staged frame cannot be finished; the
    /// caller keeps the pending entry so finalize can be retried.
    fn finalize(
        &self,
        iface: &Interface,
        pending: &PendingPacket,
        buf: &mut [u8],
    ) -> Result<Packet, CodecError>;
}

/// A connection-oriented transport (TCP).
///
/// The subsystem only drives the connect/send/disconnect primitives;
/// retransmission and flow control belong to the transport.
pub trait StreamTransport: Send + Sync + Debug {
    /// Establish the connection recorded in the socket's state.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Transport`] if the peer cannot be reached.
    fn connect(&self, socket: &Socket, iface: &Interface) -> Result<(), CodecError>;

    /// Tear down the socket's connection.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Transport`] if the teardown fails.
    fn disconnect(&self, socket: &Socket, iface: &Interface) -> Result<(), CodecError>;

    /// Write the segment headers for `desc` into `buf` using the socket's
    /// connection state.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the buffer is too small.
    fn prepare(
        &self,
        iface: &Interface,
        socket: &Socket,
        desc: &TcpDescriptor,
        buf: &mut [u8],
    ) -> Result<PreparedFrame, CodecError>;

    /// Finish the segment in `buf` and clone it into a kernel-owned packet.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the staged frame cannot be finished.
    fn finalize(
        &self,
        iface: &Interface,
        socket: &Socket,
        pending: &PendingPacket,
        buf: &mut [u8],
    ) -> Result<Packet, CodecError>;
}

/// Where decoded inbound packets go: the dispatcher.
pub trait DeliverySink: Send + Sync {
    /// Deliver a decoded packet to every interested socket.
    fn deliver(&self, packet: &Packet, protocol: Protocol);
}

/// The link-layer decoder driven by the RX workers.
pub trait InboundCodec: Send + Sync {
    /// Decode one inbound frame, consuming it.
    ///
    /// The codec records layer tags as it peels headers and calls
    /// `sink.deliver` once per decoded protocol; the frame buffer is
    /// released when this returns.
    fn decode(&self, iface: &Interface, packet: Packet, sink: &dyn DeliverySink);
}

/// A codec tagged by the capability set it implements.
pub enum ProtocolCodec<'a> {
    /// Prepare/finalize only.
    Datagram(&'a dyn DatagramCodec),
    /// Prepare/finalize plus connect/disconnect.
    Stream(&'a dyn StreamTransport),
}

/// The registered codec for each protocol, plus the inbound decoder wired
/// into the RX workers.
pub struct CodecSet {
    icmp: Arc<dyn DatagramCodec>,
    dns: Arc<dyn DatagramCodec>,
    tcp: Arc<dyn StreamTransport>,
    inbound: Arc<dyn InboundCodec>,
}

impl CodecSet {
    /// Assemble a codec set.
    #[must_use]
    pub fn new(
        icmp: Arc<dyn DatagramCodec>,
        dns: Arc<dyn DatagramCodec>,
        tcp: Arc<dyn StreamTransport>,
        inbound: Arc<dyn InboundCodec>,
    ) -> CodecSet {
        CodecSet {
            icmp,
            dns,
            tcp,
            inbound,
        }
    }

    /// The codec registered for `protocol`, tagged by capability.
    #[must_use]
    pub fn codec(&self, protocol: Protocol) -> ProtocolCodec<'_> {
        match protocol {
            Protocol::Icmp => ProtocolCodec::Datagram(self.icmp.as_ref()),
            Protocol::Dns => ProtocolCodec::Datagram(self.dns.as_ref()),
            Protocol::Tcp => ProtocolCodec::Stream(self.tcp.as_ref()),
        }
    }

    /// The stream transport (connect/disconnect live here).
    #[must_use]
    pub fn stream(&self) -> &dyn StreamTransport {
        self.tcp.as_ref()
    }

    /// The link-layer decoder for the RX workers.
    #[must_use]
    pub fn inbound(&self) -> &Arc<dyn InboundCodec> {
        &self.inbound
    }
}
