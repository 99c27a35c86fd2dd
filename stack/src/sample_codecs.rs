// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Reference codecs for the protocol contracts.
//!
//! These are deliberately small: enough ICMP echo, DNS query, and TCP
//! segment handling to drive the subsystem end to end, plus the link-layer
//! decoder the RX workers run.
//! Real protocol stacks plug in through the same traits.

use crate::codec::{
    CodecError, CodecSet, DatagramCodec, DeliverySink, InboundCodec, PacketDescriptor,
    PreparedFrame, StreamTransport, TcpDescriptor,
};
use crate::socket::{PendingPacket, Protocol, Socket};
use etherparse::{EtherType, Ethernet2Header, IpNumber, Ipv4Header, TcpHeader, UdpHeader};
use iface::Interface;
use net::eth::Mac;
use net::packet::{Layer, LayerTags, Packet};
use std::net::Ipv4Addr;
use std::sync::Arc;

use tracing::{debug, trace};

const ETH_HEADER_LEN: usize = 14;
const IPV4_HEADER_LEN: usize = 20;
const ICMP_HEADER_LEN: usize = 8;
const UDP_HEADER_LEN: usize = 8;
const TCP_HEADER_LEN: usize = 20;
const DNS_HEADER_LEN: usize = 12;
const DNS_PORT: u16 = 53;
const TTL: u8 = 64;

/// The RFC 1071 ones-complement checksum of `bytes`.
fn internet_checksum(bytes: &[u8]) -> u16 {
    let mut sum = 0u32;
    let mut chunks = bytes.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u32::from(u16::from_be_bytes([chunk[0], chunk[1]]));
    }
    if let [last] = chunks.remainder() {
        sum += u32::from(u16::from_be_bytes([*last, 0]));
    }
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// Write the ethernet and IPv4 headers shared by every outbound frame.
fn write_link_net(
    iface: &Interface,
    dst: Ipv4Addr,
    protocol: IpNumber,
    ip_payload_len: usize,
    buf: &mut [u8],
) -> Result<(), CodecError> {
    let eth = Ethernet2Header {
        destination: Mac::BROADCAST.0,
        source: iface.mac().0,
        ether_type: EtherType::IPV4,
    };
    buf[..ETH_HEADER_LEN].copy_from_slice(&eth.to_bytes());
    let mut ip = Ipv4Header {
        time_to_live: TTL,
        protocol,
        source: iface.ip().octets(),
        destination: dst.octets(),
        ..Default::default()
    };
    ip.set_payload_len(ip_payload_len)
        .map_err(|e| CodecError::Malformed(e.to_string()))?;
    ip.header_checksum = ip.calc_header_checksum();
    buf[ETH_HEADER_LEN..ETH_HEADER_LEN + IPV4_HEADER_LEN].copy_from_slice(&ip.to_bytes());
    Ok(())
}

fn link_net_transport_tags() -> LayerTags {
    let mut tags = LayerTags::empty();
    tags.set(Layer::Link, 0);
    tags.set(Layer::Network, ETH_HEADER_LEN as u16);
    tags.set(Layer::Transport, (ETH_HEADER_LEN + IPV4_HEADER_LEN) as u16);
    tags
}

fn layer_offset(pending: &PendingPacket, layer: Layer) -> Result<usize, CodecError> {
    pending
        .tags
        .get(layer)
        .map(usize::from)
        .ok_or_else(|| CodecError::Malformed(format!("missing {layer:?} header offset")))
}

fn check_total_len(pending: &PendingPacket, buf: &[u8]) -> Result<(), CodecError> {
    if buf.len() < pending.total_len {
        return Err(CodecError::BufferTooSmall {
            need: pending.total_len,
            got: buf.len(),
        });
    }
    Ok(())
}

/// Reparse the IPv4 header staged in `buf` (transport checksums need it).
fn staged_ipv4(pending: &PendingPacket, buf: &[u8]) -> Result<Ipv4Header, CodecError> {
    let offset = layer_offset(pending, Layer::Network)?;
    Ipv4Header::from_slice(&buf[offset..])
        .map(|(header, _)| header)
        .map_err(|e| CodecError::Malformed(e.to_string()))
}

/// Clone the finished frame into a kernel-owned packet carrying the staged
/// tags.
fn into_frame(pending: &PendingPacket, buf: &[u8]) -> Packet {
    let mut packet = Packet::from_frame(pending.iface, &buf[..pending.total_len]);
    packet.set_tags(pending.tags);
    packet
}

/// ICMPv4 echo codec.
#[derive(Debug, Default)]
pub struct IcmpCodec;

impl DatagramCodec for IcmpCodec {
    fn prepare(
        &self,
        iface: &Interface,
        desc: &PacketDescriptor,
        buf: &mut [u8],
    ) -> Result<PreparedFrame, CodecError> {
        let PacketDescriptor::Icmp(desc) = desc else {
            return Err(CodecError::Unsupported);
        };
        let header_len = ETH_HEADER_LEN + IPV4_HEADER_LEN + ICMP_HEADER_LEN;
        let total_len = header_len + desc.payload_size;
        if buf.len() < total_len {
            return Err(CodecError::BufferTooSmall {
                need: total_len,
                got: buf.len(),
            });
        }
        write_link_net(
            iface,
            desc.target,
            IpNumber::ICMP,
            ICMP_HEADER_LEN + desc.payload_size,
            buf,
        )?;
        let icmp = &mut buf[ETH_HEADER_LEN + IPV4_HEADER_LEN..header_len];
        icmp.fill(0);
        icmp[0] = desc.icmp_type;
        icmp[1] = desc.code;
        Ok(PreparedFrame {
            header_len,
            total_len,
            tags: link_net_transport_tags(),
        })
    }

    fn finalize(
        &self,
        _iface: &Interface,
        pending: &PendingPacket,
        buf: &mut [u8],
    ) -> Result<Packet, CodecError> {
        check_total_len(pending, buf)?;
        let offset = layer_offset(pending, Layer::Transport)?;
        buf[offset + 2..offset + 4].fill(0);
        let checksum = internet_checksum(&buf[offset..pending.total_len]);
        buf[offset + 2..offset + 4].copy_from_slice(&checksum.to_be_bytes());
        Ok(into_frame(pending, buf))
    }
}

/// DNS query codec (queries only; responses are built by servers).
#[derive(Debug, Default)]
pub struct DnsCodec;

impl DatagramCodec for DnsCodec {
    fn prepare(
        &self,
        iface: &Interface,
        desc: &PacketDescriptor,
        buf: &mut [u8],
    ) -> Result<PreparedFrame, CodecError> {
        let PacketDescriptor::Dns(desc) = desc else {
            return Err(CodecError::Unsupported);
        };
        if !desc.query {
            return Err(CodecError::Unsupported);
        }
        let transport_offset = ETH_HEADER_LEN + IPV4_HEADER_LEN;
        let header_len = transport_offset + UDP_HEADER_LEN + DNS_HEADER_LEN;
        let total_len = header_len + desc.payload_size;
        if buf.len() < total_len {
            return Err(CodecError::BufferTooSmall {
                need: total_len,
                got: buf.len(),
            });
        }
        let udp_len = UDP_HEADER_LEN + DNS_HEADER_LEN + desc.payload_size;
        write_link_net(iface, desc.target, IpNumber::UDP, udp_len, buf)?;
        let udp = UdpHeader {
            source_port: desc.source_port,
            destination_port: DNS_PORT,
            length: u16::try_from(udp_len)
                .map_err(|_| CodecError::Malformed("udp datagram too long".to_string()))?,
            checksum: 0,
        };
        buf[transport_offset..transport_offset + UDP_HEADER_LEN].copy_from_slice(&udp.to_bytes());
        // DNS header: id 0, RD set, one question, user fills the question
        // section behind it.
        let dns = &mut buf[transport_offset + UDP_HEADER_LEN..header_len];
        dns.fill(0);
        dns[2] = 0x01;
        dns[5] = 0x01;
        let mut tags = link_net_transport_tags();
        tags.set(
            Layer::Application,
            (transport_offset + UDP_HEADER_LEN) as u16,
        );
        Ok(PreparedFrame {
            header_len,
            total_len,
            tags,
        })
    }

    fn finalize(
        &self,
        _iface: &Interface,
        pending: &PendingPacket,
        buf: &mut [u8],
    ) -> Result<Packet, CodecError> {
        check_total_len(pending, buf)?;
        let ip = staged_ipv4(pending, buf)?;
        let offset = layer_offset(pending, Layer::Transport)?;
        let payload = &buf[offset + UDP_HEADER_LEN..pending.total_len];
        let (mut udp, _) = UdpHeader::from_slice(&buf[offset..])
            .map_err(|e| CodecError::Malformed(e.to_string()))?;
        udp.checksum = udp
            .calc_checksum_ipv4(&ip, payload)
            .map_err(|e| CodecError::Malformed(e.to_string()))?;
        buf[offset..offset + UDP_HEADER_LEN].copy_from_slice(&udp.to_bytes());
        Ok(into_frame(pending, buf))
    }
}

/// A synchronous stand-in for the TCP transport.
///
/// Connect and disconnect succeed as long as the endpoint is sane; segments
/// are built with fixed sequence numbers.
/// The real transport owns handshakes, retransmission, and stream delivery.
#[derive(Debug, Default)]
pub struct TcpTransport;

impl StreamTransport for TcpTransport {
    fn connect(&self, socket: &Socket, iface: &Interface) -> Result<(), CodecError> {
        let state = socket.state();
        if state.server_port == 0 {
            return Err(CodecError::Transport(
                "server port may not be zero".to_string(),
            ));
        }
        debug!(
            "tcp: {}:{} connected to {}:{} via {}",
            iface.ip(),
            state.local_port,
            state.server_address,
            state.server_port,
            iface.name()
        );
        Ok(())
    }

    fn disconnect(&self, socket: &Socket, iface: &Interface) -> Result<(), CodecError> {
        let state = socket.state();
        debug!(
            "tcp: {}:{} disconnected from {}:{} via {}",
            iface.ip(),
            state.local_port,
            state.server_address,
            state.server_port,
            iface.name()
        );
        Ok(())
    }

    fn prepare(
        &self,
        iface: &Interface,
        socket: &Socket,
        desc: &TcpDescriptor,
        buf: &mut [u8],
    ) -> Result<PreparedFrame, CodecError> {
        let state = socket.state();
        let header_len = ETH_HEADER_LEN + IPV4_HEADER_LEN + TCP_HEADER_LEN;
        let total_len = header_len + desc.payload_size;
        if buf.len() < total_len {
            return Err(CodecError::BufferTooSmall {
                need: total_len,
                got: buf.len(),
            });
        }
        write_link_net(
            iface,
            state.server_address,
            IpNumber::TCP,
            TCP_HEADER_LEN + desc.payload_size,
            buf,
        )?;
        let mut tcp = TcpHeader::new(state.local_port, state.server_port, 0, 0xffff);
        tcp.psh = true;
        tcp.ack = true;
        let bytes = tcp.to_bytes();
        let offset = ETH_HEADER_LEN + IPV4_HEADER_LEN;
        buf[offset..offset + bytes.len()].copy_from_slice(&bytes);
        Ok(PreparedFrame {
            header_len,
            total_len,
            tags: link_net_transport_tags(),
        })
    }

    fn finalize(
        &self,
        _iface: &Interface,
        _socket: &Socket,
        pending: &PendingPacket,
        buf: &mut [u8],
    ) -> Result<Packet, CodecError> {
        check_total_len(pending, buf)?;
        let ip = staged_ipv4(pending, buf)?;
        let offset = layer_offset(pending, Layer::Transport)?;
        let (mut tcp, _) = TcpHeader::from_slice(&buf[offset..])
            .map_err(|e| CodecError::Malformed(e.to_string()))?;
        let payload = &buf[offset + tcp.header_len()..pending.total_len];
        tcp.checksum = tcp
            .calc_checksum_ipv4(&ip, payload)
            .map_err(|e| CodecError::Malformed(e.to_string()))?;
        let bytes = tcp.to_bytes();
        buf[offset..offset + bytes.len()].copy_from_slice(&bytes);
        Ok(into_frame(pending, buf))
    }
}

/// The link-layer decoder: peel ethernet, then IPv4, then hand the packet
/// to the dispatcher under the transport protocol it carries.
#[derive(Debug, Default)]
pub struct EthDecoder;

impl InboundCodec for EthDecoder {
    fn decode(&self, iface: &Interface, mut packet: Packet, sink: &dyn DeliverySink) {
        let Ok((eth, _)) = Ethernet2Header::from_slice(packet.payload()) else {
            trace!("{}: dropping truncated frame", iface.name());
            return;
        };
        packet.set_tag(Layer::Link, 0);
        if eth.ether_type != EtherType::IPV4 {
            trace!(
                "{}: no decoder for ethertype {:?}",
                iface.name(),
                eth.ether_type
            );
            return;
        }
        packet.set_tag(Layer::Network, ETH_HEADER_LEN as u16);
        let Ok((ip, _)) = Ipv4Header::from_slice(&packet.payload()[ETH_HEADER_LEN..]) else {
            trace!("{}: dropping malformed ipv4 packet", iface.name());
            return;
        };
        let transport_offset = ETH_HEADER_LEN + ip.header_len();
        packet.set_tag(Layer::Transport, transport_offset as u16);
        if ip.protocol == IpNumber::ICMP {
            sink.deliver(&packet, Protocol::Icmp);
        } else if ip.protocol == IpNumber::UDP {
            packet.set_tag(
                Layer::Application,
                (transport_offset + UDP_HEADER_LEN) as u16,
            );
            sink.deliver(&packet, Protocol::Dns);
        } else if ip.protocol == IpNumber::TCP {
            sink.deliver(&packet, Protocol::Tcp);
        } else {
            trace!(
                "{}: no decoder for ip protocol {:?}",
                iface.name(),
                ip.protocol
            );
        }
    }
}

/// The full sample codec set: ICMP echo, DNS query, TCP transport, and the
/// link-layer decoder.
#[must_use]
pub fn codec_set() -> CodecSet {
    CodecSet::new(
        Arc::new(IcmpCodec),
        Arc::new(DnsCodec),
        Arc::new(TcpTransport),
        Arc::new(EthDecoder),
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::IcmpDescriptor;
    use crate::socket::{SockDomain, SockType};
    use iface::RegistryBuilder;
    use net::interface::InterfaceId;
    use parking_lot::Mutex;
    use std::net::Ipv4Addr;

    fn loopback() -> (iface::Registry, std::sync::Arc<Interface>) {
        let registry = RegistryBuilder::new(32).finish().unwrap();
        let lo = Arc::clone(registry.select(Ipv4Addr::LOCALHOST).unwrap());
        (registry, lo)
    }

    fn pending(iface: InterfaceId, frame: &PreparedFrame) -> PendingPacket {
        PendingPacket {
            iface,
            tags: frame.tags,
            header_len: frame.header_len,
            total_len: frame.total_len,
        }
    }

    #[test]
    fn icmp_echo_prepare_then_finalize() {
        let (_registry, lo) = loopback();
        let mut buf = [0u8; 128];
        let desc = PacketDescriptor::Icmp(IcmpDescriptor {
            target: Ipv4Addr::LOCALHOST,
            payload_size: 4,
            icmp_type: 8,
            code: 0,
        });
        let frame = IcmpCodec.prepare(&lo, &desc, &mut buf).unwrap();
        assert_eq!(frame.header_len, 42);
        assert_eq!(frame.total_len, 46);
        assert_eq!(frame.tags.get(Layer::Transport), Some(34));
        // ethertype ipv4, icmp echo request
        assert_eq!(&buf[12..14], &[0x08, 0x00]);
        assert_eq!(buf[34], 8);

        buf[42..46].copy_from_slice(b"abcd");
        let staged = pending(lo.id(), &frame);
        let packet = IcmpCodec.finalize(&lo, &staged, &mut buf).unwrap();
        assert_eq!(packet.len(), 46);
        assert_eq!(&packet.payload()[42..], b"abcd");
        // a valid icmp checksum folds the whole message to zero
        assert_eq!(internet_checksum(&packet.payload()[34..]), 0);
    }

    #[test]
    fn icmp_prepare_rejects_short_buffers() {
        let (_registry, lo) = loopback();
        let mut buf = [0u8; 16];
        let desc = PacketDescriptor::Icmp(IcmpDescriptor {
            target: Ipv4Addr::LOCALHOST,
            payload_size: 64,
            icmp_type: 8,
            code: 0,
        });
        assert!(matches!(
            IcmpCodec.prepare(&lo, &desc, &mut buf),
            Err(CodecError::BufferTooSmall { need: 106, .. })
        ));
    }

    #[test]
    fn dns_query_layout() {
        let (_registry, lo) = loopback();
        let mut buf = [0u8; 256];
        let desc = PacketDescriptor::Dns(crate::codec::DnsDescriptor {
            query: true,
            target: Ipv4Addr::LOCALHOST,
            source_port: 1234,
            payload_size: 16,
        });
        let frame = DnsCodec.prepare(&lo, &desc, &mut buf).unwrap();
        assert_eq!(frame.header_len, 54);
        assert_eq!(frame.total_len, 70);
        assert_eq!(frame.tags.get(Layer::Application), Some(42));
        // udp source port and dns destination port
        assert_eq!(&buf[34..36], &1234u16.to_be_bytes());
        assert_eq!(&buf[36..38], &53u16.to_be_bytes());
        // recursion desired, one question
        assert_eq!(buf[44], 0x01);
        assert_eq!(&buf[46..48], &[0x00, 0x01]);
    }

    #[test]
    fn dns_responses_are_not_encodable() {
        let (_registry, lo) = loopback();
        let mut buf = [0u8; 256];
        let desc = PacketDescriptor::Dns(crate::codec::DnsDescriptor {
            query: false,
            target: Ipv4Addr::LOCALHOST,
            source_port: 1234,
            payload_size: 0,
        });
        assert!(matches!(
            DnsCodec.prepare(&lo, &desc, &mut buf),
            Err(CodecError::Unsupported)
        ));
    }

    #[test]
    fn decoder_tags_and_delivers_icmp() {
        let (_registry, lo) = loopback();
        let mut buf = [0u8; 64];
        let desc = PacketDescriptor::Icmp(IcmpDescriptor {
            target: Ipv4Addr::LOCALHOST,
            payload_size: 4,
            icmp_type: 8,
            code: 0,
        });
        let frame = IcmpCodec.prepare(&lo, &desc, &mut buf).unwrap();
        buf[42..46].copy_from_slice(b"ping");
        let staged = pending(lo.id(), &frame);
        let packet = IcmpCodec.finalize(&lo, &staged, &mut buf).unwrap();

        #[derive(Default)]
        struct Recorder(Mutex<Vec<(Protocol, Option<u16>)>>);
        impl DeliverySink for Recorder {
            fn deliver(&self, packet: &Packet, protocol: Protocol) {
                self.0.lock().push((protocol, packet.tag(Layer::Transport)));
            }
        }

        let recorder = Recorder::default();
        EthDecoder.decode(&lo, packet, &recorder);
        let seen = recorder.0.into_inner();
        assert_eq!(seen, vec![(Protocol::Icmp, Some(34))]);
    }

    #[test]
    fn tcp_segment_carries_the_connection_ports() {
        let (_registry, lo) = loopback();
        let socket = Socket::new(SockDomain::Inet, SockType::Stream, Protocol::Tcp);
        socket.set_local_port(1234);
        socket.set_server(Ipv4Addr::LOCALHOST, 8080);

        let mut buf = [0u8; 128];
        let frame = TcpTransport
            .prepare(&lo, &socket, &TcpDescriptor { payload_size: 4 }, &mut buf)
            .unwrap();
        assert_eq!(frame.header_len, 54);
        buf[54..58].copy_from_slice(b"data");
        let staged = pending(lo.id(), &frame);
        let packet = TcpTransport
            .finalize(&lo, &socket, &staged, &mut buf)
            .unwrap();
        assert_eq!(&packet.payload()[34..36], &1234u16.to_be_bytes());
        assert_eq!(&packet.payload()[36..38], &8080u16.to_be_bytes());
    }
}
