// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Inbound packet dispatch

use crate::codec::DeliverySink;
use crate::process::ProcessTable;
use crate::socket::{Protocol, SockType};
use net::packet::{Layer, Packet};
use std::sync::Arc;

use tracing::trace;

/// Deliver a decoded inbound packet to every matching listening socket.
///
/// A socket matches when it is listening, speaks `protocol`, and either is
/// raw (protocol match alone) or is a datagram socket whose bound local
/// port equals the packet's UDP destination port.
/// Stream sockets never match here; their delivery belongs to the
/// transport's own bookkeeping.
///
/// Each match receives its own clone of the packet; the source packet is
/// untouched and remains owned by the caller (the RX worker).
pub fn propagate(processes: &ProcessTable, packet: &Packet, protocol: Protocol) {
    for socket in processes.live_sockets() {
        if !socket.listen() || socket.protocol() != protocol {
            continue;
        }
        let matched = match socket.ty() {
            SockType::Raw => true,
            SockType::Dgram => {
                udp_destination_port(packet) == Some(socket.local_port())
            }
            SockType::Stream => false,
        };
        if matched {
            trace!(
                "delivering packet {} ({protocol:?}) to a {:?} socket",
                packet.index(),
                socket.ty()
            );
            socket.deliver(packet.clone_payload());
        }
    }
}

/// The UDP destination port of a decoded packet: the 16-bit big-endian
/// field two bytes into the transport header.
fn udp_destination_port(packet: &Packet) -> Option<u16> {
    let offset = packet.tag(Layer::Transport)? as usize;
    let bytes = packet.payload().get(offset + 2..offset + 4)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// The [`DeliverySink`] handed to inbound codecs: dispatch into the process
/// table.
pub struct Dispatcher {
    processes: Arc<ProcessTable>,
}

impl Dispatcher {
    /// Create a dispatcher over `processes`.
    #[must_use]
    pub fn new(processes: Arc<ProcessTable>) -> Dispatcher {
        Dispatcher { processes }
    }
}

impl DeliverySink for Dispatcher {
    fn deliver(&self, packet: &Packet, protocol: Protocol) {
        propagate(&self.processes, packet, protocol);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::process::Pid;
    use crate::socket::{SockDomain, Socket};
    use net::interface::InterfaceId;

    fn listening(table: &ProcessTable, pid: Pid, ty: SockType, protocol: Protocol) -> Arc<Socket> {
        let fd = table.register_socket(pid, Socket::new(SockDomain::Inet, ty, protocol));
        let socket = table.socket(pid, fd).unwrap();
        socket.set_listen(true);
        socket
    }

    fn udp_packet(destination_port: u16) -> Packet {
        let mut frame = vec![0u8; 50];
        frame[36..38].copy_from_slice(&destination_port.to_be_bytes());
        let mut packet = Packet::from_frame(InterfaceId::new(0), &frame);
        packet.set_tag(Layer::Link, 0);
        packet.set_tag(Layer::Network, 14);
        packet.set_tag(Layer::Transport, 34);
        packet
    }

    #[test]
    fn raw_sockets_match_on_protocol_alone() {
        let table = ProcessTable::new();
        let pid = Pid::new(1);
        let icmp = listening(&table, pid, SockType::Raw, Protocol::Icmp);
        let tcp = listening(&table, pid, SockType::Raw, Protocol::Tcp);

        let packet = udp_packet(0);
        propagate(&table, &packet, Protocol::Icmp);
        assert_eq!(icmp.inbox().len(), 1);
        assert!(tcp.inbox().is_empty());
    }

    #[test]
    fn dgram_sockets_match_on_destination_port() {
        let table = ProcessTable::new();
        let pid = Pid::new(1);
        let bound = listening(&table, pid, SockType::Dgram, Protocol::Dns);
        bound.set_local_port(1235);
        let other = listening(&table, pid, SockType::Dgram, Protocol::Dns);
        other.set_local_port(1234);

        propagate(&table, &udp_packet(1235), Protocol::Dns);
        assert_eq!(bound.inbox().len(), 1);
        assert!(other.inbox().is_empty());
    }

    #[test]
    fn non_listening_sockets_are_skipped() {
        let table = ProcessTable::new();
        let pid = Pid::new(1);
        let socket = listening(&table, pid, SockType::Raw, Protocol::Icmp);
        socket.set_listen(false);

        propagate(&table, &udp_packet(0), Protocol::Icmp);
        assert!(socket.inbox().is_empty());
    }

    #[test]
    fn every_match_gets_its_own_buffer() {
        let table = ProcessTable::new();
        let pid = Pid::new(1);
        let first = listening(&table, pid, SockType::Raw, Protocol::Icmp);
        let second = listening(&table, pid, SockType::Raw, Protocol::Icmp);

        let packet = udp_packet(0);
        propagate(&table, &packet, Protocol::Icmp);

        let a = first.inbox().try_pop().unwrap();
        let b = second.inbox().try_pop().unwrap();
        assert_eq!(a.payload(), packet.payload());
        assert_eq!(b.payload(), packet.payload());
        assert_ne!(a.index(), b.index());
        assert_ne!(a.index(), packet.index());
    }
}
