// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Owned packet buffer with per-layer header offsets

use crate::interface::InterfaceId;
use std::fmt::{Debug, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

/// The number of protocol layers a [`Packet`] can record offsets for.
pub const MAX_LAYERS: usize = 4;

/// A protocol layer within a packet.
///
/// Used to key the per-layer header offsets of a [`Packet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Layer 0: the link layer header (ethernet).
    Link,
    /// Layer 1: the network layer header (ipv4).
    Network,
    /// Layer 2: the transport layer header (udp, tcp, icmp).
    Transport,
    /// Layer 3: the application layer (dns, echo payloads).
    Application,
}

impl Layer {
    fn index(self) -> usize {
        match self {
            Layer::Link => 0,
            Layer::Network => 1,
            Layer::Transport => 2,
            Layer::Application => 3,
        }
    }
}

/// The byte offsets at which each protocol layer's header starts within a
/// packet's payload.
///
/// Offsets are recorded by codecs during encode and decode.
/// No invariant links offsets across layers; a codec which needs an
/// upper-layer offset records its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerTags([Option<u16>; MAX_LAYERS]);

impl LayerTags {
    /// A tag table with no offsets recorded.
    #[must_use]
    pub fn empty() -> LayerTags {
        LayerTags::default()
    }

    /// The recorded offset of `layer`'s header, if any.
    #[must_use]
    pub fn get(&self, layer: Layer) -> Option<u16> {
        self.0[layer.index()]
    }

    /// Record the offset of `layer`'s header.
    pub fn set(&mut self, layer: Layer, offset: u16) {
        self.0[layer.index()] = Some(offset);
    }
}

/// A process-wide monotonically-assigned packet identifier.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacketIndex(u64);

impl PacketIndex {
    /// Assign the next packet index.
    #[must_use]
    pub fn next() -> PacketIndex {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        PacketIndex(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Treat this [`PacketIndex`] as a `u64`.
    #[must_use]
    pub fn to_u64(self) -> u64 {
        self.0
    }
}

impl Display for PacketIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <_ as Display>::fmt(&self.0, f)
    }
}

/// An owned ethernet frame moving through the subsystem.
///
/// The payload buffer is owned by exactly one agent at a time: ownership is
/// transferred across queue boundaries by moving the `Packet`, never by
/// aliasing it.
/// The terminal consumer releases the buffer by dropping the packet.
/// Fan-out to multiple consumers is an explicit [`Packet::clone_payload`].
pub struct Packet {
    payload: Box<[u8]>,
    iface: InterfaceId,
    index: PacketIndex,
    tags: LayerTags,
}

impl Packet {
    /// Allocate a zero-filled packet of `size` bytes owned by `iface`.
    #[must_use]
    pub fn alloc(iface: InterfaceId, size: usize) -> Packet {
        Packet {
            payload: vec![0u8; size].into_boxed_slice(),
            iface,
            index: PacketIndex::next(),
            tags: LayerTags::empty(),
        }
    }

    /// Build a packet from a received frame, copying `frame` into an owned
    /// buffer.
    ///
    /// This is the driver-side entry point for inbound traffic.
    #[must_use]
    pub fn from_frame(iface: InterfaceId, frame: &[u8]) -> Packet {
        Packet {
            payload: frame.into(),
            iface,
            index: PacketIndex::next(),
            tags: LayerTags::empty(),
        }
    }

    /// The id of the interface this packet belongs to.
    #[must_use]
    pub fn iface(&self) -> InterfaceId {
        self.iface
    }

    /// This packet's process-wide index.
    #[must_use]
    pub fn index(&self) -> PacketIndex {
        self.index
    }

    /// The payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// True iff the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// The payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The payload bytes, mutably.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.payload
    }

    /// The recorded offset of `layer`'s header, if any.
    #[must_use]
    pub fn tag(&self, layer: Layer) -> Option<u16> {
        self.tags.get(layer)
    }

    /// Record the offset of `layer`'s header.
    pub fn set_tag(&mut self, layer: Layer, offset: u16) {
        self.tags.set(layer, offset);
    }

    /// The full tag table.
    #[must_use]
    pub fn tags(&self) -> LayerTags {
        self.tags
    }

    /// Replace the full tag table.
    pub fn set_tags(&mut self, tags: LayerTags) {
        self.tags = tags;
    }

    /// Clone this packet into a freshly-allocated buffer.
    ///
    /// The clone keeps the tag table and interface id but is assigned its
    /// own index.
    /// The source packet is untouched.
    #[must_use]
    pub fn clone_payload(&self) -> Packet {
        Packet {
            payload: self.payload.clone(),
            iface: self.iface,
            index: PacketIndex::next(),
            tags: self.tags,
        }
    }
}

impl Debug for Packet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("iface", &self.iface)
            .field("index", &self.index)
            .field("len", &self.payload.len())
            .field("tags", &self.tags)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn indexes_are_monotonic() {
        let iface = InterfaceId::new(0);
        let first = Packet::alloc(iface, 8);
        let second = Packet::alloc(iface, 8);
        assert!(second.index() > first.index());
    }

    #[test]
    fn tags_record_layer_offsets() {
        let mut packet = Packet::alloc(InterfaceId::new(0), 64);
        assert_eq!(packet.tag(Layer::Network), None);
        packet.set_tag(Layer::Link, 0);
        packet.set_tag(Layer::Network, 14);
        packet.set_tag(Layer::Transport, 34);
        assert_eq!(packet.tag(Layer::Network), Some(14));
        assert_eq!(packet.tag(Layer::Transport), Some(34));
        assert_eq!(packet.tag(Layer::Application), None);
    }

    #[test]
    fn clone_payload_is_a_distinct_buffer() {
        let mut packet = Packet::from_frame(InterfaceId::new(1), b"abcd");
        packet.set_tag(Layer::Link, 0);
        let mut copy = packet.clone_payload();
        assert_eq!(copy.payload(), packet.payload());
        assert_eq!(copy.tag(Layer::Link), Some(0));
        assert_ne!(copy.index(), packet.index());
        copy.payload_mut()[0] = b'z';
        assert_eq!(packet.payload()[0], b'a');
    }
}
