// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![forbid(unsafe_code)]
#![deny(clippy::all)]

//! The socket layer of the network subsystem: per-process socket tables,
//! inbound packet dispatch, protocol codec contracts, and the socket API
//! over the per-interface RX/TX pipeline.

mod codec;
mod config;
mod dispatch;
mod errors;
mod netstack;
mod ports;
mod process;
pub mod sample_codecs;
mod socket;

pub use codec::{
    CodecError, CodecSet, DatagramCodec, DeliverySink, DnsDescriptor, IcmpDescriptor,
    InboundCodec, PacketDescriptor, PreparedFrame, ProtocolCodec, StreamTransport, TcpDescriptor,
};
pub use config::StackConfig;
pub use dispatch::{Dispatcher, propagate};
pub use errors::SocketError;
pub use netstack::{InitError, Netstack, Prepared, Received};
pub use ports::PortAllocator;
pub use process::{Pid, ProcessState, ProcessTable, SocketFd};
pub use socket::{PacketFd, PendingPacket, Protocol, SockDomain, SockState, SockType, Socket};
