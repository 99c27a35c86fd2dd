// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The network subsystem and its socket API

use crate::codec::{CodecSet, InboundCodec, PacketDescriptor, ProtocolCodec};
use crate::config::StackConfig;
use crate::dispatch::Dispatcher;
use crate::errors::SocketError;
use crate::ports::PortAllocator;
use crate::process::{Pid, ProcessTable, SocketFd};
use crate::socket::{PacketFd, PendingPacket, Protocol, SockDomain, SockType, Socket};
use iface::{DeviceSpec, DriverError, FrameDecoder, Interface, Registry, RegistryBuilder};
use net::packet::{Packet, PacketIndex};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use sysfs::{Sysfs, SysfsErr};

use tracing::{debug, info};

/// Errors during subsystem bring-up.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// A device could not be probed or attached.
    #[error(transparent)]
    Driver(#[from] DriverError),
    /// Interface attributes could not be published.
    #[error(transparent)]
    Sysfs(#[from] SysfsErr),
    /// A worker thread could not be spawned.
    #[error("failed to spawn interface workers: {0}")]
    Spawn(#[from] std::io::Error),
}

/// What a successful prepare hands back to the caller.
#[derive(Debug, Clone, Copy)]
pub struct Prepared {
    /// Handle for the staged packet, consumed by finalize.
    pub packet_fd: PacketFd,
    /// Offset within the caller's buffer where the user payload starts.
    pub payload_offset: usize,
}

/// What a successful wait hands back to the caller.
#[derive(Debug, Clone, Copy)]
pub struct Received {
    /// The delivered packet's index.
    pub index: PacketIndex,
    /// Bytes copied into the caller's buffer.
    pub len: usize,
}

/// The network subsystem: interface registry, per-process sockets, codecs,
/// and the socket API.
///
/// One value per system, constructed by [`init`] and handed around by
/// reference; tests build their own.
/// Interior mutability is limited to the port counter, the socket tables,
/// and the packet queues.
///
/// [`init`]: Netstack::init
pub struct Netstack {
    config: StackConfig,
    registry: Registry,
    processes: Arc<ProcessTable>,
    ports: PortAllocator,
    codecs: Arc<CodecSet>,
    sysfs: Sysfs,
}

/// Glue between the RX workers and the inbound codec: every popped frame is
/// decoded and dispatched into the process table.
struct StackDecoder {
    inbound: Arc<dyn InboundCodec>,
    sink: Dispatcher,
}

impl FrameDecoder for StackDecoder {
    fn decode(&self, iface: &Interface, packet: Packet) {
        self.inbound.decode(iface, packet, &self.sink);
    }
}

impl Netstack {
    /// Bring up the subsystem: probe and register `devices` in order,
    /// append the loopback pseudo-device, and publish every interface's
    /// attributes.
    ///
    /// Workers are not running yet; call [`finalize`] once the rest of the
    /// system is ready for traffic.
    ///
    /// [`finalize`]: Netstack::finalize
    ///
    /// # Errors
    ///
    /// Returns [`InitError`] if a device probe or an attribute publication
    /// fails.
    pub fn init(
        config: StackConfig,
        devices: Vec<DeviceSpec>,
        codecs: CodecSet,
    ) -> Result<Netstack, InitError> {
        let mut builder = RegistryBuilder::new(config.queue_capacity);
        for spec in devices {
            builder.register(spec)?;
        }
        let registry = builder.finish()?;
        let sysfs = Sysfs::new();
        for iface in registry.iter() {
            publish_interface(&sysfs, iface)?;
        }
        info!(
            "network subsystem initialized with {} interfaces",
            registry.len()
        );
        Ok(Netstack {
            ports: PortAllocator::new(config.first_ephemeral_port),
            config,
            registry,
            processes: Arc::new(ProcessTable::new()),
            codecs: Arc::new(codecs),
            sysfs,
        })
    }

    /// Attach drivers and spawn the RX/TX workers of every enabled
    /// interface.
    ///
    /// # Errors
    ///
    /// Returns [`InitError`] if a driver attach or a thread spawn fails.
    pub fn finalize(&self) -> Result<(), InitError> {
        let decoder: Arc<dyn FrameDecoder> = Arc::new(StackDecoder {
            inbound: Arc::clone(self.codecs.inbound()),
            sink: Dispatcher::new(Arc::clone(&self.processes)),
        });
        for iface in self.registry.iter().filter(|iface| iface.enabled()) {
            iface.driver().attach(iface)?;
            iface::spawn_workers(iface, &decoder)?;
        }
        Ok(())
    }

    /// The interface registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The per-process socket table.
    #[must_use]
    pub fn processes(&self) -> &Arc<ProcessTable> {
        &self.processes
    }

    /// The published attribute tree.
    #[must_use]
    pub fn sysfs(&self) -> &Sysfs {
        &self.sysfs
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Open a socket for `pid`.
    ///
    /// Datagram sockets speak DNS, stream sockets speak TCP, raw sockets
    /// speak any protocol.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::InvalidTypeProtocol`] when the type cannot
    /// speak the protocol.
    pub fn open(
        &self,
        pid: Pid,
        domain: SockDomain,
        ty: SockType,
        protocol: Protocol,
    ) -> Result<SocketFd, SocketError> {
        match (ty, protocol) {
            (SockType::Dgram, p) if p != Protocol::Dns => {
                return Err(SocketError::InvalidTypeProtocol);
            }
            (SockType::Stream, p) if p != Protocol::Tcp => {
                return Err(SocketError::InvalidTypeProtocol);
            }
            _ => {}
        }
        let fd = self
            .processes
            .register_socket(pid, Socket::new(domain, ty, protocol));
        debug!("{pid}: opened {ty:?}/{protocol:?} socket {fd}");
        Ok(fd)
    }

    /// Close the socket named by `(pid, fd)`.
    ///
    /// Idempotent: closing an unknown descriptor is a silent no-op.
    pub fn close(&self, pid: Pid, fd: SocketFd) {
        self.processes.release_socket(pid, fd);
    }

    /// Enable or disable inbound delivery into the socket's queue.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::InvalidFd`] for an unknown descriptor.
    pub fn listen(&self, pid: Pid, fd: SocketFd, listen: bool) -> Result<(), SocketError> {
        let socket = self.processes.socket(pid, fd).ok_or(SocketError::InvalidFd)?;
        socket.set_listen(listen);
        Ok(())
    }

    /// Bind a datagram socket to the next local port and return it.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::InvalidType`] for non-datagram sockets.
    pub fn client_bind(&self, pid: Pid, fd: SocketFd) -> Result<u16, SocketError> {
        let socket = self.processes.socket(pid, fd).ok_or(SocketError::InvalidFd)?;
        if socket.ty() != SockType::Dgram {
            return Err(SocketError::InvalidType);
        }
        let port = self.ports.allocate();
        socket.set_local_port(port);
        debug!("{pid}: socket {fd} bound to local port {port}");
        Ok(port)
    }

    /// Connect a stream socket to `server:port` and return the allocated
    /// local port.
    ///
    /// The transport's connect runs synchronously; the socket is connected
    /// once it returns.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::InvalidType`] for non-stream sockets and
    /// relays transport failures verbatim.
    pub fn connect(
        &self,
        pid: Pid,
        fd: SocketFd,
        server: Ipv4Addr,
        port: u16,
    ) -> Result<u16, SocketError> {
        let socket = self.processes.socket(pid, fd).ok_or(SocketError::InvalidFd)?;
        if socket.ty() != SockType::Stream {
            return Err(SocketError::InvalidType);
        }
        let iface = self
            .registry
            .select(server)
            .ok_or(SocketError::NoInterface)?;
        let local_port = self.ports.allocate();
        socket.set_local_port(local_port);
        socket.set_server(server, port);
        self.codecs.stream().connect(&socket, iface)?;
        socket.set_connected(true);
        debug!("{pid}: socket {fd} connected to {server}:{port} from port {local_port}");
        Ok(local_port)
    }

    /// Disconnect a connected stream socket.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::NotConnected`] when there is nothing to tear
    /// down and relays transport failures verbatim.
    pub fn disconnect(&self, pid: Pid, fd: SocketFd) -> Result<(), SocketError> {
        let socket = self.processes.socket(pid, fd).ok_or(SocketError::InvalidFd)?;
        if socket.ty() != SockType::Stream {
            return Err(SocketError::InvalidType);
        }
        if !socket.connected() {
            return Err(SocketError::NotConnected);
        }
        let server = socket.state().server_address;
        let iface = self
            .registry
            .select(server)
            .ok_or(SocketError::NoInterface)?;
        self.codecs.stream().disconnect(&socket, iface)?;
        socket.set_connected(false);
        debug!("{pid}: socket {fd} disconnected");
        Ok(())
    }

    /// Stage an outbound packet: the codec writes the header stack into
    /// `buf` and the returned [`Prepared`] says where the user payload
    /// goes.
    ///
    /// # Errors
    ///
    /// All preconditions are checked before anything is staged: unknown
    /// descriptors, a registry with no usable interface, unconnected
    /// stream sockets, and descriptors that do not match the socket's
    /// protocol all fail without side effects, as do codec failures.
    pub fn prepare_packet(
        &self,
        pid: Pid,
        fd: SocketFd,
        desc: &PacketDescriptor,
        buf: &mut [u8],
    ) -> Result<Prepared, SocketError> {
        let socket = self.processes.socket(pid, fd).ok_or(SocketError::InvalidFd)?;
        if self.registry.is_empty() {
            return Err(SocketError::NoInterface);
        }
        if socket.ty() == SockType::Stream && !socket.connected() {
            return Err(SocketError::NotConnected);
        }
        let (iface, frame) = match socket.protocol() {
            Protocol::Icmp => {
                let PacketDescriptor::Icmp(icmp) = desc else {
                    return Err(SocketError::InvalidPacketDescriptor);
                };
                let iface = self
                    .registry
                    .select(icmp.target)
                    .ok_or(SocketError::NoInterface)?;
                (iface, self.datagram(Protocol::Icmp).prepare(iface, desc, buf)?)
            }
            Protocol::Dns => {
                let PacketDescriptor::Dns(dns) = desc else {
                    return Err(SocketError::InvalidPacketDescriptor);
                };
                if !dns.query {
                    // response sending is not implemented
                    return Err(SocketError::Unimplemented);
                }
                let mut dns = *dns;
                if socket.ty() == SockType::Dgram {
                    dns.source_port = socket.local_port();
                }
                let iface = self
                    .registry
                    .select(dns.target)
                    .ok_or(SocketError::NoInterface)?;
                let desc = PacketDescriptor::Dns(dns);
                (iface, self.datagram(Protocol::Dns).prepare(iface, &desc, buf)?)
            }
            Protocol::Tcp => {
                let PacketDescriptor::Tcp(tcp) = desc else {
                    return Err(SocketError::InvalidPacketDescriptor);
                };
                let server = socket.state().server_address;
                let iface = self
                    .registry
                    .select(server)
                    .ok_or(SocketError::NoInterface)?;
                (iface, self.codecs.stream().prepare(iface, &socket, tcp, buf)?)
            }
        };
        let packet_fd = socket.register_packet(PendingPacket {
            iface: iface.id(),
            tags: frame.tags,
            header_len: frame.header_len,
            total_len: frame.total_len,
        });
        debug!(
            "{pid}: socket {fd} staged packet {packet_fd} ({} header bytes, {} total)",
            frame.header_len, frame.total_len
        );
        Ok(Prepared {
            packet_fd,
            payload_offset: frame.header_len,
        })
    }

    /// Finish a staged packet: the codec finalizes checksums over `buf`,
    /// the frame is cloned into a kernel-owned packet and enqueued on the
    /// interface it was prepared for, and the staging slot is erased.
    ///
    /// # Errors
    ///
    /// A codec failure keeps the staged entry so the call can be retried;
    /// every other error leaves no trace.
    pub fn finalize_packet(
        &self,
        pid: Pid,
        fd: SocketFd,
        packet_fd: PacketFd,
        buf: &mut [u8],
    ) -> Result<PacketIndex, SocketError> {
        let socket = self.processes.socket(pid, fd).ok_or(SocketError::InvalidFd)?;
        if !socket.has_packet(packet_fd) {
            return Err(SocketError::InvalidPacketFd);
        }
        if socket.ty() == SockType::Stream && !socket.connected() {
            return Err(SocketError::NotConnected);
        }
        let Some(pending) = socket.take_packet(packet_fd) else {
            return Err(SocketError::InvalidPacketFd);
        };
        let iface = match self.registry.get(pending.iface) {
            Some(iface) => iface,
            // the registry is append-only and staged packets only ever name
            // interfaces it handed out
            None => unreachable!("staged packet names an unregistered interface"),
        };
        let finalized = match socket.protocol() {
            Protocol::Icmp | Protocol::Dns => self
                .datagram(socket.protocol())
                .finalize(iface, &pending, buf),
            Protocol::Tcp => self.codecs.stream().finalize(iface, &socket, &pending, buf),
        };
        match finalized {
            Ok(packet) => {
                let index = packet.index();
                debug!("{pid}: socket {fd} sending frame {index} via {}", iface.name());
                iface.send(packet);
                Ok(index)
            }
            Err(error) => {
                socket.restore_packet(packet_fd, pending);
                Err(SocketError::Codec(error))
            }
        }
    }

    /// Wait for an inbound packet, sleeping indefinitely.
    ///
    /// On delivery the payload is copied into `buf` (truncated to its
    /// length) and the packet's buffer is released.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::NotListen`] if the socket is not listening.
    pub fn wait_for_packet(
        &self,
        pid: Pid,
        fd: SocketFd,
        buf: &mut [u8],
    ) -> Result<Received, SocketError> {
        self.wait(pid, fd, buf, None)
    }

    /// Wait for an inbound packet with a deadline.
    ///
    /// `ms == 0` polls: it returns [`SocketError::Timeout`] immediately
    /// when nothing is queued.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::Timeout`] when the deadline passes first.
    pub fn wait_for_packet_ms(
        &self,
        pid: Pid,
        fd: SocketFd,
        buf: &mut [u8],
        ms: u64,
    ) -> Result<Received, SocketError> {
        self.wait(pid, fd, buf, Some(ms))
    }

    fn wait(
        &self,
        pid: Pid,
        fd: SocketFd,
        buf: &mut [u8],
        timeout_ms: Option<u64>,
    ) -> Result<Received, SocketError> {
        let socket = self.processes.socket(pid, fd).ok_or(SocketError::InvalidFd)?;
        if !socket.listen() {
            return Err(SocketError::NotListen);
        }
        let packet = match timeout_ms {
            None => socket.inbox().pop_wait(),
            Some(0) => socket.inbox().try_pop().ok_or(SocketError::Timeout)?,
            Some(ms) => socket
                .inbox()
                .pop_wait_for(Duration::from_millis(ms))
                .ok_or(SocketError::Timeout)?,
        };
        let len = packet.len().min(buf.len());
        buf[..len].copy_from_slice(&packet.payload()[..len]);
        Ok(Received {
            index: packet.index(),
            len,
        })
        // the packet's buffer is released here
    }

    fn datagram(&self, protocol: Protocol) -> &dyn crate::codec::DatagramCodec {
        match self.codecs.codec(protocol) {
            ProtocolCodec::Datagram(codec) => codec,
            ProtocolCodec::Stream(_) => unreachable!("{protocol:?} is registered as a datagram codec"),
        }
    }
}

fn publish_interface(sysfs: &Sysfs, iface: &Interface) -> Result<(), SysfsErr> {
    let dir = format!("net/{}", iface.name());
    sysfs.publish(&format!("{dir}/name"), iface.name())?;
    sysfs.publish(&format!("{dir}/driver"), iface.driver().kind())?;
    sysfs.publish(&format!("{dir}/enabled"), iface.enabled())?;
    let pci = iface
        .pci()
        .map_or_else(|| "none".to_string(), |pci| pci.to_string());
    sysfs.publish(&format!("{dir}/pci_device"), pci)?;
    sysfs.publish(&format!("{dir}/mac"), iface.mac())?;
    sysfs.publish(&format!("{dir}/ip"), iface.ip())?;
    sysfs.publish(&format!("{dir}/gateway"), iface.gateway())?;
    Ok(())
}
