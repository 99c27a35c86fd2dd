// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Interface descriptor

use crate::driver::{DeviceSpec, Driver};
use crate::pci::PciAddress;
use crate::queue::PktQueue;
use net::eth::Mac;
use net::interface::{InterfaceId, InterfaceName};
use net::packet::Packet;
use parking_lot::Mutex;
use std::fmt::{Debug, Formatter};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::warn;

// handles are held for the life of the interface; workers are never joined
#[allow(unused)]
pub(crate) struct Workers {
    pub(crate) rx: JoinHandle<()>,
    pub(crate) tx: JoinHandle<()>,
}

/// One network device plus its RX/TX plumbing.
///
/// Descriptors are created by the registry during init and never removed.
/// The TX queue is fed by arbitrary user threads serialized by `tx_lock`;
/// the RX queue is fed by the driver.
/// Each queue is drained by its single worker thread.
pub struct Interface {
    id: InterfaceId,
    name: InterfaceName,
    enabled: bool,
    loopback: bool,
    mac: Mac,
    ip: Ipv4Addr,
    gateway: Ipv4Addr,
    pci: Option<PciAddress>,
    driver: Arc<dyn Driver>,
    rx: PktQueue,
    tx: PktQueue,
    tx_lock: Mutex<()>,
    pub(crate) workers: Mutex<Option<Workers>>,
}

impl Interface {
    pub(crate) fn new(id: InterfaceId, spec: DeviceSpec, mac: Mac, queue_capacity: usize) -> Interface {
        Interface {
            id,
            loopback: spec.driver.is_loopback(),
            name: spec.name,
            enabled: spec.enabled,
            mac,
            ip: spec.ip,
            gateway: spec.gateway,
            pci: spec.pci,
            driver: spec.driver,
            rx: PktQueue::new(queue_capacity),
            tx: PktQueue::new(queue_capacity),
            tx_lock: Mutex::new(()),
            workers: Mutex::new(None),
        }
    }

    /// The registry-assigned id of this interface.
    #[must_use]
    pub fn id(&self) -> InterfaceId {
        self.id
    }

    /// The human name of this interface.
    #[must_use]
    pub fn name(&self) -> &InterfaceName {
        &self.name
    }

    /// True iff the interface participates in traffic.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// True for the loopback pseudo-device.
    #[must_use]
    pub fn is_loopback(&self) -> bool {
        self.loopback
    }

    /// The MAC address reported by the driver at probe time.
    #[must_use]
    pub fn mac(&self) -> Mac {
        self.mac
    }

    /// The configured IPv4 address.
    #[must_use]
    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    /// The configured IPv4 gateway.
    #[must_use]
    pub fn gateway(&self) -> Ipv4Addr {
        self.gateway
    }

    /// PCI coordinates, if the device sits on a bus.
    #[must_use]
    pub fn pci(&self) -> Option<PciAddress> {
        self.pci
    }

    /// The driver managing this device.
    #[must_use]
    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// The inbound queue drained by the RX worker.
    #[must_use]
    pub fn rx_queue(&self) -> &PktQueue {
        &self.rx
    }

    /// The outbound queue drained by the TX worker.
    #[must_use]
    pub fn tx_queue(&self) -> &PktQueue {
        &self.tx
    }

    /// Enqueue an outbound frame for transmission.
    ///
    /// Producers are serialized by the interface's TX mutex, so frames sent
    /// through one interface are transmitted in enqueue order.
    /// The queue is sized for burst tolerance; an overflowing frame is
    /// dropped and counted against the interface, not the caller.
    pub fn send(&self, packet: Packet) {
        let _guard = self.tx_lock.lock();
        if self.tx.push(Box::new(packet)).is_err() {
            warn!("{}: tx queue full, dropping frame", self.name);
        }
    }

    /// Deliver one inbound frame from the driver.
    ///
    /// Enqueues the frame and signals the RX worker.
    /// The driver is the only producer of the RX queue.
    pub fn push_rx(&self, packet: Packet) {
        if self.rx.push(Box::new(packet)).is_err() {
            warn!("{}: rx queue full, dropping frame", self.name);
        }
    }
}

impl Debug for Interface {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interface")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("loopback", &self.loopback)
            .field("mac", &self.mac)
            .field("ip", &self.ip)
            .field("gateway", &self.gateway)
            .field("pci", &self.pci)
            .field("driver", &self.driver.kind())
            .finish_non_exhaustive()
    }
}
