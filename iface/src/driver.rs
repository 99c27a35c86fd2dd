// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Device driver contract

use crate::interface::Interface;
use crate::pci::PciAddress;
use net::eth::Mac;
use net::interface::InterfaceName;
use net::packet::Packet;
use std::fmt::Debug;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// Errors drivers report during probe or attach.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The device could not be probed.
    #[error("device probe failed: {0}")]
    Probe(String),
    /// The device could not be attached.
    #[error("device attach failed: {0}")]
    Attach(String),
}

/// The contract between the subsystem and a device driver.
///
/// Drivers never hold references back into the subsystem; the owning
/// [`Interface`] is handed to them per call.
/// Inbound frames are delivered by calling [`Interface::push_rx`], which
/// enqueues the frame and signals the RX worker.
pub trait Driver: Send + Sync + Debug {
    /// The driver tag published to sysfs (e.g. `"loopback"`, `"rtl8139"`).
    fn kind(&self) -> &'static str;

    /// Probe the device and report its MAC address.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Probe`] if the device cannot be brought up.
    fn probe(&self, pci: Option<&PciAddress>) -> Result<Mac, DriverError>;

    /// Attach to the fully-built descriptor (interrupt wiring and the like).
    ///
    /// Called once per interface before its workers are spawned.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Attach`] if the device cannot be wired up.
    fn attach(&self, iface: &Interface) -> Result<(), DriverError> {
        let _ = iface;
        Ok(())
    }

    /// Hand one outbound frame to the hardware.
    ///
    /// Called from the TX worker only; the worker releases the buffer after
    /// this returns.
    fn transmit(&self, iface: &Interface, packet: &Packet);

    /// True for the loopback pseudo-device.
    fn is_loopback(&self) -> bool {
        false
    }
}

/// Everything the registry needs to bring up one device.
#[derive(Debug, Clone)]
pub struct DeviceSpec {
    /// Human name of the interface (`eth0`).
    pub name: InterfaceName,
    /// The driver managing the device.
    pub driver: Arc<dyn Driver>,
    /// PCI coordinates, if the device sits on a bus.
    pub pci: Option<PciAddress>,
    /// Configured IPv4 address.
    pub ip: Ipv4Addr,
    /// Configured IPv4 gateway.
    pub gateway: Ipv4Addr,
    /// Whether the interface participates in traffic.
    pub enabled: bool,
}
