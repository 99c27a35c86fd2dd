// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Loopback pseudo-device

use crate::driver::{DeviceSpec, Driver, DriverError};
use crate::interface::Interface;
use crate::pci::PciAddress;
use net::eth::Mac;
use net::interface::InterfaceName;
use net::packet::Packet;
use std::net::Ipv4Addr;
use std::sync::Arc;

use tracing::trace;

/// The loopback driver: every transmitted frame is delivered straight back
/// into the same interface's RX queue.
#[derive(Debug, Default)]
pub struct Loopback;

impl Loopback {
    /// The canonical loopback device, registered last by the registry
    /// builder.
    #[must_use]
    #[allow(clippy::expect_used)] // the name is statically legal
    pub fn device_spec() -> DeviceSpec {
        DeviceSpec {
            name: InterfaceName::new("lo").expect("static name is legal"),
            driver: Arc::new(Loopback),
            pci: None,
            ip: Ipv4Addr::LOCALHOST,
            gateway: Ipv4Addr::UNSPECIFIED,
            enabled: true,
        }
    }
}

impl Driver for Loopback {
    fn kind(&self) -> &'static str {
        "loopback"
    }

    fn probe(&self, _pci: Option<&PciAddress>) -> Result<Mac, DriverError> {
        Ok(Mac::ZERO)
    }

    fn transmit(&self, iface: &Interface, packet: &Packet) {
        trace!("{}: looping frame {} back", iface.name(), packet.index());
        iface.push_rx(packet.clone_payload());
    }

    fn is_loopback(&self) -> bool {
        true
    }
}
