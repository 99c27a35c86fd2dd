// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PCI device coordinates

use std::fmt::{Debug, Display, Formatter};

/// The Domain-Bus-Device-Function coordinates of a PCI network device.
///
/// Opaque to the subsystem: the registry records and publishes it, drivers
/// interpret it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PciAddress {
    /// PCI domain (almost always zero).
    pub domain: u16,
    /// Bus number.
    pub bus: u8,
    /// Device number on the bus.
    pub device: u8,
    /// Function number of the device.
    pub function: u8,
}

impl PciAddress {
    /// Assemble PCI coordinates.
    #[must_use]
    pub fn new(domain: u16, bus: u8, device: u8, function: u8) -> PciAddress {
        PciAddress {
            domain,
            bus,
            device,
            function,
        }
    }
}

impl Display for PciAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

impl Debug for PciAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <_ as Display>::fmt(self, f)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_is_ebdf_shaped() {
        let pci = PciAddress::new(0, 0, 3, 0);
        assert_eq!(format!("{pci}"), "0000:00:03.0");
    }
}
