// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Append-only interface registry

use crate::driver::{DeviceSpec, DriverError};
use crate::interface::Interface;
use crate::loopback::Loopback;
use net::interface::InterfaceId;
use std::net::Ipv4Addr;
use std::sync::Arc;

use tracing::info;

/// The typed collection of interfaces.
///
/// Built once during init and append-only from then on: interfaces are never
/// removed, so the registry can be read concurrently without a lock.
#[derive(Debug)]
pub struct Registry {
    interfaces: Vec<Arc<Interface>>,
}

impl Registry {
    /// The number of registered interfaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    /// True iff no interfaces are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    /// The interface with id `id`, if registered.
    #[must_use]
    pub fn get(&self, id: InterfaceId) -> Option<&Arc<Interface>> {
        self.interfaces.get(id.to_u32() as usize)
    }

    /// Iterate the registered interfaces in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Interface>> {
        self.interfaces.iter()
    }

    /// Select the interface to carry a packet destined for `dst`.
    ///
    /// Destination 127.0.0.1 selects the first enabled loopback interface;
    /// anything else selects the first enabled non-loopback interface.
    /// Returns `None` when no such interface exists; callers map that to
    /// their "no interface" error before building a packet.
    #[must_use]
    pub fn select(&self, dst: Ipv4Addr) -> Option<&Arc<Interface>> {
        let want_loopback = dst == Ipv4Addr::LOCALHOST;
        self.interfaces
            .iter()
            .find(|iface| iface.enabled() && iface.is_loopback() == want_loopback)
    }
}

/// Init-time construction of the [`Registry`].
///
/// Physical devices are registered in discovery order; [`finish`] appends
/// the loopback pseudo-device last and seals the registry.
///
/// [`finish`]: RegistryBuilder::finish
#[derive(Debug)]
pub struct RegistryBuilder {
    queue_capacity: usize,
    interfaces: Vec<Arc<Interface>>,
}

impl RegistryBuilder {
    /// Start building a registry whose interfaces carry RX/TX queues of
    /// `queue_capacity` packets.
    #[must_use]
    pub fn new(queue_capacity: usize) -> RegistryBuilder {
        RegistryBuilder {
            queue_capacity,
            interfaces: Vec::new(),
        }
    }

    /// Probe and register one device.
    ///
    /// Ids are assigned in registration order.
    ///
    /// # Errors
    ///
    /// Returns the driver's error if the device cannot be probed; the
    /// registry is unchanged in that case.
    pub fn register(&mut self, spec: DeviceSpec) -> Result<InterfaceId, DriverError> {
        let mac = spec.driver.probe(spec.pci.as_ref())?;
        #[allow(clippy::cast_possible_truncation)] // registries hold a handful of interfaces
        let id = InterfaceId::new(self.interfaces.len() as u32);
        info!(
            "registered interface {id} ({name}, driver {driver}, mac {mac})",
            name = spec.name,
            driver = spec.driver.kind(),
        );
        self.interfaces
            .push(Arc::new(Interface::new(id, spec, mac, self.queue_capacity)));
        Ok(id)
    }

    /// Append the loopback pseudo-device and seal the registry.
    ///
    /// # Errors
    ///
    /// Returns the loopback driver's error, which does not occur in
    /// practice (loopback probe is infallible).
    pub fn finish(mut self) -> Result<Registry, DriverError> {
        self.register(Loopback::device_spec())?;
        Ok(Registry {
            interfaces: self.interfaces,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::driver::Driver;
    use net::eth::Mac;
    use net::interface::InterfaceName;
    use net::packet::Packet;
    use crate::pci::PciAddress;

    #[derive(Debug)]
    struct NullNic;

    impl Driver for NullNic {
        fn kind(&self) -> &'static str {
            "null"
        }
        fn probe(&self, _pci: Option<&PciAddress>) -> Result<Mac, DriverError> {
            Ok(Mac([0x52, 0x54, 0, 0, 0, 1]))
        }
        fn transmit(&self, _iface: &Interface, _packet: &Packet) {}
    }

    fn nic_spec(name: &str, enabled: bool) -> DeviceSpec {
        DeviceSpec {
            name: InterfaceName::new(name).unwrap(),
            driver: Arc::new(NullNic),
            pci: Some(PciAddress::new(0, 0, 3, 0)),
            ip: "10.0.0.2".parse().unwrap(),
            gateway: "10.0.0.1".parse().unwrap(),
            enabled,
        }
    }

    #[test]
    fn loopback_is_appended_last() {
        let mut builder = RegistryBuilder::new(32);
        builder.register(nic_spec("eth0", true)).unwrap();
        let registry = builder.finish().unwrap();
        assert_eq!(registry.len(), 2);
        let last = registry.get(InterfaceId::new(1)).unwrap();
        assert!(last.is_loopback());
        assert_eq!(last.name().as_str(), "lo");
        assert_eq!(last.ip(), Ipv4Addr::LOCALHOST);
    }

    #[test]
    fn select_by_destination() {
        let mut builder = RegistryBuilder::new(32);
        builder.register(nic_spec("eth0", true)).unwrap();
        let registry = builder.finish().unwrap();

        let lo = registry.select(Ipv4Addr::LOCALHOST).unwrap();
        assert!(lo.is_loopback());
        let nic = registry.select("10.0.0.9".parse().unwrap()).unwrap();
        assert_eq!(nic.name().as_str(), "eth0");
    }

    #[test]
    fn select_skips_disabled_interfaces() {
        let mut builder = RegistryBuilder::new(32);
        builder.register(nic_spec("eth0", false)).unwrap();
        let registry = builder.finish().unwrap();
        assert!(registry.select("10.0.0.9".parse().unwrap()).is_none());
    }

    #[test]
    fn ids_follow_registration_order() {
        let mut builder = RegistryBuilder::new(32);
        let first = builder.register(nic_spec("eth0", true)).unwrap();
        let second = builder.register(nic_spec("eth1", true)).unwrap();
        assert_eq!(first, InterfaceId::new(0));
        assert_eq!(second, InterfaceId::new(1));
    }
}
