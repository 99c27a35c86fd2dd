// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-interface RX and TX worker threads

use crate::interface::{Interface, Workers};
use std::sync::Arc;
use std::thread;

use net::packet::Packet;
use tracing::{debug, info, trace};

const WORKER_STACK_SIZE: usize = 1 << 20;

/// The protocol stack's entry point for inbound frames.
///
/// The RX worker hands every popped frame to the decoder, which peels the
/// protocol layers and copies the frame out to interested consumers.
/// The worker owns the buffer; it is released when `decode` returns.
pub trait FrameDecoder: Send + Sync {
    /// Decode one inbound frame, consuming the packet.
    fn decode(&self, iface: &Interface, packet: Packet);
}

/// Spawn the RX and TX workers for `iface`.
///
/// Workers are named `rx-<if>` / `tx-<if>`, run forever, and are never
/// cancelled.
/// Spawning twice is a no-op.
///
/// # Errors
///
/// Returns the OS error if a thread cannot be spawned.
pub fn spawn_workers(
    iface: &Arc<Interface>,
    decoder: &Arc<dyn FrameDecoder>,
) -> std::io::Result<()> {
    let mut workers = iface.workers.lock();
    if workers.is_some() {
        debug!("{}: workers already running", iface.name());
        return Ok(());
    }

    let rx = {
        let iface = Arc::clone(iface);
        let decoder = Arc::clone(decoder);
        thread::Builder::new()
            .name(format!("rx-{}", iface.name()))
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || rx_loop(&iface, decoder.as_ref()))?
    };
    let tx = {
        let iface = Arc::clone(iface);
        thread::Builder::new()
            .name(format!("tx-{}", iface.name()))
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || tx_loop(&iface))?
    };

    info!("{}: spawned rx/tx workers", iface.name());
    *workers = Some(Workers { rx, tx });
    Ok(())
}

fn rx_loop(iface: &Interface, decoder: &dyn FrameDecoder) {
    loop {
        let packet = iface.rx_queue().pop_wait();
        trace!(
            "{}: rx frame {} ({} bytes)",
            iface.name(),
            packet.index(),
            packet.len()
        );
        decoder.decode(iface, *packet);
        // the frame buffer was dropped by the decoder
    }
}

fn tx_loop(iface: &Interface) {
    loop {
        let packet = iface.tx_queue().pop_wait();
        trace!(
            "{}: tx frame {} ({} bytes)",
            iface.name(),
            packet.index(),
            packet.len()
        );
        iface.driver().transmit(iface, &packet);
        drop(packet); // frame buffer released exactly once, after transmit
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::driver::{DeviceSpec, Driver, DriverError};
    use crate::pci::PciAddress;
    use crate::registry::RegistryBuilder;
    use concurrency::WaitQueue;
    use net::eth::Mac;
    use net::interface::InterfaceName;
    use std::net::Ipv4Addr;
    use std::sync::Mutex;
    use std::time::Duration;
    use tracing_test::traced_test;

    /// Collects every frame handed to the stack.
    struct Collector(WaitQueue<Packet>);

    impl FrameDecoder for Collector {
        fn decode(&self, _iface: &Interface, packet: Packet) {
            self.0.push(packet);
        }
    }

    /// Records every frame handed to the hardware.
    #[derive(Debug, Default)]
    struct RecordingNic {
        sent: Mutex<Vec<u64>>,
    }

    impl Driver for RecordingNic {
        fn kind(&self) -> &'static str {
            "recording"
        }
        fn probe(&self, _pci: Option<&PciAddress>) -> Result<Mac, DriverError> {
            Ok(Mac([2, 0, 0, 0, 0, 7]))
        }
        fn transmit(&self, _iface: &Interface, packet: &Packet) {
            self.sent.lock().unwrap().push(packet.index().to_u64());
        }
    }

    #[test]
    #[traced_test]
    fn rx_worker_feeds_the_decoder() {
        let registry = RegistryBuilder::new(32).finish().unwrap();
        let lo = registry.select(Ipv4Addr::LOCALHOST).unwrap();
        let collector = Arc::new(Collector(WaitQueue::new()));
        let decoder = Arc::clone(&collector) as Arc<dyn FrameDecoder>;
        spawn_workers(lo, &decoder).unwrap();

        lo.push_rx(Packet::from_frame(lo.id(), b"ping"));

        let packet = collector
            .0
            .pop_wait_for(Duration::from_secs(1))
            .expect("rx worker should deliver the frame");
        assert_eq!(packet.payload(), b"ping");
    }

    #[test]
    #[traced_test]
    fn tx_worker_transmits_in_order() {
        let nic = Arc::new(RecordingNic::default());
        let mut builder = RegistryBuilder::new(32);
        builder
            .register(DeviceSpec {
                name: InterfaceName::new("eth0").unwrap(),
                driver: Arc::clone(&nic) as Arc<dyn Driver>,
                pci: None,
                ip: "10.0.0.2".parse().unwrap(),
                gateway: "10.0.0.1".parse().unwrap(),
                enabled: true,
            })
            .unwrap();
        let registry = builder.finish().unwrap();
        let eth0 = registry.select("10.0.0.9".parse().unwrap()).unwrap();
        let decoder: Arc<dyn FrameDecoder> = Arc::new(Collector(WaitQueue::new()));
        spawn_workers(eth0, &decoder).unwrap();

        let first = Packet::from_frame(eth0.id(), b"one");
        let second = Packet::from_frame(eth0.id(), b"two");
        let expected = vec![first.index().to_u64(), second.index().to_u64()];
        eth0.send(first);
        eth0.send(second);

        let deadline = std::time::Instant::now() + Duration::from_secs(1);
        loop {
            if *nic.sent.lock().unwrap() == expected {
                break;
            }
            assert!(
                std::time::Instant::now() < deadline,
                "tx worker did not transmit both frames"
            );
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    #[traced_test]
    fn loopback_round_trip() {
        let registry = RegistryBuilder::new(32).finish().unwrap();
        let lo = registry.select(Ipv4Addr::LOCALHOST).unwrap();
        assert!(lo.driver().is_loopback());
        let queue = Arc::new(Collector(WaitQueue::new()));
        let decoder: Arc<dyn FrameDecoder> = Arc::clone(&queue) as Arc<dyn FrameDecoder>;
        spawn_workers(lo, &decoder).unwrap();

        lo.send(Packet::from_frame(lo.id(), b"abcd"));

        let delivered = queue
            .0
            .pop_wait_for(Duration::from_secs(1))
            .expect("frame should loop back through tx -> driver -> rx");
        assert_eq!(delivered.payload(), b"abcd");
    }
}
