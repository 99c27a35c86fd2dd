// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Local port allocator

use std::sync::atomic::{AtomicU16, Ordering};

/// The process-wide allocator of local UDP/TCP source ports.
///
/// One atomic counter shared by every socket: `client_bind` and `connect`
/// each take one port by post-increment, so concurrent allocations are
/// distinct and monotonically increasing for the life of the stack.
#[derive(Debug)]
pub struct PortAllocator {
    next: AtomicU16,
}

impl PortAllocator {
    /// Create an allocator whose first handed-out port is `first`.
    #[must_use]
    pub fn new(first: u16) -> PortAllocator {
        PortAllocator {
            next: AtomicU16::new(first),
        }
    }

    /// Take the next port.
    #[must_use]
    pub fn allocate(&self) -> u16 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn ports_are_monotonic() {
        let ports = PortAllocator::new(1234);
        assert_eq!(ports.allocate(), 1234);
        assert_eq!(ports.allocate(), 1235);
        assert_eq!(ports.allocate(), 1236);
    }

    #[test]
    fn concurrent_allocations_are_distinct() {
        let ports = Arc::new(PortAllocator::new(1234));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ports = Arc::clone(&ports);
                thread::spawn(move || (0..64).map(|_| ports.allocate()).collect::<Vec<_>>())
            })
            .collect();
        let mut seen: Vec<u16> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 8 * 64);
    }
}
