// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-process socket registry
//!
//! This is the scheduler-facing side of the subsystem: sockets are owned by
//! processes, looked up by (pid, fd), and torn down when the process dies.

use crate::socket::Socket;
use ahash::RandomState;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use tracing::debug;

/// A process identifier.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(u32);

impl Pid {
    /// Treat the provided `u32` as a [`Pid`].
    #[must_use]
    pub fn new(raw: u32) -> Pid {
        Pid(raw)
    }
}

impl Display for Pid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <_ as Display>::fmt(&self.0, f)
    }
}

/// A per-process socket descriptor.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketFd(u64);

impl SocketFd {
    /// Treat the provided `u64` as a [`SocketFd`].
    ///
    /// Useful for exercising the invalid-descriptor paths.
    #[must_use]
    pub fn new(raw: u64) -> SocketFd {
        SocketFd(raw)
    }
}

impl Display for SocketFd {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <_ as Display>::fmt(&self.0, f)
    }
}

/// Scheduler state of a process slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// The slot holds no process.
    Empty,
    /// The process exists but has not been scheduled yet.
    New,
    /// Runnable.
    Ready,
    /// Currently on a CPU.
    Running,
    /// Blocked on a resource.
    Blocked,
    /// Sleeping on a timer.
    Sleeping,
    /// Terminated but not yet reaped.
    Killed,
}

impl ProcessState {
    /// Whether the dispatcher may deliver packets to this process's sockets.
    #[must_use]
    pub fn is_live(self) -> bool {
        !matches!(
            self,
            ProcessState::Empty | ProcessState::New | ProcessState::Killed
        )
    }
}

#[derive(Debug)]
struct Slot {
    state: ProcessState,
    sockets: HashMap<SocketFd, Arc<Socket>, RandomState>,
    next_fd: u64,
}

impl Slot {
    fn new(state: ProcessState) -> Slot {
        Slot {
            state,
            sockets: HashMap::with_hasher(RandomState::with_seed(0)),
            next_fd: 1,
        }
    }
}

impl Default for Slot {
    fn default() -> Self {
        Slot::new(ProcessState::Running)
    }
}

/// The pid-keyed table of process slots and their sockets.
///
/// Guarded by one RW lock: dispatch takes brief read locks from the RX
/// workers while user threads register and release sockets under the write
/// lock.
#[derive(Debug)]
pub struct ProcessTable {
    slots: RwLock<HashMap<Pid, Slot, RandomState>>,
}

impl Default for ProcessTable {
    fn default() -> Self {
        ProcessTable::new()
    }
}

impl ProcessTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> ProcessTable {
        ProcessTable {
            slots: RwLock::new(HashMap::with_hasher(RandomState::with_seed(0))),
        }
    }

    /// The scheduler state of `pid`, if the slot exists.
    #[must_use]
    pub fn state(&self, pid: Pid) -> Option<ProcessState> {
        self.slots.read().get(&pid).map(|slot| slot.state)
    }

    /// Record the scheduler state of `pid`, creating the slot if needed.
    pub fn set_state(&self, pid: Pid, state: ProcessState) {
        self.slots.write().entry(pid).or_default().state = state;
    }

    /// Register a socket under `pid`, creating the slot if needed.
    ///
    /// Descriptors are assigned per process in registration order.
    #[must_use]
    pub fn register_socket(&self, pid: Pid, socket: Socket) -> SocketFd {
        let mut slots = self.slots.write();
        let slot = slots.entry(pid).or_default();
        let fd = SocketFd(slot.next_fd);
        slot.next_fd += 1;
        slot.sockets.insert(fd, Arc::new(socket));
        fd
    }

    /// The socket registered under `(pid, fd)`, if any.
    #[must_use]
    pub fn socket(&self, pid: Pid, fd: SocketFd) -> Option<Arc<Socket>> {
        self.slots
            .read()
            .get(&pid)
            .and_then(|slot| slot.sockets.get(&fd))
            .map(Arc::clone)
    }

    /// True iff `(pid, fd)` names a registered socket.
    #[must_use]
    pub fn has_socket(&self, pid: Pid, fd: SocketFd) -> bool {
        self.slots
            .read()
            .get(&pid)
            .is_some_and(|slot| slot.sockets.contains_key(&fd))
    }

    /// Release the socket registered under `(pid, fd)`.
    ///
    /// Silent when the descriptor is unknown; descriptors are never reused.
    pub fn release_socket(&self, pid: Pid, fd: SocketFd) {
        if let Some(slot) = self.slots.write().get_mut(&pid) {
            slot.sockets.remove(&fd);
        }
    }

    /// All sockets registered under `pid`.
    #[must_use]
    pub fn sockets(&self, pid: Pid) -> Vec<Arc<Socket>> {
        self.slots
            .read()
            .get(&pid)
            .map(|slot| slot.sockets.values().map(Arc::clone).collect())
            .unwrap_or_default()
    }

    /// All sockets of live processes, for inbound dispatch.
    ///
    /// The arcs are cloned out under the read lock so delivery happens with
    /// the table unlocked.
    #[must_use]
    pub fn live_sockets(&self) -> Vec<Arc<Socket>> {
        self.slots
            .read()
            .values()
            .filter(|slot| slot.state.is_live())
            .flat_map(|slot| slot.sockets.values().map(Arc::clone))
            .collect()
    }

    /// Tear down `pid`: mark it killed and release all of its sockets.
    pub fn terminate(&self, pid: Pid) {
        let mut slots = self.slots.write();
        if let Some(slot) = slots.get_mut(&pid) {
            debug!("terminating process {pid}: releasing {} sockets", slot.sockets.len());
            slot.sockets.clear();
            slot.state = ProcessState::Killed;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::socket::{Protocol, SockDomain, SockType};

    fn raw_icmp() -> Socket {
        Socket::new(SockDomain::Inet, SockType::Raw, Protocol::Icmp)
    }

    #[test]
    fn descriptors_are_per_process_and_never_reused() {
        let table = ProcessTable::new();
        let pid = Pid::new(7);
        let first = table.register_socket(pid, raw_icmp());
        let second = table.register_socket(pid, raw_icmp());
        assert_ne!(first, second);

        table.release_socket(pid, first);
        assert!(!table.has_socket(pid, first));
        let third = table.register_socket(pid, raw_icmp());
        assert_ne!(third, first);
        assert_ne!(third, second);
    }

    #[test]
    fn release_is_silent_on_unknown_descriptors() {
        let table = ProcessTable::new();
        table.release_socket(Pid::new(1), SocketFd::new(99999));
    }

    #[test]
    fn live_sockets_skip_dead_processes() {
        let table = ProcessTable::new();
        let alive = Pid::new(1);
        let dead = Pid::new(2);
        let _ = table.register_socket(alive, raw_icmp());
        let _ = table.register_socket(dead, raw_icmp());
        table.set_state(dead, ProcessState::Killed);
        assert_eq!(table.live_sockets().len(), 1);

        table.set_state(alive, ProcessState::New);
        assert!(table.live_sockets().is_empty());
    }

    #[test]
    fn terminate_releases_everything() {
        let table = ProcessTable::new();
        let pid = Pid::new(3);
        let fd = table.register_socket(pid, raw_icmp());
        table.terminate(pid);
        assert!(!table.has_socket(pid, fd));
        assert_eq!(table.state(pid), Some(ProcessState::Killed));
    }
}
