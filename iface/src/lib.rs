// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![forbid(unsafe_code)]
#![deny(clippy::all)]

//! Network interfaces: descriptors, the append-only registry, the bounded
//! per-interface RX/TX queues, and the worker threads that drain them.

mod driver;
mod interface;
mod loopback;
mod pci;
mod queue;
mod registry;
mod worker;

pub use driver::{DeviceSpec, Driver, DriverError};
pub use interface::Interface;
pub use loopback::Loopback;
pub use pci::PciAddress;
pub use queue::PktQueue;
pub use registry::{Registry, RegistryBuilder};
pub use worker::{FrameDecoder, spawn_workers};
