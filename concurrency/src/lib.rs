// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![forbid(unsafe_code)]
#![deny(missing_docs, clippy::all)]

//! Blocking synchronization primitives for the packet path.
//!
//! Queue signalling uses counting [`Semaphore`]s; socket-side waiting uses a
//! [`WaitQueue`], a FIFO paired with the condition variable of its own lock.

mod semaphore;
mod waitq;

pub use semaphore::Semaphore;
pub use waitq::WaitQueue;
