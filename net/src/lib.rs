// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![forbid(unsafe_code)]
#![deny(missing_docs, clippy::all)]

//! Core network value types: owned packet buffers, MAC addresses, and
//! interface identifiers.

pub mod eth;
pub mod interface;
pub mod packet;
