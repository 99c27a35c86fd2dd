// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Subsystem configuration

use serde::{Deserialize, Serialize};

/// Tunables of the network subsystem.
///
/// The defaults match the shipped constants; management tooling may
/// deserialize overrides and tests inject their own values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StackConfig {
    /// Capacity of each per-interface RX and TX queue, in packets.
    pub queue_capacity: usize,
    /// First port handed out by the local port allocator.
    pub first_ephemeral_port: u16,
}

impl Default for StackConfig {
    fn default() -> Self {
        StackConfig {
            queue_capacity: 32,
            first_ephemeral_port: 1234,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_the_shipped_constants() {
        let config = StackConfig::default();
        assert_eq!(config.queue_capacity, 32);
        assert_eq!(config.first_ephemeral_port, 1234);
    }
}
