// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![forbid(unsafe_code)]
#![deny(clippy::all)]

//! Virtual sysfs attribute tree.
//!
//! The subsystem publishes per-interface attributes under `net/<name>/` the
//! way a kernel publishes them under `/sys/net/<name>/`; management code and
//! tests read them back.
//! Basically, this is a module full of minor guard rails to discourage
//! mistakes when naming attribute paths.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt::Display;

use tracing::debug;

/// Errors which might occur when naming a [`Sysfs`] entry.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SysfsErr {
    /// Paths are rooted at the tree itself and must be relative.
    #[error("sysfs path {0:?} must be relative")]
    AbsolutePath(String),
    /// `.` and `..` components would allow escaping the tree.
    #[error("sysfs path {0:?} contains an illegal component")]
    IllegalComponent(String),
    /// Empty paths and empty components name nothing.
    #[error("sysfs path {0:?} has an empty component")]
    EmptyComponent(String),
}

fn check_path(path: &str) -> Result<(), SysfsErr> {
    if path.starts_with('/') {
        return Err(SysfsErr::AbsolutePath(path.to_string()));
    }
    if path.is_empty() || path.split('/').any(str::is_empty) {
        return Err(SysfsErr::EmptyComponent(path.to_string()));
    }
    if path.split('/').any(|c| c == "." || c == "..") {
        return Err(SysfsErr::IllegalComponent(path.to_string()));
    }
    Ok(())
}

/// A tree of published attributes, keyed by `/`-separated relative paths.
#[derive(Debug, Default)]
pub struct Sysfs {
    entries: RwLock<BTreeMap<String, String>>,
}

impl Sysfs {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Sysfs {
        Sysfs::default()
    }

    /// Publish `value` at `path`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`SysfsErr`] if `path` is not a legal relative attribute path.
    pub fn publish(&self, path: &str, value: impl Display) -> Result<(), SysfsErr> {
        check_path(path)?;
        let value = value.to_string();
        debug!("sysfs: {path} = {value}");
        self.entries.write().insert(path.to_string(), value);
        Ok(())
    }

    /// The value published at `path`, if any.
    #[must_use]
    pub fn read(&self, path: &str) -> Option<String> {
        self.entries.read().get(path).cloned()
    }

    /// The immediate children of directory `dir`, sorted, without duplicates.
    #[must_use]
    pub fn ls(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{dir}/");
        let entries = self.entries.read();
        let mut children: Vec<String> = entries
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .map(|rest| match rest.split_once('/') {
                Some((child, _)) => child.to_string(),
                None => rest.to_string(),
            })
            .collect();
        children.dedup();
        children
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn publish_and_read_back() {
        let sysfs = Sysfs::new();
        sysfs.publish("net/lo/enabled", true).unwrap();
        sysfs.publish("net/lo/ip", "127.0.0.1").unwrap();
        assert_eq!(sysfs.read("net/lo/enabled").as_deref(), Some("true"));
        assert_eq!(sysfs.read("net/lo/ip").as_deref(), Some("127.0.0.1"));
        assert_eq!(sysfs.read("net/lo/missing"), None);
    }

    #[test]
    fn ls_lists_immediate_children() {
        let sysfs = Sysfs::new();
        sysfs.publish("net/eth0/ip", "10.0.0.2").unwrap();
        sysfs.publish("net/eth0/mac", "52:54:00:12:34:56").unwrap();
        sysfs.publish("net/lo/ip", "127.0.0.1").unwrap();
        assert_eq!(sysfs.ls("net"), vec!["eth0", "lo"]);
        assert_eq!(sysfs.ls("net/eth0"), vec!["ip", "mac"]);
    }

    #[test]
    fn illegal_paths_are_rejected() {
        let sysfs = Sysfs::new();
        assert_eq!(
            sysfs.publish("/net/lo/ip", 0),
            Err(SysfsErr::AbsolutePath("/net/lo/ip".to_string()))
        );
        assert_eq!(
            sysfs.publish("net/../etc", 0),
            Err(SysfsErr::IllegalComponent("net/../etc".to_string()))
        );
        assert_eq!(
            sysfs.publish("net//lo", 0),
            Err(SysfsErr::EmptyComponent("net//lo".to_string()))
        );
    }
}
