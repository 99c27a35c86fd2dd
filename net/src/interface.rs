// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Interface identifier and name types

use std::fmt::{Debug, Display, Formatter};

/// A network interface id.
///
/// Ids are assigned by the interface registry in registration order and are
/// stable for the life of the process.
/// They don't mean anything "between" machines or even restarts.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterfaceId(u32);

impl Debug for InterfaceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <_ as Debug>::fmt(&self.0, f)
    }
}

impl Display for InterfaceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <_ as Display>::fmt(&self.0, f)
    }
}

impl InterfaceId {
    /// Treat the provided `u32` as an [`InterfaceId`].
    #[must_use]
    pub fn new(raw: u32) -> InterfaceId {
        InterfaceId(raw)
    }

    /// Treat this [`InterfaceId`] as a `u32`.
    #[must_use]
    pub fn to_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for InterfaceId {
    fn from(value: u32) -> InterfaceId {
        InterfaceId::new(value)
    }
}

impl From<InterfaceId> for u32 {
    fn from(value: InterfaceId) -> Self {
        value.to_u32()
    }
}

const MAX_INTERFACE_NAME_LEN: usize = 16;

/// A string which has been checked to be a legal network interface name.
///
/// Legal interface names are composed only of alphanumeric ASCII characters,
/// `.`, `-`, and `_`.
/// The maximum legal length is 15 bytes (not characters).
#[repr(transparent)]
#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct InterfaceName(String);

/// Errors which may occur when validating an [`InterfaceName`].
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum IllegalInterfaceName {
    /// Interface names may not be empty.
    #[error("interface names may not be empty")]
    Empty,
    /// Interface names are limited to 15 bytes.
    #[error("interface name {0} is longer than {max} bytes", max = MAX_INTERFACE_NAME_LEN - 1)]
    TooLong(String),
    /// Interface names are limited to alphanumeric ASCII, `.`, `-`, and `_`.
    #[error("interface name {0} contains illegal characters")]
    IllegalCharacters(String),
}

impl InterfaceName {
    /// Validate `name` as an [`InterfaceName`].
    ///
    /// # Errors
    ///
    /// Returns an [`IllegalInterfaceName`] error if `name` is empty, too
    /// long, or contains characters outside the legal set.
    pub fn new(name: impl Into<String>) -> Result<InterfaceName, IllegalInterfaceName> {
        let name = name.into();
        if name.is_empty() {
            return Err(IllegalInterfaceName::Empty);
        }
        if name.len() >= MAX_INTERFACE_NAME_LEN {
            return Err(IllegalInterfaceName::TooLong(name));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        {
            return Err(IllegalInterfaceName::IllegalCharacters(name));
        }
        Ok(InterfaceName(name))
    }

    /// View this [`InterfaceName`] as a `&str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for InterfaceName {
    type Error = IllegalInterfaceName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        InterfaceName::new(value)
    }
}

impl TryFrom<&str> for InterfaceName {
    type Error = IllegalInterfaceName;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        InterfaceName::new(value)
    }
}

impl Display for InterfaceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <_ as Display>::fmt(&self.0, f)
    }
}

impl AsRef<str> for InterfaceName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn legal_names() {
        for name in ["lo", "eth0", "enp0s3", "net_0", "a.b-c"] {
            InterfaceName::new(name).unwrap();
        }
    }

    #[test]
    fn illegal_names() {
        assert_eq!(InterfaceName::new(""), Err(IllegalInterfaceName::Empty));
        assert!(matches!(
            InterfaceName::new("way-too-long-interface-name"),
            Err(IllegalInterfaceName::TooLong(_))
        ));
        assert!(matches!(
            InterfaceName::new("eth 0"),
            Err(IllegalInterfaceName::IllegalCharacters(_))
        ));
    }
}
