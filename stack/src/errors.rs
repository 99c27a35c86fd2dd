// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Socket API error taxonomy

use crate::codec::CodecError;

/// Errors returned by the socket API.
///
/// The taxonomy is flat and stable; codec and transport failures are relayed
/// verbatim through [`SocketError::Codec`].
/// Every user-facing precondition is checked before any side effect, so an
/// error never leaves partial state behind (the one recorded exception:
/// a codec failure during finalize keeps the pending packet for retry).
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// Only the `Inet` domain is supported.
    #[error("invalid socket domain")]
    InvalidDomain,
    /// The socket type is not valid here.
    #[error("invalid socket type")]
    InvalidType,
    /// The protocol is not valid here.
    #[error("invalid socket protocol")]
    InvalidProtocol,
    /// The socket type does not speak the requested protocol.
    #[error("socket type and protocol do not match")]
    InvalidTypeProtocol,
    /// No socket is registered under this descriptor.
    #[error("invalid socket descriptor")]
    InvalidFd,
    /// No prepared packet is registered under this descriptor.
    #[error("invalid packet descriptor")]
    InvalidPacketFd,
    /// No interface can carry the packet.
    #[error("no usable network interface")]
    NoInterface,
    /// The stream socket is not connected.
    #[error("socket is not connected")]
    NotConnected,
    /// The socket is not listening.
    #[error("socket is not listening")]
    NotListen,
    /// The wait deadline passed without a packet.
    #[error("timed out waiting for a packet")]
    Timeout,
    /// The packet descriptor does not match the socket's protocol.
    #[error("packet descriptor does not match the socket")]
    InvalidPacketDescriptor,
    /// The operation is recognized but not implemented.
    #[error("operation not implemented")]
    Unimplemented,
    /// A codec or transport failure, relayed verbatim.
    #[error(transparent)]
    Codec(#[from] CodecError),
}
