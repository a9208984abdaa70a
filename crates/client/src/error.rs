//! Error taxonomy for the client engine.

use std::path::PathBuf;
use thiserror::Error;
use waylite_protocol::{AddressError, WireError};

use crate::registry::ObjectId;

/// Errors raised by the transport, registry, buffer pool and event loop.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A required environment variable is missing.
    #[error("configuration missing: {0} is not set")]
    ConfigMissing(&'static str),

    /// The resolved socket path does not fit a local socket address.
    #[error("socket path {path:?} exceeds {max} bytes")]
    AddressTooLong { path: PathBuf, max: usize },

    /// The OS refused the connection.
    #[error("failed to connect to {path:?}: {source}")]
    ConnectFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The peer closed the connection or an I/O error occurred mid-session.
    #[error("disconnected: {0}")]
    Disconnected(#[source] std::io::Error),

    /// A send transmitted fewer bytes than requested.
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    /// The stream violated the framing invariant; it cannot be resynchronised.
    #[error("malformed message for object {object_id} opcode {opcode}: declared size {size}")]
    MalformedMessage {
        object_id: u32,
        opcode: u16,
        size: u16,
    },

    /// Any other wire codec failure (truncated arguments, oversize encodes).
    #[error("wire error: {0}")]
    Wire(WireError),

    /// An event arrived for an object or opcode this client cannot interpret.
    #[error("unknown object {object_id} or opcode {opcode}")]
    UnknownObjectOrOpcode { object_id: u32, opcode: u16 },

    /// A request targeted an id the peer has already deleted.
    #[error("object {0} used after retirement")]
    UseAfterRetire(ObjectId),

    /// A buffer view would extend past the end of its pool.
    #[error("buffer at offset {offset} with {len} bytes exceeds pool size {pool_size}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        pool_size: usize,
    },

    /// Creating or mapping shared memory failed.
    #[error("failed to allocate {size} bytes of shared memory: {source}")]
    AllocationFailed {
        size: usize,
        #[source]
        source: std::io::Error,
    },

    /// An operation was attempted from a state that does not allow it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Required globals were not announced before the peer stopped announcing.
    #[error("missing required globals: {}", .0.join(", "))]
    MissingGlobal(Vec<&'static str>),

    /// The peer reported a fatal protocol error.
    #[error("protocol error on object {object_id} (code {code}): {message}")]
    Protocol {
        object_id: u32,
        code: u32,
        message: String,
    },
}

impl ClientError {
    /// Whether the error ends the session.
    ///
    /// Transport and framing errors are fatal since object id consistency
    /// cannot be guaranteed after a desync. Buffer and registry errors are
    /// local to the operation that raised them. A use-after-retire is a logic
    /// error: fatal in debug builds, dropped with a warning in release.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::UnknownObjectOrOpcode { .. }
            | Self::OutOfBounds { .. }
            | Self::AllocationFailed { .. }
            | Self::InvalidState(_) => false,
            Self::UseAfterRetire(_) => cfg!(debug_assertions),
            _ => true,
        }
    }

    /// Wrap an I/O error as a mid-session disconnect.
    pub(crate) fn disconnected(err: std::io::Error) -> Self {
        Self::Disconnected(err)
    }

    pub(crate) fn peer_closed() -> Self {
        Self::Disconnected(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "peer closed the connection",
        ))
    }
}

impl From<WireError> for ClientError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Malformed {
                object_id,
                opcode,
                size,
            } => Self::MalformedMessage {
                object_id,
                opcode,
                size,
            },
            other => Self::Wire(other),
        }
    }
}

impl From<AddressError> for ClientError {
    fn from(err: AddressError) -> Self {
        match err {
            AddressError::ConfigMissing(var) => Self::ConfigMissing(var),
            AddressError::AddressTooLong { path, max, .. } => Self::AddressTooLong { path, max },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality_policy() {
        assert!(ClientError::peer_closed().is_fatal());
        assert!(
            ClientError::ShortWrite {
                written: 3,
                expected: 8
            }
            .is_fatal()
        );
        assert!(ClientError::MissingGlobal(vec!["wl_shm"]).is_fatal());
        assert!(
            !ClientError::OutOfBounds {
                offset: 0,
                len: 64,
                pool_size: 32
            }
            .is_fatal()
        );
        assert!(
            !ClientError::UnknownObjectOrOpcode {
                object_id: 9,
                opcode: 3
            }
            .is_fatal()
        );
        assert_eq!(
            ClientError::UseAfterRetire(5).is_fatal(),
            cfg!(debug_assertions)
        );
    }

    #[test]
    fn test_wire_malformed_maps_to_malformed_message() {
        let err: ClientError = WireError::Malformed {
            object_id: 2,
            opcode: 0,
            size: 6,
        }
        .into();
        assert!(matches!(err, ClientError::MalformedMessage { size: 6, .. }));

        let err: ClientError = WireError::Truncated {
            needed: 4,
            remaining: 0,
        }
        .into();
        assert!(matches!(err, ClientError::Wire(_)));
    }

    #[test]
    fn test_address_error_mapping() {
        let err: ClientError = AddressError::ConfigMissing("XDG_RUNTIME_DIR").into();
        assert!(matches!(err, ClientError::ConfigMissing("XDG_RUNTIME_DIR")));
    }

    #[test]
    fn test_missing_global_message() {
        let err = ClientError::MissingGlobal(vec!["wl_shm", "xdg_wm_base"]);
        assert_eq!(err.to_string(), "missing required globals: wl_shm, xdg_wm_base");
    }
}
