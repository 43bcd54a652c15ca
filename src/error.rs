//! Error types for the Neuralyzer light core.

use thiserror::Error;

use crate::core::bluetooth::{ConnectionState, Endpoint, PeripheralAddress};

/// A capability gated by the host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Scan,
    Connect,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scan => f.write_str("scan"),
            Self::Connect => f.write_str("connect"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LightError {
    /// The caller lacks the platform authorization for this operation
    #[error("Missing {0} permission")]
    PermissionDenied(Capability),

    /// The transport could not resolve the address to a connectable peripheral
    #[error("Bluetooth device {0} not found, please scan first")]
    DeviceNotFound(PeripheralAddress),

    /// Scan or link level failure reported by the transport
    #[error("Transport failure (code {0})")]
    TransportFailure(i32),

    /// A payload did not have the length the endpoint requires
    #[error("Unexpected payload for {endpoint}: expected {expected} bytes, got {actual}")]
    DecodePayload {
        endpoint: Endpoint,
        expected: usize,
        actual: usize,
    },

    /// A payload had the right length but an out-of-domain value
    #[error("Invalid value {value:#04x} for {endpoint}")]
    InvalidValue { endpoint: Endpoint, value: u8 },

    /// Another transport operation is still in flight
    #[error("Another operation is already in flight")]
    OperationRejectedBusy,

    /// Reads and writes are only accepted once the session is ready
    #[error("Session is {0}, not ready")]
    NotReady(ConnectionState),

    /// The session loop is no longer running
    #[error("Session loop has shut down")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, LightError>;
