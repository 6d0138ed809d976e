use thiserror::Error;

/// Error kinds surfaced by client operations.
///
/// Transport failures are kept distinct from application-level statuses:
/// only a `Transport` error on the primary node triggers twin fallback,
/// while `KeyNotFound` and `PreconditionFailed` are definitive answers
/// from a reachable replica. `Serialization` errors concern the caller's
/// payload and are never retried (they would fail identically everywhere).
#[derive(Debug, Error)]
pub enum ClientError {
    /// No routable session exists for the computed partition.
    #[error("node not found")]
    NodeNotFound,

    /// Every reachable replica answered 404 for the key.
    #[error("key not found")]
    KeyNotFound,

    /// Conditional update refused: the stored value did not match the
    /// expected old value (server status 403).
    #[error("stored value is not equal to the expected value")]
    PreconditionFailed,

    /// The node answered with a status code outside the protocol contract.
    #[error("invalid response from node (status {status})")]
    InvalidResponse { status: u16 },

    /// Network-level failure: connection error, timeout, interrupted body.
    #[error("transport failure")]
    Transport(#[source] reqwest::Error),

    /// Payload encoding or decoding failed.
    #[error("payload serialization failed")]
    Serialization(#[from] serde_json::Error),
}
