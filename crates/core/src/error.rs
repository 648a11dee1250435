//! Failure values surfaced by every remote catalog call.

use std::fmt;

use serde_json::Value;

/// Broad classification of an [`ApiFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No HTTP response was obtained (DNS, connect, TLS, reset, body read).
    Transport,
    /// The service answered `404`.
    NotFound,
    /// Any other `4xx` answer.
    ClientRejected,
    /// A `5xx` answer.
    ServerError,
    /// A non-success status outside the `4xx`/`5xx` ranges.
    UnexpectedStatus,
    /// A success response whose body did not have the expected shape.
    Decode,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Transport => "transport",
            FailureKind::NotFound => "not found",
            FailureKind::ClientRejected => "rejected",
            FailureKind::ServerError => "server error",
            FailureKind::UnexpectedStatus => "unexpected status",
            FailureKind::Decode => "decode",
        };
        f.write_str(label)
    }
}

/// A failed round trip to the catalog service.
///
/// `status == 0` means no HTTP response was obtained, or the response could
/// not be decoded. Any other value is the status code the service returned.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ApiFailure {
    /// Classification derived from `status` (or [`FailureKind::Decode`]).
    pub kind: FailureKind,
    /// HTTP status code, `0` when none is available.
    pub status: u16,
    /// Human readable description, suitable for display.
    pub message: String,
    /// Structured details forwarded from the service error body.
    pub details: Option<Value>,
}

/// Build a failure from a status code, classifying it on the way.
pub fn make_failure(status: u16, message: impl Into<String>, details: Option<Value>) -> ApiFailure {
    let kind = match status {
        0 => FailureKind::Transport,
        404 => FailureKind::NotFound,
        400..=499 => FailureKind::ClientRejected,
        500..=599 => FailureKind::ServerError,
        _ => FailureKind::UnexpectedStatus,
    };
    ApiFailure {
        kind,
        status,
        message: message.into(),
        details,
    }
}

impl ApiFailure {
    /// Failure for a round trip that never produced a response.
    pub fn transport(message: impl Into<String>) -> Self {
        make_failure(0, message, None)
    }

    /// Failure for a success body that did not match the expected shape.
    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Decode,
            status: 0,
            message: message.into(),
            details: None,
        }
    }

    /// `true` when the service reported the target as missing.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// `true` when no response was obtained at all.
    pub fn is_transport(&self) -> bool {
        self.kind == FailureKind::Transport
    }
}
