//! Error taxonomy for the connection core.
//!
//! Transport plumbing (`ws`, `transport`) reports failures as
//! `anyhow::Error` with context; everything crossing the public
//! [`Connection`](crate::Connection) API is one of the typed variants below.

// Rust guideline compliant 2026-02

use crate::protocol::{MessageId, SignalId};

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by [`Connection`](crate::Connection) operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The device and client have desynchronized.
    #[error("protocol violation: {0}")]
    ProtocolViolation(#[from] ProtocolViolation),

    /// The connection terminated before the operation could complete.
    #[error("connection closed")]
    ConnectionClosed,

    /// The device refused a subscribe request or returned a malformed
    /// signal identifier.
    #[error("subscribe to {path} failed: {reason}")]
    Subscription {
        /// Signal path the caller tried to subscribe to.
        path: String,
        /// What the device answered.
        reason: String,
    },

    /// The device refused to tear down a signal subscription.
    ///
    /// The path stays mapped to `signal_id` locally; the device-side
    /// subscription is presumed alive.
    #[error("unsubscribe from {path} (signal {signal_id}) failed: {reason}")]
    Unsubscribe {
        /// Signal path being released.
        path: String,
        /// Device-assigned signal identifier that is still registered.
        signal_id: SignalId,
        /// What the device answered.
        reason: String,
    },

    /// Sending a frame or establishing the transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A request could not be serialized.
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

impl Error {
    /// Wrap a transport-layer `anyhow` error, keeping its context chain.
    pub(crate) fn transport(err: &anyhow::Error) -> Self {
        Self::Transport(format!("{err:#}"))
    }
}

/// An inbound frame the dispatch loop could not classify or correlate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    /// The frame is not valid JSON.
    #[error("frame is not valid JSON: {0}")]
    MalformedJson(String),

    /// The frame decoded to something other than a JSON object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// The `id` field is not a non-negative integer.
    #[error("invalid message id: {0}")]
    InvalidMessageId(String),

    /// A response arrived for an identifier with no pending request.
    #[error("response for unknown message id {0}")]
    UnknownMessageId(MessageId),

    /// The `signal` field is neither a non-empty string nor a number.
    #[error("invalid signal id: {0}")]
    InvalidSignalId(String),

    /// A signal event carried a body that is not an array.
    #[error("signal {0} body is not an array")]
    InvalidSignalBody(SignalId),

    /// The frame has neither the response nor the signal-event shape.
    #[error("frame matches neither a response nor a signal event")]
    Unrecognized,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_violation_converts_into_error() {
        let err: Error = ProtocolViolation::UnknownMessageId(9).into();
        assert!(matches!(
            err,
            Error::ProtocolViolation(ProtocolViolation::UnknownMessageId(9))
        ));
        assert_eq!(
            err.to_string(),
            "protocol violation: response for unknown message id 9"
        );
    }

    #[test]
    fn test_unsubscribe_error_names_path_and_signal() {
        let err = Error::Unsubscribe {
            path: "/recorder:started".into(),
            signal_id: SignalId::from("sig-7"),
            reason: "device answered false".into(),
        };
        let text = err.to_string();
        assert!(text.contains("/recorder:started"));
        assert!(text.contains("sig-7"));
    }

    #[test]
    fn test_transport_keeps_context_chain() {
        let inner = anyhow::anyhow!("broken pipe").context("WebSocket send failed");
        let err = Error::transport(&inner);
        assert_eq!(
            err.to_string(),
            "transport error: WebSocket send failed: broken pipe"
        );
    }
}
