//! Error taxonomy for the streaming client.
//!
//! Every failure mode a caller can observe is a distinct variant, so
//! errors can be matched on directly instead of being string-compared.
//! Server `error` frames are mapped to variants by their numeric code.

use crate::stream::messages::ErrorMessage;

/// Errors surfaced by the streaming clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The server never sent the initial welcome message.
    #[error("no connected message received from server")]
    NoConnected,

    /// Authentication was rejected by the server.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The server sent an unexpected payload in response to auth.
    #[error("unexpected response to authentication request")]
    BadAuthResponse,

    /// `connect` was invoked more than once on the same client.
    #[error("connect called multiple times")]
    ConnectCalledMultipleTimes,

    /// A subscription change was attempted before `connect`.
    #[error("subscription change attempted before connect")]
    SubscriptionChangeBeforeConnect,

    /// A subscription change was attempted after the client terminated.
    #[error("subscription change attempted after the client terminated")]
    SubscriptionChangeAfterTerminated,

    /// Another subscription change is still awaiting its acknowledgement.
    #[error("subscription change already in progress")]
    SubscriptionChangeAlreadyInProgress,

    /// The connection was lost or the client shut down while a
    /// subscription change was awaiting its acknowledgement.
    #[error("subscription change interrupted")]
    SubscriptionChangeInterrupted,

    /// Server error 405: the account's symbol limit was exceeded.
    #[error("symbol limit exceeded")]
    SymbolLimitExceeded,

    /// Server error 406: too many concurrent connections.
    #[error("connection limit exceeded")]
    ConnectionLimitExceeded,

    /// Server error 407: the client is consuming data too slowly.
    #[error("slow client")]
    SlowClient,

    /// Server error 408: the subscription plan does not cover the request.
    #[error("insufficient subscription")]
    InsufficientSubscription,

    /// Any other server-reported error.
    #[error("server error {code}: {message}")]
    Server {
        /// Numeric error code from the server.
        code: i32,
        /// Human-readable message from the server.
        message: String,
    },

    /// Transport-level failure (dial, read, write or ping).
    #[error("connection error: {0}")]
    Connection(String),

    /// A frame could not be decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The configured stream endpoint is not a valid URL.
    #[error("invalid stream URL: {0}")]
    InvalidUrl(String),

    /// The caller cancelled the client.
    #[error("client cancelled")]
    Cancelled,

    /// The reconnect limit was reached; wraps the last connection error.
    #[error("giving up after {attempts} connection attempts: {source}")]
    RetriesExhausted {
        /// Number of consecutive failed attempts.
        attempts: u64,
        /// The error that ended the final attempt.
        #[source]
        source: Box<StreamError>,
    },
}

impl StreamError {
    /// Whether this error must terminate the client instead of
    /// triggering a reconnect attempt.
    #[must_use]
    pub fn is_irrecoverable(&self) -> bool {
        matches!(
            self,
            Self::NoConnected
                | Self::InvalidCredentials
                | Self::BadAuthResponse
                | Self::ConnectionLimitExceeded
        )
    }
}

impl From<&ErrorMessage> for StreamError {
    fn from(err: &ErrorMessage) -> Self {
        match err.code {
            401 | 402 | 404 => Self::InvalidCredentials,
            405 => Self::SymbolLimitExceeded,
            406 => Self::ConnectionLimitExceeded,
            407 => Self::SlowClient,
            408 => Self::InsufficientSubscription,
            code => Self::Server {
                code,
                message: err.msg.clone(),
            },
        }
    }
}
