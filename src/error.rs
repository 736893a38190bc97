//! Error types for channel operations

use std::sync::Arc;

/// A type-erased error returned by user callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Close information carried by a server-initiated `channel.close`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// AMQP reply code (e.g. 404).
    pub code: u16,
    /// Human readable reply text.
    pub text: String,
    /// Class id of the method that caused the close, 0 if none.
    pub class_id: u16,
    /// Method id of the method that caused the close, 0 if none.
    pub method_id: u16,
}

impl CloseReason {
    pub(crate) fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
            class_id: 0,
            method_id: 0,
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.text, self.code)
    }
}

/// Error with channel operations.
///
/// The error is clonable so that a single failure can fan out to every
/// completion that is still pending on the channel.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The channel is not open, or it was closed while the operation was
    /// outstanding. Carries the server's reply code and text when the broker
    /// initiated the close.
    #[error("channel closed{}", .0.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    ChannelClosed(Option<CloseReason>),

    /// A close was attempted while the channel was already closing or closed.
    #[error("channel already closed or closing")]
    AlreadyClosing,

    /// RPC correlation bookkeeping was violated: a completion key was
    /// registered twice, or a response arrived with no waiter.
    #[error("synchronization error: {0}")]
    Synchronization(String),

    /// `basic.get-empty` response to a `basic_get`.
    #[error("queue is empty")]
    EmptyQueue,

    /// The broker negatively acknowledged a confirmed publish.
    #[error("publish with delivery tag {0} was nacked by the broker")]
    PublishFailed(u64),

    /// An inbound method has no entry in the dispatch table.
    #[error("method ({0}, {1}) is not implemented")]
    NotImplemented(u16, u16),

    /// The operation is not valid in the current channel state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// A content frame arrived out of assembly order.
    #[error("unexpected frame, expected {0}")]
    UnexpectedFrame(&'static str),

    /// A consumer or return callback reported failure.
    #[error("callback failed: {0}")]
    Callback(Arc<BoxError>),

    /// The connection underneath the channel is gone.
    #[error("connection closed")]
    ConnectionClosed,

    /// Transport-level I/O failure reported by the connection.
    #[error("io error: {0}")]
    Io(Arc<std::io::Error>),
}

impl Error {
    /// The channel-closed kind without server close information.
    pub(crate) fn closed() -> Self {
        Error::ChannelClosed(None)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<BoxError> for Error {
    fn from(err: BoxError) -> Self {
        Error::Callback(Arc::new(err))
    }
}
