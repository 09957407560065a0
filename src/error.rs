//! The library's single error type and its stable wire-visible error codes.

use thiserror::Error;

/// Errors produced by PolyBus's core subsystems.
///
/// Every variant carries a stable integer [`code`](PolyBusError::code) so
/// that wire consumers can match on a number rather than parse `Display`
/// text. Existing codes never change; new kinds append new codes.
#[derive(Debug, Error)]
pub enum PolyBusError {
    /// The transport has not been started. Call [`crate::bus::Bus::start`]
    /// before sending, receiving, or subscribing.
    #[error("PolyBus has not been started; call start() before using the bus")]
    NotStarted,

    /// A registry lookup (by type or by [`crate::message_info::MessageInfo`])
    /// found no match.
    #[error("the requested type, message info, or header was not registered")]
    MessageNotFound,

    /// A body codec failed to encode or decode a message.
    #[error("failed to serialize or deserialize a message body")]
    Serialization(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Middleware raised an error while processing a transaction.
    #[error("a pipeline handler failed")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Any other failure surfaced by an integration (transport, transaction
    /// factory, etc.) that does not fit the kinds above.
    #[error("PolyBus operation failed")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl PolyBusError {
    /// The stable wire-visible error code for this error kind.
    ///
    /// `1` and `2` are fixed per the external interface contract; later
    /// kinds append new codes and never reuse or renumber earlier ones.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::NotStarted => 1,
            Self::MessageNotFound => 2,
            Self::Serialization(_) => 3,
            Self::Handler(_) => 4,
            Self::Other(_) => 5,
        }
    }

    /// Wraps an arbitrary handler error, boxing it for storage.
    pub fn handler<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Handler(Box::new(err))
    }

    /// Wraps an arbitrary serialization error, boxing it for storage.
    pub fn serialization<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Serialization(Box::new(err))
    }
}

/// Convenience alias for `Result<T, PolyBusError>`.
pub type Result<T> = std::result::Result<T, PolyBusError>;
