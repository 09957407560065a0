//! The pluggable transport boundary.
//!
//! Grounded in `transport/mod.rs`'s `ITransport`-style trait (there named
//! for the legacy Hotline wire protocol; here generalized to an arbitrary
//! wire). Implementations plug in an in-memory broker, a network socket,
//! or a test double.

use async_trait::async_trait;

use crate::error::Result;
use crate::message_info::MessageInfo;
use crate::transaction::Transaction;

/// A pluggable delivery mechanism.
///
/// `start`/`stop` bracket the transport's lifecycle (opening sockets,
/// spawning listener tasks, etc.); `handle` is the terminal step of both
/// pipelines, responsible for actually delivering the transaction's
/// outgoing batch (see [`crate::pipeline::run`]).
#[async_trait]
pub trait ITransport: Send + Sync {
    /// Starts the transport. Called once by [`crate::bus::Bus::start`].
    ///
    /// # Errors
    /// Returns an error if the transport cannot begin accepting or sending
    /// traffic (e.g. a socket failed to bind).
    async fn start(&self) -> Result<()>;

    /// Stops the transport, releasing any resources acquired by `start`.
    ///
    /// # Errors
    /// Returns an error if shutdown could not complete cleanly.
    async fn stop(&self) -> Result<()>;

    /// Delivers `transaction`'s outgoing batch. Called as the terminal step
    /// of both the incoming and outgoing pipelines.
    ///
    /// # Errors
    /// Returns an error if delivery fails; the bus aborts the transaction
    /// in response.
    async fn handle(&self, transaction: &mut Transaction) -> Result<()>;

    /// Registers interest in `message_info`'s event stream. A no-op default
    /// for transports that route purely by explicit endpoint.
    ///
    /// # Errors
    /// Returns an error if the transport cannot accept new subscriptions
    /// (e.g. it has not been started).
    async fn subscribe(&self, message_info: &MessageInfo) -> Result<()> {
        let _ = message_info;
        Ok(())
    }

    /// The endpoint name the retry middleware should route exhausted
    /// messages to, if this transport designates one.
    fn dead_letter_endpoint(&self) -> Option<&str>;

    /// Whether [`ITransport::subscribe`] and event broadcast are meaningful
    /// on this transport.
    fn supports_subscriptions(&self) -> bool {
        false
    }

    /// Whether this transport can route a message to a single named
    /// endpoint by [`crate::message_info::MessageKind::Command`] semantics.
    fn supports_command_messages(&self) -> bool {
        false
    }

    /// Whether a message's `deliver_at` is honored, or delivered
    /// immediately regardless. [`crate::handlers::retry::RetryHandler`]
    /// falls straight to dead-lettering when this is `false`, since a
    /// delayed re-queue would otherwise be delivered immediately and retry
    /// with no backoff at all.
    fn supports_delayed_commands(&self) -> bool {
        false
    }
}
