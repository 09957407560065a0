//! Transactions: scoped units of work carrying an outgoing batch.
//!
//! Grounded in `transaction.py`, `incoming_transaction_factory.py`, and
//! `outgoing_transaction_factory.py`. `Transaction` is a sum type so the
//! bus can dispatch on its tag rather than on ad hoc field presence.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::Bus;
use crate::error::{PolyBusError, Result};
use crate::message::{IncomingMessage, OutgoingMessage};

/// Overridable lifecycle hook for integrating a transaction with an
/// external transaction system (e.g. a database transaction that should be
/// rolled back on `abort`).
///
/// The default is a no-op. The bus invokes `abort` exactly once per failed
/// `send`, but a hook should not assume external callers never invoke it
/// directly more than once, so implementations should be idempotent.
#[async_trait]
pub trait TransactionHooks: Send + Sync {
    /// Called when a pipeline invocation for this transaction fails.
    async fn abort(&self) {}
}

/// The default no-op hook set.
pub struct NoopHooks;

#[async_trait]
impl TransactionHooks for NoopHooks {
    async fn abort(&self) {}
}

/// State shared by both transaction variants: the owning bus, free-form
/// user state, and the pending outgoing batch.
pub struct TransactionState {
    bus: Arc<Bus>,
    state: HashMap<String, Box<dyn Any + Send + Sync>>,
    outgoing_messages: Vec<OutgoingMessage>,
    hooks: Arc<dyn TransactionHooks>,
}

impl TransactionState {
    fn new(bus: Arc<Bus>, hooks: Arc<dyn TransactionHooks>) -> Self {
        Self {
            bus,
            state: HashMap::new(),
            outgoing_messages: Vec::new(),
            hooks,
        }
    }

    /// The bus this transaction belongs to.
    #[must_use]
    pub fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }

    /// Free-form per-transaction state, keyed by name.
    #[must_use]
    pub fn state(&self) -> &HashMap<String, Box<dyn Any + Send + Sync>> {
        &self.state
    }

    /// Mutable access to the free-form per-transaction state.
    pub fn state_mut(&mut self) -> &mut HashMap<String, Box<dyn Any + Send + Sync>> {
        &mut self.state
    }

    /// The pending outgoing batch, in insertion order.
    #[must_use]
    pub fn outgoing_messages(&self) -> &[OutgoingMessage] {
        &self.outgoing_messages
    }

    /// Mutable access to the pending outgoing batch.
    ///
    /// Pipeline handlers that retry processing must clear this before each
    /// attempt (see [`crate::handlers::retry::RetryHandler`]) so that a
    /// failed attempt's partial output is never shipped alongside the
    /// retry or dead-letter message it produces.
    pub fn outgoing_messages_mut(&mut self) -> &mut Vec<OutgoingMessage> {
        &mut self.outgoing_messages
    }

    /// Appends an outgoing message wrapping `payload`, resolving its
    /// [`crate::message_info::MessageInfo`] from the registry unless
    /// `message_info` is supplied.
    ///
    /// # Errors
    /// Returns [`PolyBusError::MessageNotFound`] if the payload's type is
    /// unregistered and no explicit `message_info` was given.
    pub fn add<T: Any + Send + Sync + 'static>(
        &mut self,
        payload: T,
        endpoint: Option<String>,
    ) -> Result<&OutgoingMessage> {
        let message = OutgoingMessage::new(Arc::clone(&self.bus), payload, endpoint, None)?;
        self.outgoing_messages.push(message);
        self.outgoing_messages.last().ok_or(PolyBusError::MessageNotFound)
    }
}

/// A transaction triggered by an incoming message.
pub struct IncomingTransaction {
    /// Shared transaction state.
    pub base: TransactionState,
    /// The message that triggered this transaction.
    pub incoming_message: IncomingMessage,
}

impl IncomingTransaction {
    /// Creates a new incoming transaction with the default no-op hooks.
    #[must_use]
    pub fn new(bus: Arc<Bus>, incoming_message: IncomingMessage) -> Self {
        Self::with_hooks(bus, incoming_message, Arc::new(NoopHooks))
    }

    /// Creates a new incoming transaction with custom lifecycle hooks, for
    /// integrating with an external transaction system.
    #[must_use]
    pub fn with_hooks(
        bus: Arc<Bus>,
        incoming_message: IncomingMessage,
        hooks: Arc<dyn TransactionHooks>,
    ) -> Self {
        Self {
            base: TransactionState::new(bus, hooks),
            incoming_message,
        }
    }
}

/// A transaction created directly by application code to send messages.
pub struct OutgoingTransaction {
    /// Shared transaction state.
    pub base: TransactionState,
}

impl OutgoingTransaction {
    /// Creates a new outgoing transaction with the default no-op hooks.
    #[must_use]
    pub fn new(bus: Arc<Bus>) -> Self {
        Self::with_hooks(bus, Arc::new(NoopHooks))
    }

    /// Creates a new outgoing transaction with custom lifecycle hooks.
    #[must_use]
    pub fn with_hooks(bus: Arc<Bus>, hooks: Arc<dyn TransactionHooks>) -> Self {
        Self {
            base: TransactionState::new(bus, hooks),
        }
    }
}

/// The sum type dispatched on by [`crate::bus::Bus::send`] to select the
/// incoming or outgoing pipeline.
pub enum Transaction {
    /// Triggered by a received message.
    Incoming(IncomingTransaction),
    /// Created directly by application code.
    Outgoing(OutgoingTransaction),
}

impl Transaction {
    /// Shared state common to both variants.
    #[must_use]
    pub fn base(&self) -> &TransactionState {
        match self {
            Self::Incoming(tx) => &tx.base,
            Self::Outgoing(tx) => &tx.base,
        }
    }

    /// Mutable shared state common to both variants.
    pub fn base_mut(&mut self) -> &mut TransactionState {
        match self {
            Self::Incoming(tx) => &mut tx.base,
            Self::Outgoing(tx) => &mut tx.base,
        }
    }

    /// Borrows this transaction as an [`IncomingTransaction`].
    ///
    /// # Errors
    /// Returns [`PolyBusError::Other`] if this is actually an
    /// [`OutgoingTransaction`] — a programming error, since the bus only
    /// ever runs the incoming pipeline over incoming transactions.
    pub fn as_incoming_mut(&mut self) -> Result<&mut IncomingTransaction> {
        match self {
            Self::Incoming(tx) => Ok(tx),
            Self::Outgoing(_) => Err(wrong_variant("incoming")),
        }
    }

    /// Borrows this transaction as an [`OutgoingTransaction`].
    ///
    /// # Errors
    /// Returns [`PolyBusError::Other`] if this is actually an
    /// [`IncomingTransaction`].
    pub fn as_outgoing_mut(&mut self) -> Result<&mut OutgoingTransaction> {
        match self {
            Self::Outgoing(tx) => Ok(tx),
            Self::Incoming(_) => Err(wrong_variant("outgoing")),
        }
    }

    /// Invokes the transaction's abort hook. Called by [`crate::bus::Bus::send`]
    /// exactly once when a pipeline invocation fails; must be idempotent if
    /// called again by an integration.
    pub async fn abort(&self) {
        match self {
            Self::Incoming(tx) => tx.base.hooks.abort().await,
            Self::Outgoing(tx) => tx.base.hooks.abort().await,
        }
    }

    /// Hands this transaction to its bus for pipeline processing.
    ///
    /// # Errors
    /// Propagates any pipeline failure after invoking [`Transaction::abort`].
    pub async fn commit(&mut self) -> Result<()> {
        let bus = Arc::clone(self.base().bus());
        bus.send(self).await
    }
}

fn wrong_variant(expected: &str) -> PolyBusError {
    PolyBusError::Other(Box::new(std::io::Error::other(format!(
        "expected a {expected} transaction"
    ))))
}
