//! The central [`Bus`]: owns the message registry, both pipelines, and the
//! attached transport.
//!
//! Grounded in `server/mod.rs`'s central dispatch struct, generalized from
//! a single Hotline server loop to an arbitrary transport plus two
//! directional pipelines. The transport is attached
//! after construction via a [`OnceLock`] (set exactly once, by the
//! builder) rather than threaded through the constructor, so that a
//! transport factory can receive a [`std::sync::Weak`] back-reference to
//! the bus it is being attached to without ever forming an owning cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::error::{PolyBusError, Result};
use crate::message::IncomingMessage;
use crate::message_info::MessageInfo;
use crate::pipeline::{self, Handler};
use crate::registry::MessageRegistry;
use crate::transaction::{IncomingTransaction, OutgoingTransaction, Transaction};
use crate::transport::ITransport;

/// The embeddable message bus.
pub struct Bus {
    name: String,
    registry: MessageRegistry,
    incoming_pipeline: Vec<Arc<dyn Handler>>,
    outgoing_pipeline: Vec<Arc<dyn Handler>>,
    transport: OnceLock<Arc<dyn ITransport>>,
    started: AtomicBool,
}

impl Bus {
    /// Constructs a bus with its name, registry, and both pipelines fixed.
    /// The transport is attached afterwards with [`Bus::set_transport`].
    #[must_use]
    pub fn new(
        name: String,
        registry: MessageRegistry,
        incoming_pipeline: Vec<Arc<dyn Handler>>,
        outgoing_pipeline: Vec<Arc<dyn Handler>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            registry,
            incoming_pipeline,
            outgoing_pipeline,
            transport: OnceLock::new(),
            started: AtomicBool::new(false),
        })
    }

    /// This bus's configured name (see `BuilderConfig::name`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The message type registry.
    #[must_use]
    pub fn messages(&self) -> &MessageRegistry {
        &self.registry
    }

    /// Attaches the transport. Called exactly once, by the builder.
    ///
    /// # Errors
    /// Returns [`PolyBusError::NotStarted`] if a transport is already
    /// attached — constructing a second one is always a builder bug.
    pub fn set_transport(&self, transport: Arc<dyn ITransport>) -> Result<()> {
        self.transport
            .set(transport)
            .map_err(|_rejected| PolyBusError::NotStarted)
    }

    fn transport(&self) -> Result<Arc<dyn ITransport>> {
        self.transport.get().cloned().ok_or(PolyBusError::NotStarted)
    }

    /// The attached transport's dead-letter endpoint name, if any. Read
    /// fresh on every call by [`crate::handlers::retry::RetryHandler`]
    /// rather than cached, so there is a single source of truth.
    ///
    /// # Errors
    /// Returns [`PolyBusError::NotStarted`] if no transport is attached.
    pub fn dead_letter_endpoint(&self) -> Result<Option<String>> {
        Ok(self.transport()?.dead_letter_endpoint().map(str::to_owned))
    }

    /// Whether the attached transport honors a message's `deliver_at`
    /// rather than delivering it immediately. Consulted by
    /// [`crate::handlers::retry::RetryHandler`] before scheduling a delayed
    /// retry: on a transport without delayed-command support a re-queue
    /// would be delivered (and likely fail again) immediately, with no
    /// backoff at all, so the handler dead-letters instead.
    ///
    /// # Errors
    /// Returns [`PolyBusError::NotStarted`] if no transport is attached.
    pub fn supports_delayed_commands(&self) -> Result<bool> {
        Ok(self.transport()?.supports_delayed_commands())
    }

    /// Delivers `transaction`'s current outgoing batch straight to the
    /// transport, bypassing both pipelines.
    ///
    /// [`crate::handlers::retry::RetryHandler`] uses this to hand off a
    /// replacement outgoing batch (a delayed retry or a dead-letter
    /// message) after its own position in the chain — re-entering
    /// `send` would re-run the handlers between it and the transport.
    ///
    /// # Errors
    /// Returns [`PolyBusError::NotStarted`] if no transport is attached, or
    /// propagates the transport's failure.
    pub async fn deliver_directly(&self, transaction: &mut Transaction) -> Result<()> {
        self.transport()?.handle(transaction).await
    }

    /// Starts the transport and marks the bus ready to accept `send`.
    ///
    /// # Errors
    /// Propagates the transport's `start` failure, if any.
    pub async fn start(&self) -> Result<()> {
        self.transport()?.start().await?;
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stops the transport and marks the bus no longer ready to accept
    /// `send`.
    ///
    /// # Errors
    /// Propagates the transport's `stop` failure, if any.
    pub async fn stop(&self) -> Result<()> {
        self.started.store(false, Ordering::SeqCst);
        self.transport()?.stop().await
    }

    /// Builds an [`IncomingTransaction`] wrapping a message just received
    /// from the transport.
    ///
    /// # Errors
    /// Returns [`PolyBusError::MessageNotFound`] if `message_info` does not
    /// resolve to a registered type.
    pub fn create_incoming_transaction(
        self: &Arc<Self>,
        body: Vec<u8>,
        message_info: MessageInfo,
    ) -> Result<Transaction> {
        let incoming_message = IncomingMessage::new(Arc::clone(self), body, message_info)?;
        Ok(Transaction::Incoming(IncomingTransaction::new(
            Arc::clone(self),
            incoming_message,
        )))
    }

    /// Builds an empty [`OutgoingTransaction`] for application code to
    /// populate with [`crate::transaction::TransactionState::add`] and
    /// commit.
    #[must_use]
    pub fn create_outgoing_transaction(self: &Arc<Self>) -> Transaction {
        Transaction::Outgoing(OutgoingTransaction::new(Arc::clone(self)))
    }

    /// Runs `transaction` through the appropriate pipeline and the
    /// transport terminal, aborting the transaction on failure.
    ///
    /// # Errors
    /// Returns [`PolyBusError::NotStarted`] if the bus has not been
    /// started, or propagates whatever the pipeline or transport raised.
    pub async fn send(&self, transaction: &mut Transaction) -> Result<()> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(PolyBusError::NotStarted);
        }
        let transport = self.transport()?;
        let chain: &[Arc<dyn Handler>] = match transaction {
            Transaction::Incoming(_) => &self.incoming_pipeline,
            Transaction::Outgoing(_) => &self.outgoing_pipeline,
        };
        match pipeline::run(chain, &transport, transaction).await {
            Ok(()) => Ok(()),
            Err(err) => {
                transaction.abort().await;
                Err(err)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Arc<Self> {
        use async_trait::async_trait;

        struct NullTransport;

        #[async_trait]
        impl ITransport for NullTransport {
            async fn start(&self) -> Result<()> {
                Ok(())
            }
            async fn stop(&self) -> Result<()> {
                Ok(())
            }
            async fn handle(&self, _transaction: &mut Transaction) -> Result<()> {
                Ok(())
            }
            fn dead_letter_endpoint(&self) -> Option<&str> {
                None
            }
        }

        let bus = Self::new("test".to_owned(), MessageRegistry::new(), Vec::new(), Vec::new());
        bus.set_transport(Arc::new(NullTransport)).expect("attach test transport");
        bus.started.store(true, Ordering::SeqCst);
        bus
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::message_info::MessageKind;

    struct RecordingTransport;

    #[async_trait]
    impl ITransport for RecordingTransport {
        async fn start(&self) -> Result<()> {
            Ok(())
        }
        async fn stop(&self) -> Result<()> {
            Ok(())
        }
        async fn handle(&self, _transaction: &mut Transaction) -> Result<()> {
            Ok(())
        }
        fn dead_letter_endpoint(&self) -> Option<&str> {
            None
        }
    }

    struct Payload;

    #[tokio::test]
    async fn send_before_start_is_rejected() {
        let bus = Bus::new("polybus".to_owned(), MessageRegistry::new(), Vec::new(), Vec::new());
        bus.set_transport(Arc::new(RecordingTransport)).expect("attach");
        bus.registry
            .register::<Payload>(MessageInfo::new(MessageKind::Event, "svc", "payload", 1, 0, 0))
            .expect("register");

        let mut transaction = bus.create_outgoing_transaction();
        let err = bus.send(&mut transaction).await.unwrap_err();
        assert_eq!(err.code(), 1);
    }

    #[tokio::test]
    async fn send_after_start_succeeds_with_empty_pipelines() {
        let bus = Bus::new("polybus".to_owned(), MessageRegistry::new(), Vec::new(), Vec::new());
        bus.set_transport(Arc::new(RecordingTransport)).expect("attach");
        bus.start().await.expect("start");

        let mut transaction = bus.create_outgoing_transaction();
        bus.send(&mut transaction).await.expect("send");
    }

    #[test]
    fn second_transport_attachment_is_rejected() {
        let bus = Bus::new("polybus".to_owned(), MessageRegistry::new(), Vec::new(), Vec::new());
        bus.set_transport(Arc::new(RecordingTransport)).expect("first attach");
        let err = bus.set_transport(Arc::new(RecordingTransport)).unwrap_err();
        assert_eq!(err.code(), 1);
    }
}
