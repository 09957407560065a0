//! The fluent configuration surface used to assemble a [`Bus`].
//!
//! Grounded in `server/config.rs`-style builder structs, generalized from
//! server listen options to the bus's name, registry, pipelines, and
//! transport factory.

use std::any::Any;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;

use crate::broker::InMemoryBroker;
use crate::bus::Bus;
use crate::error::Result;
use crate::handlers::retry::RetryHandler;
use crate::message_info::MessageInfo;
use crate::pipeline::Handler;
use crate::registry::MessageRegistry;
use crate::transport::ITransport;

/// Builds the transport a [`Bus`] will use, given a back-reference to the
/// bus it is being attached to.
///
/// The back-reference is a [`Weak`] pointer: the bus owns its transport
/// strongly, so a transport (or the broker endpoint behind it) must never
/// hold a strong reference back, or neither could ever be dropped.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Builds the transport.
    ///
    /// # Errors
    /// Returns an error if the transport could not be constructed.
    async fn create(&self, bus: Weak<Bus>) -> Result<Arc<dyn ITransport>>;
}

/// The fallback used when no [`TransportFactory`] is configured: a private,
/// single-endpoint in-memory broker. Sufficient for a bus that only ever
/// talks to itself (e.g. in tests), but useless for exchanging messages
/// with another bus — use [`InMemoryBroker::add_endpoint`] directly and
/// `Builder::transport_factory` to share a broker across multiple buses.
struct DefaultTransportFactory;

#[async_trait]
impl TransportFactory for DefaultTransportFactory {
    async fn create(&self, bus: Weak<Bus>) -> Result<Arc<dyn ITransport>> {
        let broker = InMemoryBroker::new();
        Ok(broker.add_endpoint(bus, "default"))
    }
}

/// A fluent builder assembling a [`Bus`].
pub struct Builder {
    name: String,
    registry: MessageRegistry,
    incoming_pipeline: Vec<Arc<dyn Handler>>,
    outgoing_pipeline: Vec<Arc<dyn Handler>>,
    transport_factory: Arc<dyn TransportFactory>,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            name: "polybus".to_owned(),
            registry: MessageRegistry::new(),
            incoming_pipeline: Vec::new(),
            outgoing_pipeline: Vec::new(),
            transport_factory: Arc::new(DefaultTransportFactory),
        }
    }
}

impl Builder {
    /// Creates a builder with the default name `"polybus"`, an empty
    /// registry, empty pipelines, and the private in-memory transport
    /// fallback.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the bus's name, used in logging and diagnostics.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers `T` under `info`.
    ///
    /// # Errors
    /// Returns [`crate::error::PolyBusError::MessageNotFound`] if `T` is
    /// already registered.
    pub fn register<T: Any + Send + Sync + 'static>(self, info: MessageInfo) -> Result<Self> {
        self.registry.register::<T>(info)?;
        Ok(self)
    }

    /// Appends a handler to the end of the incoming pipeline.
    #[must_use]
    pub fn incoming_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.incoming_pipeline.push(handler);
        self
    }

    /// Appends a handler to the end of the outgoing pipeline.
    #[must_use]
    pub fn outgoing_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.outgoing_pipeline.push(handler);
        self
    }

    /// Installs [`RetryHandler`] as the outermost incoming handler, with
    /// explicit budgets and delayed-retry backoff increment (both budgets
    /// are floored at `1`; see [`RetryHandler::new`]). Use
    /// [`Builder::with_default_retry`] to install it with its built-in
    /// defaults instead.
    #[must_use]
    pub fn with_retry(
        self,
        max_immediate_retries: u32,
        immediate_retry_delay: Duration,
        max_delayed_retries: u32,
        delay_increment: Duration,
    ) -> Self {
        let handler = Arc::new(RetryHandler::new(
            max_immediate_retries,
            immediate_retry_delay,
            max_delayed_retries,
            delay_increment,
        ));
        self.incoming_handler(handler)
    }

    /// Installs [`RetryHandler::default`] as the outermost incoming
    /// handler: a budget of `3` for both tiers, no delay between
    /// immediate attempts, and a 30-second delayed-retry backoff
    /// increment.
    #[must_use]
    pub fn with_default_retry(self) -> Self {
        self.incoming_handler(Arc::new(RetryHandler::default()))
    }

    /// Overrides the transport factory. Share one [`InMemoryBroker`]
    /// across several builders (via a factory closing over
    /// `broker.add_endpoint`) to let those buses exchange messages.
    #[must_use]
    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transport_factory = factory;
        self
    }

    /// Builds the bus: constructs it, asks the transport factory for a
    /// transport (handing it a [`Weak`] back-reference), and attaches it.
    /// The returned bus is not yet started; call [`Bus::start`].
    ///
    /// # Errors
    /// Propagates the transport factory's failure, if any.
    pub async fn build(self) -> Result<Arc<Bus>> {
        let bus = Bus::new(self.name, self.registry, self.incoming_pipeline, self.outgoing_pipeline);
        let transport = self.transport_factory.create(Arc::downgrade(&bus)).await?;
        bus.set_transport(transport)?;
        Ok(bus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_info::MessageKind;

    struct Payload;

    #[tokio::test]
    async fn default_builder_produces_a_usable_self_talking_bus() {
        let bus = Builder::new()
            .register::<Payload>(MessageInfo::new(MessageKind::Event, "default", "payload", 1, 0, 0))
            .expect("register")
            .build()
            .await
            .expect("build");

        bus.start().await.expect("start");
        let mut transaction = bus.create_outgoing_transaction();
        bus.send(&mut transaction).await.expect("send");
    }

    #[tokio::test]
    async fn name_defaults_to_polybus() {
        let bus = Builder::new().build().await.expect("build");
        assert_eq!(bus.name(), "polybus");
    }
}
