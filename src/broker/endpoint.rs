//! A single named endpoint attached to an [`InMemoryBroker`].
//!
//! Grounded in `transport/legacy`, where each connection is a distinct
//! addressable peer of the server; here each
//! endpoint is a distinct addressable bus attached to the shared broker.

use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;

use crate::bus::Bus;
use crate::error::Result;
use crate::message_info::MessageInfo;
use crate::transaction::Transaction;
use crate::transport::ITransport;

use super::InMemoryBroker;

/// One bus's attachment point on an [`InMemoryBroker`].
///
/// Holds only a [`Weak`] reference back to its bus: the bus owns this
/// endpoint (as its `Arc<dyn ITransport>`), so an owning reference the
/// other way would form a cycle neither side could ever drop.
pub struct InMemoryEndpoint {
    pub(super) name: String,
    pub(super) broker: Arc<InMemoryBroker>,
    pub(super) bus: Weak<Bus>,
    pub(super) dead_letter_endpoint: OnceLock<String>,
}

impl InMemoryEndpoint {
    /// This endpoint's name, as used in subscriptions and explicit routing.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Designates `endpoint` as the destination for messages this endpoint
    /// cannot route (see [`crate::handlers::retry::RetryHandler`]). May be
    /// set at most once; later calls are ignored.
    pub fn set_dead_letter_endpoint(&self, endpoint: impl Into<String>) {
        let _ = self.dead_letter_endpoint.set(endpoint.into());
    }

    pub(super) fn bus(&self) -> Option<Arc<Bus>> {
        self.bus.upgrade()
    }
}

#[async_trait]
impl ITransport for InMemoryEndpoint {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    async fn handle(&self, transaction: &mut Transaction) -> Result<()> {
        let messages = std::mem::take(transaction.base_mut().outgoing_messages_mut());
        for message in messages {
            self.broker.route(&self.name, message).await;
        }
        Ok(())
    }

    async fn subscribe(&self, message_info: &MessageInfo) -> Result<()> {
        self.broker.subscribe(&self.name, message_info);
        Ok(())
    }

    fn dead_letter_endpoint(&self) -> Option<&str> {
        self.dead_letter_endpoint.get().map(String::as_str)
    }

    fn supports_subscriptions(&self) -> bool {
        true
    }

    fn supports_command_messages(&self) -> bool {
        true
    }

    fn supports_delayed_commands(&self) -> bool {
        true
    }
}
