//! An in-process broker connecting multiple buses without a network hop.
//!
//! Grounded in `server/mod.rs`'s connection table, which keeps a
//! name-keyed map of live peers and fans outbound frames out
//! to whichever of them should receive it; here the "peers" are endpoints,
//! each wrapping a [`std::sync::Weak`] reference to its own [`Bus`].

pub mod endpoint;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::builder::TransportFactory;
use crate::bus::Bus;
use crate::error::Result;
use crate::message::OutgoingMessage;
use crate::message_info::MessageInfo;
use crate::transport::ITransport;

pub use endpoint::InMemoryEndpoint;

/// A shared in-process router. Construct once and attach it to multiple
/// buses via [`InMemoryBroker::add_endpoint`] to let them exchange
/// messages without a real transport.
pub struct InMemoryBroker {
    endpoints: Mutex<HashMap<String, Arc<InMemoryEndpoint>>>,
    subscriptions: Mutex<HashMap<String, Vec<String>>>,
    tasks: Mutex<JoinSet<()>>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    /// Creates an empty broker with no attached endpoints.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            endpoints: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            tasks: Mutex::new(JoinSet::new()),
        })
    }

    /// Attaches `bus` to this broker under `name`, returning the transport
    /// the bus's builder should install.
    pub fn add_endpoint(self: &Arc<Self>, bus: Weak<Bus>, name: impl Into<String>) -> Arc<InMemoryEndpoint> {
        let name = name.into();
        let endpoint = Arc::new(InMemoryEndpoint {
            name: name.clone(),
            broker: Arc::clone(self),
            bus,
            dead_letter_endpoint: std::sync::OnceLock::new(),
        });
        self.endpoints
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(name, Arc::clone(&endpoint));
        endpoint
    }

    /// Registers `endpoint_name` as a subscriber of `message_info`'s
    /// version-agnostic subscription key. Has no effect on routing for
    /// [`crate::message_info::MessageKind::Command`] messages, which are
    /// always routed to their owning endpoint directly.
    pub fn subscribe(&self, endpoint_name: &str, message_info: &MessageInfo) {
        self.subscriptions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(message_info.subscription_key())
            .or_default()
            .push(endpoint_name.to_owned());
    }

    /// Cancels every outstanding delayed-delivery task. Endpoints remain
    /// attached; call this from the owning bus's `stop`.
    pub async fn stop(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }

    /// Routes `message`, either immediately or after its `deliver_at`
    /// deadline. Never returns an error to the caller: routing failures for
    /// one subscriber must not abort delivery to the others, so each
    /// failure is logged and swallowed (see the ambient logging policy).
    pub async fn route(self: &Arc<Self>, origin: &str, message: OutgoingMessage) {
        let broker = Arc::clone(self);
        let origin = origin.to_owned();
        if let Some(deliver_at) = message.deliver_at {
            let delay = (deliver_at - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);
            let mut tasks = self.tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            tasks.spawn(async move {
                tokio::time::sleep(delay).await;
                broker.deliver(&origin, message).await;
            });
        } else {
            self.deliver(&origin, message).await;
        }
    }

    async fn deliver(&self, origin: &str, message: OutgoingMessage) {
        let destinations = self.destinations_for(origin, &message);
        if destinations.is_empty() {
            self.dead_letter(origin, message).await;
            return;
        }
        for destination in destinations {
            self.deliver_to(&destination, &message).await;
        }
    }

    fn destinations_for(&self, _origin: &str, message: &OutgoingMessage) -> Vec<String> {
        if let Some(endpoint) = &message.endpoint {
            return vec![endpoint.clone()];
        }
        use crate::message_info::MessageKind;
        match message.message_info.kind {
            MessageKind::Command => {
                let target = message.message_info.endpoint.clone();
                if self.has_endpoint(&target) {
                    vec![target]
                } else {
                    Vec::new()
                }
            }
            MessageKind::Event => {
                let key = message.message_info.subscription_key();
                let subscribers = self
                    .subscriptions
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .get(&key)
                    .cloned()
                    .unwrap_or_default();
                subscribers
            }
        }
    }

    fn has_endpoint(&self, name: &str) -> bool {
        self.endpoints
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(name)
    }

    async fn deliver_to(&self, destination: &str, message: &OutgoingMessage) {
        let endpoint = self
            .endpoints
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(destination)
            .cloned();
        let Some(endpoint) = endpoint else {
            warn!(destination, "no such endpoint; dropping message");
            return;
        };
        let Some(bus) = endpoint.bus() else {
            debug!(destination, "endpoint's bus has been dropped; dropping message");
            return;
        };
        let mut transaction = match bus.create_incoming_transaction(message.body.clone(), message.message_info.clone()) {
            Ok(transaction) => transaction,
            Err(err) => {
                warn!(destination, error = %err, "could not build incoming transaction");
                return;
            }
        };
        if let Ok(incoming) = transaction.as_incoming_mut() {
            incoming.incoming_message.headers = message.headers.clone();
        }
        if let Err(err) = bus.send(&mut transaction).await {
            warn!(destination, error = %err, "incoming pipeline failed");
        }
    }

    async fn dead_letter(&self, origin: &str, mut message: OutgoingMessage) {
        let dead_letter_endpoint = self
            .endpoints
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(origin)
            .and_then(|endpoint| endpoint.dead_letter_endpoint().map(str::to_owned));
        let Some(dead_letter_endpoint) = dead_letter_endpoint else {
            let message_info = message.message_info.to_string(true);
            warn!(origin, message_info, "unroutable message with no dead-letter endpoint; dropping");
            return;
        };
        message.endpoint = Some(dead_letter_endpoint.clone());
        self.deliver_to(&dead_letter_endpoint, &message).await;
    }
}

/// A [`TransportFactory`] that attaches a new endpoint named `name` on a
/// shared broker. Construct one per bus that should join the same broker.
pub struct BrokerTransportFactory {
    broker: Arc<InMemoryBroker>,
    name: String,
}

impl BrokerTransportFactory {
    /// Creates a factory that attaches to `broker` under `name`.
    #[must_use]
    pub fn new(broker: Arc<InMemoryBroker>, name: impl Into<String>) -> Self {
        Self {
            broker,
            name: name.into(),
        }
    }
}

#[async_trait]
impl TransportFactory for BrokerTransportFactory {
    async fn create(&self, bus: Weak<Bus>) -> Result<Arc<dyn ITransport>> {
        Ok(self.broker.add_endpoint(bus, self.name.clone()))
    }
}
