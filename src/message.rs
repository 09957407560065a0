//! The message envelope data model: [`IncomingMessage`] and [`OutgoingMessage`].
//!
//! Grounded in `incoming_message.py` / `outgoing_message.py`. The `message`
//! payload is type-erased behind `dyn Any` the way `nautilus-common`'s
//! `msgbus::handler::TypedMessageHandler` erases its callback's argument
//! type — the registry and pipeline never need to know the concrete Rust
//! type, only middleware that downcasts it does.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::bus::Bus;
use crate::error::Result;
use crate::message_info::MessageInfo;

/// A message received from the transport.
///
/// Constructed by the transport when it receives data, mutated only by the
/// incoming pipeline (typically a deserializer handler followed by domain
/// handlers), and dropped when its transaction completes.
pub struct IncomingMessage {
    /// The bus this message arrived on.
    pub bus: Arc<Bus>,
    /// Header map; case-sensitive keys, last write wins.
    pub headers: HashMap<String, String>,
    /// The wire type identity of this message.
    pub message_info: MessageInfo,
    /// The raw, still-undeserialized body.
    pub body: Vec<u8>,
    /// The deserialized payload. Equals `body` (boxed) until a deserializer
    /// handler replaces it with a concrete type.
    pub message: Box<dyn Any + Send + Sync>,
    /// The Rust type resolved from `message_info` via the bus's registry.
    pub resolved_type: TypeId,
}

impl IncomingMessage {
    /// Builds an incoming message, resolving `message_info` against the
    /// bus's registry.
    ///
    /// # Errors
    /// Returns [`PolyBusError::MessageNotFound`] if no type is registered
    /// for a major-compatible `message_info`.
    pub fn new(bus: Arc<Bus>, body: Vec<u8>, message_info: MessageInfo) -> Result<Self> {
        let resolved_type = bus.messages().type_for(&message_info)?;
        let message: Box<dyn Any + Send + Sync> = Box::new(body.clone());
        Ok(Self {
            bus,
            headers: HashMap::new(),
            message_info,
            body,
            message,
            resolved_type,
        })
    }

    /// Returns the deserialized payload as `T`, or `None` if it has not yet
    /// been deserialized into that type.
    #[must_use]
    pub fn downcast_message<T: Any>(&self) -> Option<&T> {
        self.message.downcast_ref::<T>()
    }

    /// Replaces the deserialized payload, typically called by a
    /// deserializer handler.
    pub fn set_message<T: Any + Send + Sync>(&mut self, value: T) {
        self.message = Box::new(value);
    }
}

/// A message to be sent to the transport.
///
/// Constructed by [`crate::transaction::Transaction::add`], mutated by the
/// outgoing pipeline (typically a serializer handler), and consumed by the
/// transport.
pub struct OutgoingMessage {
    /// The bus this message will be sent from.
    pub bus: Arc<Bus>,
    /// Header map; case-sensitive keys, last write wins.
    pub headers: HashMap<String, String>,
    /// The typed payload, type-erased.
    pub message: Box<dyn Any + Send + Sync>,
    /// The `TypeId` of the original payload, used by serializer handlers to
    /// look up a matching codec.
    pub type_id: TypeId,
    /// The wire type identity, derived from the payload's type via the
    /// registry unless the caller supplied one explicitly.
    pub message_info: MessageInfo,
    /// The encoded body, populated by a serializer handler.
    pub body: Vec<u8>,
    /// Explicit endpoint override. If unset, the broker derives the
    /// destination from `message_info` and subscriptions.
    pub endpoint: Option<String>,
    /// If set and in the future, delivery is scheduled for this instant
    /// instead of being immediate.
    pub deliver_at: Option<DateTime<Utc>>,
}

impl OutgoingMessage {
    /// Builds an outgoing message wrapping `message`, resolving its
    /// [`MessageInfo`] from the bus's registry unless `message_info` is
    /// supplied explicitly.
    ///
    /// # Errors
    /// Returns [`PolyBusError::MessageNotFound`] if `message_info` is `None`
    /// and `T` has not been registered.
    pub fn new<T: Any + Send + Sync + 'static>(
        bus: Arc<Bus>,
        message: T,
        endpoint: Option<String>,
        message_info: Option<MessageInfo>,
    ) -> Result<Self> {
        let type_id = TypeId::of::<T>();
        let message_info = match message_info {
            Some(info) => info,
            None => bus.messages().info_for_type_id(type_id)?,
        };
        let mut headers = HashMap::new();
        headers.insert(crate::headers::MESSAGE_TYPE.to_owned(), message_info.to_string(true));
        Ok(Self {
            bus,
            headers,
            message: Box::new(message),
            type_id,
            message_info,
            body: Vec::new(),
            endpoint,
            deliver_at: None,
        })
    }

    /// Returns the payload as `T`, or `None` if `T` does not match the
    /// original type this message was created with.
    #[must_use]
    pub fn downcast_message<T: Any>(&self) -> Option<&T> {
        self.message.downcast_ref::<T>()
    }
}
