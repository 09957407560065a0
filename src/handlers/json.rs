//! Reference JSON (de)serializer handlers.
//!
//! Grounded in `wireframe`'s frame codec (a registered-by-type encode/decode
//! table keyed the same way) and, for the closure-table shape specifically,
//! `json_handlers.py`. The core stays serde-agnostic (see
//! [`crate::message`]); only this opt-in
//! handler pair needs `serde`/`serde_json`, since payload types here are
//! already statically known to Rust, unlike the dynamically dispatched
//! original.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{PolyBusError, Result};
use crate::headers::CONTENT_TYPE;
use crate::pipeline::{Handler, Next};
use crate::transaction::Transaction;

/// The `content-type` value this codec announces and expects.
pub const CONTENT_TYPE_JSON: &str = "application/json";

type Encoder = dyn Fn(&(dyn Any + Send + Sync)) -> Result<Vec<u8>> + Send + Sync;
type Decoder = dyn Fn(&[u8]) -> Result<Box<dyn Any + Send + Sync>> + Send + Sync;

/// A type-keyed table of JSON encode/decode closures.
///
/// One codec can back both the serializer and deserializer handlers for a
/// bus; register every payload type the bus exchanges before building it.
#[derive(Default)]
pub struct JsonCodec {
    encoders: HashMap<TypeId, Arc<Encoder>>,
    decoders: HashMap<TypeId, Arc<Decoder>>,
}

impl JsonCodec {
    /// Creates an empty codec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T`'s JSON encoder and decoder.
    pub fn register<T>(&mut self)
    where
        T: Serialize + DeserializeOwned + Any + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<T>();
        self.encoders.insert(
            type_id,
            Arc::new(|payload: &(dyn Any + Send + Sync)| {
                let typed = payload
                    .downcast_ref::<T>()
                    .ok_or_else(|| PolyBusError::serialization(TypeMismatch))?;
                serde_json::to_vec(typed).map_err(PolyBusError::serialization)
            }),
        );
        self.decoders.insert(
            type_id,
            Arc::new(|body: &[u8]| {
                let typed: T = serde_json::from_slice(body).map_err(PolyBusError::serialization)?;
                Ok(Box::new(typed) as Box<dyn Any + Send + Sync>)
            }),
        );
    }

    fn encode(&self, type_id: TypeId, payload: &(dyn Any + Send + Sync)) -> Result<Vec<u8>> {
        let encoder = self
            .encoders
            .get(&type_id)
            .ok_or(PolyBusError::MessageNotFound)?;
        encoder(payload)
    }

    fn decode(&self, type_id: TypeId, body: &[u8]) -> Result<Box<dyn Any + Send + Sync>> {
        let decoder = self
            .decoders
            .get(&type_id)
            .ok_or(PolyBusError::MessageNotFound)?;
        decoder(body)
    }
}

#[derive(Debug)]
struct TypeMismatch;

impl std::fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("payload type did not match its registered encoder")
    }
}

impl std::error::Error for TypeMismatch {}

/// Outgoing-pipeline handler: encodes `message.message` into `message.body`.
pub struct JsonSerializer {
    codec: Arc<JsonCodec>,
}

impl JsonSerializer {
    /// Wraps `codec` as a serializer handler.
    #[must_use]
    pub fn new(codec: Arc<JsonCodec>) -> Self {
        Self { codec }
    }
}

#[async_trait]
impl Handler for JsonSerializer {
    async fn call(&self, transaction: &mut Transaction, next: Next<'_>) -> Result<()> {
        let outgoing = transaction.as_outgoing_mut()?;
        let body = self.codec.encode(outgoing.type_id, outgoing.message.as_ref())?;
        outgoing.body = body;
        outgoing
            .headers
            .insert(CONTENT_TYPE.to_owned(), CONTENT_TYPE_JSON.to_owned());
        next.call(transaction).await
    }
}

/// Incoming-pipeline handler: decodes `message.body` into `message.message`.
pub struct JsonDeserializer {
    codec: Arc<JsonCodec>,
}

impl JsonDeserializer {
    /// Wraps `codec` as a deserializer handler.
    #[must_use]
    pub fn new(codec: Arc<JsonCodec>) -> Self {
        Self { codec }
    }
}

#[async_trait]
impl Handler for JsonDeserializer {
    async fn call(&self, transaction: &mut Transaction, next: Next<'_>) -> Result<()> {
        let incoming = transaction.as_incoming_mut()?;
        let decoded = self
            .codec
            .decode(incoming.incoming_message.resolved_type, &incoming.incoming_message.body)?;
        incoming.incoming_message.message = decoded;
        next.call(transaction).await
    }
}
