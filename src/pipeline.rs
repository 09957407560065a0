//! The reverse-composed middleware chain shared by the incoming and
//! outgoing pipelines.
//!
//! Grounded in `handler.rs`'s request-dispatch chain and in `pipeline.py`.
//! Rather than literally folding
//! handlers into nested closures right-to-left, this builds the same
//! observable order (handler 0 outermost, the transport terminal last) with
//! an index into a slice and a `Next` continuation — equivalent to, and
//! cheaper than, per-invocation closure construction.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::transaction::Transaction;
use crate::transport::ITransport;

/// One link in a pipeline.
///
/// Implementations call `next.call(transaction)` to continue the chain, or
/// return without calling it to short-circuit (e.g. a validator rejecting a
/// malformed message). Returning `Err` aborts the transaction.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Processes `transaction`, optionally delegating to `next`.
    async fn call(&self, transaction: &mut Transaction, next: Next<'_>) -> Result<()>;
}

/// The continuation passed to a [`Handler`], representing "the rest of the
/// chain including the transport terminal".
///
/// `Copy` because every field is a reference or an index: a handler that
/// needs to retry its downstream chain (see
/// [`crate::handlers::retry::RetryHandler`]) can call the same `Next`
/// more than once without the pipeline engine needing to know about retry
/// at all.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a [Arc<dyn Handler>],
    index: usize,
    transport: &'a Arc<dyn ITransport>,
}

impl<'a> Next<'a> {
    /// Invokes the next handler, or the transport terminal once the chain
    /// is exhausted.
    ///
    /// # Errors
    /// Propagates whatever the next handler (or the transport) returns.
    pub async fn call(self, transaction: &mut Transaction) -> Result<()> {
        if self.index == self.chain.len() {
            return self.transport.handle(transaction).await;
        }
        let handler = Arc::clone(&self.chain[self.index]);
        let next = Next {
            chain: self.chain,
            index: self.index + 1,
            transport: self.transport,
        };
        handler.call(transaction, next).await
    }

    #[cfg(test)]
    pub(crate) fn for_tests(chain: &'a [Arc<dyn Handler>], transport: &'a Arc<dyn ITransport>) -> Self {
        Self {
            chain,
            index: 0,
            transport,
        }
    }
}

/// Runs `chain` over `transaction`, terminating at `transport.handle`.
///
/// # Errors
/// Propagates any handler or transport failure.
pub async fn run(
    chain: &[Arc<dyn Handler>],
    transport: &Arc<dyn ITransport>,
    transaction: &mut Transaction,
) -> Result<()> {
    let next = Next {
        chain,
        index: 0,
        transport,
    };
    next.call(transaction).await
}
