//! Retry-then-dead-letter middleware for the incoming pipeline.
//!
//! Grounded in `handler.rs`'s error-to-response translation, generalized
//! from "turn an error into a protocol reply" to "turn an error into
//! either another attempt or a dead-letter delivery", and in
//! `error_handlers.py`'s `ErrorHandler.retrier` for the retry/dead-letter
//! algorithm itself.
//!
//! Failed attempts are retried immediately, in-process, up to
//! `max_immediate_retries` times. Once that budget is exhausted, the
//! message is re-queued through the broker with a `deliver_at` in the
//! future, up to `max_delayed_retries` times, so that a transient failure
//! (e.g. a downstream dependency still starting up) gets a second chance
//! after other traffic has had a chance to run. Once both budgets are
//! exhausted the message is routed to the transport's configured
//! dead-letter endpoint, if any.
//!
//! The delayed-retry attempt count travels on the wire rather than in the
//! transaction's in-process state: every redelivery builds a brand-new
//! transaction (see [`crate::broker::InMemoryBroker`]), so only a header
//! on the message itself survives across re-queues.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use crate::error::{PolyBusError, Result};
use crate::headers;
use crate::message::OutgoingMessage;
use crate::pipeline::{Handler, Next};
use crate::transaction::Transaction;

/// The immediate and delayed retry budget used when neither is configured
/// explicitly, matching `ErrorHandler`'s defaults.
pub const DEFAULT_RETRY_BUDGET: u32 = 3;

/// The per-attempt delayed-retry backoff used when not configured
/// explicitly: the Nth delayed attempt is scheduled `N * DEFAULT_DELAY_INCREMENT`
/// after the immediate budget is exhausted.
pub const DEFAULT_DELAY_INCREMENT: Duration = Duration::from_secs(30);

/// Configures and runs the retry/dead-letter algorithm.
pub struct RetryHandler {
    max_immediate_retries: u32,
    immediate_retry_delay: Duration,
    max_delayed_retries: u32,
    delay_increment: Duration,
    retry_count_header: String,
    error_message_header: String,
    error_stack_trace_header: String,
}

impl Default for RetryHandler {
    /// A budget of `3` for both tiers, no delay between immediate attempts,
    /// and a 30-second delayed-retry backoff increment, matching
    /// `error_handlers.py`'s `ErrorHandler` property defaults.
    fn default() -> Self {
        Self::new(
            DEFAULT_RETRY_BUDGET,
            Duration::ZERO,
            DEFAULT_RETRY_BUDGET,
            DEFAULT_DELAY_INCREMENT,
        )
    }
}

impl RetryHandler {
    /// Creates a retry handler with the given immediate and delayed
    /// budgets, each floored at `1`: a tier can be made to exhaust on its
    /// first attempt, but never disabled outright. `delay_increment` is
    /// the backoff applied per delayed attempt (the Nth delayed attempt is
    /// scheduled `N * delay_increment` out).
    #[must_use]
    pub fn new(
        max_immediate_retries: u32,
        immediate_retry_delay: Duration,
        max_delayed_retries: u32,
        delay_increment: Duration,
    ) -> Self {
        Self {
            max_immediate_retries: max_immediate_retries.max(1),
            immediate_retry_delay,
            max_delayed_retries: max_delayed_retries.max(1),
            delay_increment,
            retry_count_header: headers::RETRY_COUNT.to_owned(),
            error_message_header: headers::ERROR_MESSAGE.to_owned(),
            error_stack_trace_header: headers::ERROR_STACK_TRACE.to_owned(),
        }
    }

    /// Overrides the header used to carry the delayed-retry attempt count
    /// across re-queues. Defaults to [`headers::RETRY_COUNT`].
    #[must_use]
    pub fn with_retry_count_header(mut self, header: impl Into<String>) -> Self {
        self.retry_count_header = header.into();
        self
    }

    /// Overrides the header stamped with the triggering error's message on
    /// a dead-lettered message. Defaults to [`headers::ERROR_MESSAGE`].
    #[must_use]
    pub fn with_error_message_header(mut self, header: impl Into<String>) -> Self {
        self.error_message_header = header.into();
        self
    }

    /// Overrides the header stamped with the triggering error's debug
    /// representation on a dead-lettered message. Defaults to
    /// [`headers::ERROR_STACK_TRACE`].
    #[must_use]
    pub fn with_error_stack_trace_header(mut self, header: impl Into<String>) -> Self {
        self.error_stack_trace_header = header.into();
        self
    }

    /// Reads the delayed-retry attempt count off the incoming message's
    /// `retry_count_header`, defaulting to `0` if absent or unparsable.
    /// Outgoing transactions never carry this header, so they report `0`.
    fn delayed_attempts(&self, transaction: &Transaction) -> u32 {
        match transaction {
            Transaction::Incoming(tx) => tx
                .incoming_message
                .headers
                .get(&self.retry_count_header)
                .and_then(|value| value.parse().ok())
                .unwrap_or(0),
            Transaction::Outgoing(_) => 0,
        }
    }
}

#[async_trait]
impl Handler for RetryHandler {
    async fn call(&self, transaction: &mut Transaction, next: Next<'_>) -> Result<()> {
        let delayed_attempts = self.delayed_attempts(transaction);
        let mut last_error = None;

        for attempt in 0..=self.max_immediate_retries {
            if attempt > 0 {
                tokio::time::sleep(self.immediate_retry_delay).await;
            }
            transaction.base_mut().outgoing_messages_mut().clear();
            match next.call(transaction).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(attempt, delayed_attempts, error = %err, "incoming handler failed");
                    last_error = Some(err);
                }
            }
        }

        let Some(last_error) = last_error else {
            // Unreachable: the loop above runs at least once and only
            // falls through here after recording an error on every
            // iteration.
            return Ok(());
        };

        // Both budgets replace the transaction's outgoing batch with a
        // single requeue-or-dead-letter message. `next` still points at
        // the handlers between this one and the transport, so handing the
        // replacement to them via `next.call` would re-run (and re-fail)
        // those handlers; `deliver_directly` skips straight to the
        // transport instead.
        let bus = Arc::clone(transaction.base().bus());
        let can_delay = bus.supports_delayed_commands()?;
        if can_delay && delayed_attempts < self.max_delayed_retries {
            self.requeue_delayed(transaction, delayed_attempts)?;
        } else {
            self.dead_letter(transaction, &last_error)?;
        }
        bus.deliver_directly(transaction).await
    }
}

impl RetryHandler {
    fn requeue_delayed(&self, transaction: &mut Transaction, delayed_attempts: u32) -> Result<()> {
        let next_attempt = delayed_attempts + 1;
        let incoming = transaction.as_incoming_mut()?;
        let deliver_at = Utc::now()
            + chrono::Duration::from_std(self.delay_increment * next_attempt).unwrap_or(chrono::Duration::zero());
        let bus = Arc::clone(incoming.base.bus());
        let mut message = OutgoingMessage::new(
            bus,
            incoming.incoming_message.body.clone(),
            None,
            Some(incoming.incoming_message.message_info.clone()),
        )?;
        message.body = incoming.incoming_message.body.clone();
        message.headers = incoming.incoming_message.headers.clone();
        message
            .headers
            .insert(headers::MESSAGE_TYPE.to_owned(), message.message_info.to_string(true));
        message
            .headers
            .insert(self.retry_count_header.clone(), next_attempt.to_string());
        message.deliver_at = Some(deliver_at);
        transaction.base_mut().outgoing_messages_mut().clear();
        transaction.base_mut().outgoing_messages_mut().push(message);
        Ok(())
    }

    fn dead_letter(&self, transaction: &mut Transaction, error: &PolyBusError) -> Result<()> {
        let incoming = transaction.as_incoming_mut()?;
        let dead_letter_endpoint = incoming.base.bus().dead_letter_endpoint()?;
        transaction.base_mut().outgoing_messages_mut().clear();
        let Some(endpoint) = dead_letter_endpoint else {
            warn!("retry budget exhausted with no dead-letter endpoint configured; dropping message");
            return Ok(());
        };
        let incoming = transaction.as_incoming_mut()?;
        let bus = Arc::clone(incoming.base.bus());
        let mut message = OutgoingMessage::new(
            bus,
            incoming.incoming_message.body.clone(),
            Some(endpoint),
            Some(incoming.incoming_message.message_info.clone()),
        )?;
        message.body = incoming.incoming_message.body.clone();
        message.headers = incoming.incoming_message.headers.clone();
        message
            .headers
            .insert(headers::MESSAGE_TYPE.to_owned(), message.message_info.to_string(true));
        message
            .headers
            .insert(self.error_message_header.clone(), error.to_string());
        message
            .headers
            .insert(self.error_stack_trace_header.clone(), format!("{error:?}"));
        transaction.base_mut().outgoing_messages_mut().push(message);
        Ok(())
    }
}
