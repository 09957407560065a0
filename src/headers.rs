//! Common header names used throughout PolyBus.
//!
//! These are plain string constants; the core never interprets
//! [`CORRELATION_ID`] or [`REQUEST_ID`] itself, but reference handlers and
//! integrations use them for correlation-id propagation.

/// Header carrying a correlation identifier for tracking related messages.
pub const CORRELATION_ID: &str = "correlation-id";

/// Header carrying the message body's content type, e.g. `application/json`.
pub const CONTENT_TYPE: &str = "content-type";

/// Header carrying the canonical [`crate::message_info::MessageInfo`] string
/// for the message (wire-visible type identity).
pub const MESSAGE_TYPE: &str = "x-type";

/// Header carrying a unique identifier for the message itself.
pub const REQUEST_ID: &str = "request-id";

/// Header carrying the delayed-retry attempt count, read and incremented by
/// [`crate::handlers::retry::RetryHandler`] on each re-queue.
pub const RETRY_COUNT: &str = "x-retry-count";

/// Header carrying the triggering error's message, stamped by
/// [`crate::handlers::retry::RetryHandler`] on a dead-lettered message.
pub const ERROR_MESSAGE: &str = "x-error-message";

/// Header carrying the triggering error's debug representation, stamped by
/// [`crate::handlers::retry::RetryHandler`] on a dead-lettered message.
pub const ERROR_STACK_TRACE: &str = "x-error-stack-trace";
