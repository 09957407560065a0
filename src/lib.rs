//! An embeddable, polyglot message bus.
//!
//! A [`Bus`](bus::Bus) moves typed messages between application code and a
//! pluggable [`transport`], through a pair of directional middleware
//! pipelines ([`pipeline`]). Message identity travels on the wire as a
//! structured header (see [`message_info`]) rather than a bare type name,
//! so producers and consumers built against compatible minor/patch
//! versions of the same major version can interoperate without sharing a
//! schema registry. [`broker`] supplies an in-process transport for wiring
//! multiple buses together without a network hop, and [`handlers`] ships
//! reference JSON codec and retry/dead-letter middleware.
//!
//! Build one with [`builder::Builder`]:
//!
//! ```ignore
//! use std::time::Duration;
//! use polybus::builder::Builder;
//! use polybus::message_info::{MessageInfo, MessageKind};
//!
//! # async fn run() -> polybus::error::Result<()> {
//! let bus = Builder::new()
//!     .name("orders")
//!     .register::<OrderPlaced>(MessageInfo::new(MessageKind::Event, "orders", "OrderPlaced", 1, 0, 0))?
//!     .with_retry(3, Duration::from_millis(50), 2, Duration::from_secs(5))
//!     .build()
//!     .await?;
//! bus.start().await?;
//! # Ok(())
//! # }
//! # struct OrderPlaced;
//! ```

pub mod broker;
pub mod builder;
pub mod bus;
pub mod error;
pub mod handlers;
pub mod headers;
pub mod message;
pub mod message_info;
pub mod pipeline;
pub mod registry;
pub mod transaction;
pub mod transport;

pub use bus::Bus;
pub use builder::Builder;
pub use error::{PolyBusError, Result};
