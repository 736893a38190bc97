#![deny(missing_docs, missing_debug_implementations)]

//! The channel layer of an asynchronous AMQP 0-9-1 client, based on tokio.
//!
//! An AMQP 0-9-1 connection multiplexes independent logical [`Channel`]s over
//! one TCP stream. This crate implements everything channel-scoped: the
//! open/close state machine, correlation of synchronous request/response
//! exchanges, fragmentation of outbound content against the negotiated
//! `frame_max`, assembly of inbound multi-frame messages, consumer dispatch
//! with its `consume-ok` ordering guarantee, publisher confirms, and
//! server-initiated cancellation and closure.
//!
//! The connection itself — socket, handshake, heartbeats and the byte-level
//! wire codec — lives outside this crate behind the [`Connection`] trait. Its
//! reader loop demultiplexes inbound frames by channel id and hands each one
//! to [`Channel::dispatch_frame`].
//!
//! # Quick start
//!
//! ```rust,ignore
//! use fe3o4_amqp::{Channel, FieldTable};
//! use fe3o4_amqp::options::{BasicConsumeOptions, QueueDeclareOptions};
//! use std::sync::Arc;
//!
//! // `conn` implements fe3o4_amqp::Connection
//! let channel = Channel::new(1, conn.clone());
//! channel.open().await?;
//!
//! let queue = channel
//!     .queue_declare("tasks", QueueDeclareOptions::default(), FieldTable::new())
//!     .await?;
//!
//! let consumer_tag = channel
//!     .basic_consume(
//!         Arc::new(|_channel, body, delivery, _properties| {
//!             Box::pin(async move {
//!                 println!("{}: {} bytes", delivery.delivery_tag, body.len());
//!                 Ok(())
//!             })
//!         }),
//!         &queue.name,
//!         "",
//!         BasicConsumeOptions::default(),
//!         FieldTable::new(),
//!     )
//!     .await?;
//! ```

pub mod channel;
pub mod connection;
pub mod consumer;
pub mod error;
pub mod frame;
pub mod message;
pub mod options;
pub mod types;

pub(crate) mod rpc;

pub use channel::{Channel, ChannelState};
pub use connection::Connection;
pub use consumer::{CancellationCallback, ConsumerCallback, ReturnCallback};
pub use error::{BoxError, CloseReason, Error, Result};
pub use frame::{ContentHeader, Frame, Method};
pub use message::{Delivery, GetMessage, Queue, ReturnedMessage};
pub use types::{BasicProperties, ExchangeKind, FieldTable, FieldValue};

/// Message payload bytes.
pub type Payload = bytes::Bytes;
