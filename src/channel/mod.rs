//! AMQP 0-9-1 channel: a logical conversation multiplexed on one connection
//!
//! A [`Channel`] is a cheaply clonable handle over shared channel state. The
//! caller-facing operations live here; the outbound frame machinery and the
//! inbound method handlers live in the `writer` and `dispatch` submodules.
//! Inbound frames are handed to [`Channel::dispatch_frame`] by the
//! connection's reader loop, one frame at a time per channel.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::connection::Connection;
use crate::consumer::{CancellationCallback, ConsumerCallback, Consumers, ReturnCallback};
use crate::error::{CloseReason, Error, Result};
use crate::frame::Method;
use crate::message::{GetMessage, Queue};
use crate::options::*;
use crate::rpc::{Correlator, RpcKey, RpcReply};
use crate::types::{BasicProperties, ExchangeKind, FieldTable};
use crate::Payload;

mod dispatch;
mod writer;

/// Lifecycle state of a channel.
///
/// Transitions are monotonic: `Opening → Open → Closing → Closed`, with a
/// direct `Opening → Closed` shortcut on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Created, `channel.open-ok` not yet received.
    Opening,
    /// Usable for class operations.
    Open,
    /// `channel.close` sent, awaiting `channel.close-ok`.
    Closing,
    /// Closed by either peer or by connection teardown.
    Closed,
}

#[derive(Debug, Default)]
struct ConfirmState {
    enabled: bool,
    next_delivery_tag: u64,
}

pub(crate) struct ChannelInner {
    id: u16,
    connection: Arc<dyn Connection>,
    state: Mutex<ChannelState>,
    rpc: Correlator,
    consumers: Consumers,
    cancellation_callbacks: Mutex<Vec<CancellationCallback>>,
    return_callback: Mutex<Option<ReturnCallback>>,
    confirms: Mutex<ConfirmState>,
    closed: watch::Sender<bool>,
}

/// One logical AMQP channel.
///
/// Created by the connection layer with an id from its allocator, then opened
/// with [`open`](Channel::open). All operations take `&self`; clones share the
/// same underlying channel.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Channel {
    /// Creates a channel over `connection` with the id the connection
    /// allocated for it.
    pub fn new(channel_id: u16, connection: Arc<dyn Connection>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            inner: Arc::new(ChannelInner {
                id: channel_id,
                connection,
                state: Mutex::new(ChannelState::Opening),
                rpc: Correlator::default(),
                consumers: Consumers::default(),
                cancellation_callbacks: Mutex::new(Vec::new()),
                return_callback: Mutex::new(None),
                confirms: Mutex::new(ConfirmState::default()),
                closed,
            }),
        }
    }

    /// The channel id within its connection.
    pub fn id(&self) -> u16 {
        self.inner.id
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ChannelState {
        *self.inner.state.lock()
    }

    /// True while the channel is usable for class operations.
    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Resolves once the channel has closed, by either peer or by connection
    /// teardown.
    pub async fn on_closed(&self) {
        let mut closed = self.inner.closed.subscribe();
        while !*closed.borrow_and_update() {
            if closed.changed().await.is_err() {
                return;
            }
        }
    }

    /// Number of in-flight synchronous requests.
    #[doc(hidden)]
    pub fn pending_rpc_count(&self) -> usize {
        self.inner.rpc.len()
    }

    /// True if the broker has unilaterally cancelled `consumer_tag`.
    pub fn is_consumer_cancelled(&self, consumer_tag: &str) -> bool {
        self.inner.consumers.is_cancelled(consumer_tag)
    }

    /// Registers a callback invoked when the broker cancels a consumer.
    pub fn add_cancellation_callback(&self, callback: CancellationCallback) {
        self.inner.cancellation_callbacks.lock().push(callback);
    }

    /// Sets the callback invoked for messages the broker returns as
    /// undeliverable. Without one, returned messages are logged and dropped.
    pub fn set_return_callback(&self, callback: ReturnCallback) {
        *self.inner.return_callback.lock() = Some(callback);
    }

    fn set_state(&self, state: ChannelState) {
        *self.inner.state.lock() = state;
    }

    /// Transitions to `Closed` and tears the channel down: fails every
    /// pending RPC with `error`, drops the consumer table and returns the id
    /// to the connection. Idempotent; only the first call acts.
    pub(crate) fn set_closed(&self, error: Error) {
        {
            let mut state = self.inner.state.lock();
            if *state == ChannelState::Closed {
                return;
            }
            *state = ChannelState::Closed;
        }
        self.inner.rpc.fail_all(&error);
        self.inner.consumers.clear();
        self.inner.connection.release_channel_id(self.inner.id);
        let _ = self.inner.closed.send(true);
    }

    /// Terminal failure path for callback workers.
    pub(crate) fn abort(&self, error: Error) {
        tracing::error!(channel = self.inner.id, error = %error, "aborting channel");
        self.set_closed(error);
    }

    //
    // channel class
    //

    /// Opens the channel on the server.
    ///
    /// Bypasses the open-state precheck: it is the call that establishes that
    /// state.
    pub async fn open(&self) -> Result<()> {
        let reply = self.rpc_call(RpcKey::Open, Method::ChannelOpen, false).await?;
        expect_unit(reply, "channel.open-ok")
    }

    /// Closes the channel, reporting `reply_code` and `reply_text` to the
    /// server.
    ///
    /// Only permitted while open; closing a channel that is already closing
    /// or closed fails with [`Error::AlreadyClosing`].
    pub async fn close(&self, reply_code: u16, reply_text: &str) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                ChannelState::Open => *state = ChannelState::Closing,
                ChannelState::Closing | ChannelState::Closed => {
                    return Err(Error::AlreadyClosing)
                }
                ChannelState::Opening => return Err(Error::closed()),
            }
        }
        debug!(channel = self.inner.id, reply_code, "closing channel");
        let method = Method::ChannelClose {
            reply_code,
            reply_text: reply_text.to_string(),
            class_id: 0,
            method_id: 0,
        };
        let reply = self.rpc_call(RpcKey::Close, method, false).await?;
        expect_unit(reply, "channel.close-ok")
    }

    /// Asks the peer to pause (`active = false`) or resume deliveries on this
    /// channel; resolves with the peer's echoed flag.
    pub async fn flow(&self, active: bool) -> Result<bool> {
        let reply = self
            .rpc_call(RpcKey::Flow, Method::ChannelFlow { active }, false)
            .await?;
        match reply {
            RpcReply::Flow { active } => Ok(active),
            other => Err(unexpected_reply("channel.flow-ok", other)),
        }
    }

    /// Called by the connection when it is torn down: fails every unresolved
    /// completion with `error`, or with a channel-closed error synthesized
    /// from `code` and `reason`, and closes the channel.
    pub fn connection_closed(&self, code: Option<u16>, reason: Option<&str>, error: Option<Error>) {
        let error = error.unwrap_or_else(|| {
            if code.is_none() && reason.is_none() {
                Error::closed()
            } else {
                Error::ChannelClosed(Some(CloseReason::new(
                    code.unwrap_or(0),
                    reason.unwrap_or_default(),
                )))
            }
        });
        debug!(channel = self.inner.id, error = %error, "connection closed under channel");
        self.set_closed(error);
    }

    //
    // exchange class
    //

    /// Declares an exchange, or with `passive` verifies that it exists.
    pub async fn exchange_declare(
        &self,
        exchange: &str,
        kind: ExchangeKind,
        options: ExchangeDeclareOptions,
        arguments: FieldTable,
    ) -> Result<()> {
        let method = Method::ExchangeDeclare {
            exchange: exchange.to_string(),
            kind: kind.as_str().to_string(),
            passive: options.passive,
            durable: options.durable,
            auto_delete: options.auto_delete,
            internal: options.internal,
            nowait: options.nowait,
            arguments,
        };
        if options.nowait {
            return self.send_method(method, true).await;
        }
        let reply = self.rpc_call(RpcKey::ExchangeDeclare, method, true).await?;
        expect_unit(reply, "exchange.declare-ok")
    }

    /// Alias for [`exchange_declare`](Channel::exchange_declare).
    pub async fn exchange(
        &self,
        exchange: &str,
        kind: ExchangeKind,
        options: ExchangeDeclareOptions,
        arguments: FieldTable,
    ) -> Result<()> {
        self.exchange_declare(exchange, kind, options, arguments).await
    }

    /// Deletes an exchange.
    pub async fn exchange_delete(
        &self,
        exchange: &str,
        options: ExchangeDeleteOptions,
    ) -> Result<()> {
        let method = Method::ExchangeDelete {
            exchange: exchange.to_string(),
            if_unused: options.if_unused,
            nowait: options.nowait,
        };
        if options.nowait {
            return self.send_method(method, true).await;
        }
        let reply = self.rpc_call(RpcKey::ExchangeDelete, method, true).await?;
        expect_unit(reply, "exchange.delete-ok")
    }

    /// Binds `destination` to `source` with `routing_key` (exchange to
    /// exchange binding).
    pub async fn exchange_bind(
        &self,
        destination: &str,
        source: &str,
        routing_key: &str,
        options: ExchangeBindOptions,
        arguments: FieldTable,
    ) -> Result<()> {
        let method = Method::ExchangeBind {
            destination: destination.to_string(),
            source: source.to_string(),
            routing_key: routing_key.to_string(),
            nowait: options.nowait,
            arguments,
        };
        if options.nowait {
            return self.send_method(method, true).await;
        }
        let reply = self.rpc_call(RpcKey::ExchangeBind, method, true).await?;
        expect_unit(reply, "exchange.bind-ok")
    }

    /// Removes an exchange to exchange binding.
    pub async fn exchange_unbind(
        &self,
        destination: &str,
        source: &str,
        routing_key: &str,
        options: ExchangeUnbindOptions,
        arguments: FieldTable,
    ) -> Result<()> {
        let method = Method::ExchangeUnbind {
            destination: destination.to_string(),
            source: source.to_string(),
            routing_key: routing_key.to_string(),
            nowait: options.nowait,
            arguments,
        };
        if options.nowait {
            return self.send_method(method, true).await;
        }
        let reply = self.rpc_call(RpcKey::ExchangeUnbind, method, true).await?;
        expect_unit(reply, "exchange.unbind-ok")
    }

    //
    // queue class
    //

    /// Declares a queue, or with `passive` verifies that it exists.
    ///
    /// An empty `queue` name asks the server to generate one. With `nowait`
    /// the server sends nothing back and the returned [`Queue`] echoes the
    /// requested name with zero counts.
    pub async fn queue_declare(
        &self,
        queue: &str,
        options: QueueDeclareOptions,
        arguments: FieldTable,
    ) -> Result<Queue> {
        let method = Method::QueueDeclare {
            queue: queue.to_string(),
            passive: options.passive,
            durable: options.durable,
            exclusive: options.exclusive,
            auto_delete: options.auto_delete,
            nowait: options.nowait,
            arguments,
        };
        if options.nowait {
            self.send_method(method, true).await?;
            return Ok(Queue {
                name: queue.to_string(),
                message_count: 0,
                consumer_count: 0,
            });
        }
        let reply = self.rpc_call(RpcKey::QueueDeclare, method, true).await?;
        match reply {
            RpcReply::QueueDeclare(queue) => Ok(queue),
            other => Err(unexpected_reply("queue.declare-ok", other)),
        }
    }

    /// Alias for [`queue_declare`](Channel::queue_declare).
    pub async fn queue(
        &self,
        queue: &str,
        options: QueueDeclareOptions,
        arguments: FieldTable,
    ) -> Result<Queue> {
        self.queue_declare(queue, options, arguments).await
    }

    /// Binds a queue to an exchange with `routing_key`.
    pub async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        options: QueueBindOptions,
        arguments: FieldTable,
    ) -> Result<()> {
        let method = Method::QueueBind {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            nowait: options.nowait,
            arguments,
        };
        if options.nowait {
            return self.send_method(method, true).await;
        }
        let reply = self.rpc_call(RpcKey::QueueBind, method, true).await?;
        expect_unit(reply, "queue.bind-ok")
    }

    /// Removes a queue binding. The protocol defines no `no-wait` variant for
    /// this method.
    pub async fn queue_unbind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        arguments: FieldTable,
    ) -> Result<()> {
        let method = Method::QueueUnbind {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            arguments,
        };
        let reply = self.rpc_call(RpcKey::QueueUnbind, method, true).await?;
        expect_unit(reply, "queue.unbind-ok")
    }

    /// Removes all messages from a queue; resolves with the number of
    /// messages purged.
    pub async fn queue_purge(&self, queue: &str, options: QueuePurgeOptions) -> Result<u32> {
        let method = Method::QueuePurge {
            queue: queue.to_string(),
            nowait: options.nowait,
        };
        if options.nowait {
            self.send_method(method, true).await?;
            return Ok(0);
        }
        let reply = self.rpc_call(RpcKey::QueuePurge, method, true).await?;
        match reply {
            RpcReply::QueuePurge { message_count } => Ok(message_count),
            other => Err(unexpected_reply("queue.purge-ok", other)),
        }
    }

    /// Deletes a queue.
    pub async fn queue_delete(&self, queue: &str, options: QueueDeleteOptions) -> Result<()> {
        let method = Method::QueueDelete {
            queue: queue.to_string(),
            if_unused: options.if_unused,
            if_empty: options.if_empty,
            nowait: options.nowait,
        };
        if options.nowait {
            return self.send_method(method, true).await;
        }
        let reply = self.rpc_call(RpcKey::QueueDelete, method, true).await?;
        expect_unit(reply, "queue.delete-ok")
    }

    //
    // basic class
    //

    /// Sets the prefetch window for this channel or its consumers.
    pub async fn basic_qos(&self, options: BasicQosOptions) -> Result<()> {
        let method = Method::BasicQos {
            prefetch_size: options.prefetch_size,
            prefetch_count: options.prefetch_count,
            global: options.global,
        };
        let reply = self.rpc_call(RpcKey::BasicQos, method, true).await?;
        expect_unit(reply, "basic.qos-ok")
    }

    /// Starts consuming from `queue`, invoking `callback` for every delivery.
    ///
    /// An empty `consumer_tag` synthesizes one. The callback is registered,
    /// and its ready gate created, before `basic.consume` is written, so a
    /// fast server cannot deliver to an unknown tag; the first delivery waits
    /// until this call has observed `consume-ok`. Resolves with the consumer
    /// tag in effect.
    pub async fn basic_consume(
        &self,
        callback: ConsumerCallback,
        queue: &str,
        consumer_tag: &str,
        options: BasicConsumeOptions,
        arguments: FieldTable,
    ) -> Result<String> {
        let tag = if consumer_tag.is_empty() {
            format!("ctag{}.{}", self.inner.id, Uuid::new_v4().simple())
        } else {
            consumer_tag.to_string()
        };
        self.inner.consumers.register(&tag, callback, self.clone());

        let method = Method::BasicConsume {
            queue: queue.to_string(),
            consumer_tag: tag.clone(),
            no_local: options.no_local,
            no_ack: options.no_ack,
            exclusive: options.exclusive,
            nowait: options.nowait,
            arguments,
        };

        if options.nowait {
            if let Err(err) = self.send_method(method, true).await {
                self.inner.consumers.remove(&tag);
                return Err(err);
            }
            self.inner.consumers.open_gate(&tag);
            return Ok(tag);
        }

        match self.rpc_call(RpcKey::BasicConsume, method, true).await {
            Ok(RpcReply::BasicConsume {
                consumer_tag: assigned,
            }) => {
                self.inner.consumers.rename(&tag, &assigned);
                self.inner.consumers.open_gate(&assigned);
                Ok(assigned)
            }
            Ok(other) => {
                self.inner.consumers.remove(&tag);
                Err(unexpected_reply("basic.consume-ok", other))
            }
            Err(err) => {
                self.inner.consumers.remove(&tag);
                Err(err)
            }
        }
    }

    /// Cancels a consumer; resolves with the cancelled tag.
    pub async fn basic_cancel(
        &self,
        consumer_tag: &str,
        options: BasicCancelOptions,
    ) -> Result<String> {
        let method = Method::BasicCancel {
            consumer_tag: consumer_tag.to_string(),
            nowait: options.nowait,
        };
        if options.nowait {
            self.inner.consumers.remove(consumer_tag);
            self.send_method(method, true).await?;
            return Ok(consumer_tag.to_string());
        }
        let reply = self.rpc_call(RpcKey::BasicCancel, method, true).await?;
        match reply {
            RpcReply::BasicCancel { consumer_tag } => Ok(consumer_tag),
            other => Err(unexpected_reply("basic.cancel-ok", other)),
        }
    }

    /// Synchronously pulls one message from `queue`.
    ///
    /// Fails with [`Error::EmptyQueue`] when the queue has no messages.
    pub async fn basic_get(&self, queue: &str, options: BasicGetOptions) -> Result<GetMessage> {
        let method = Method::BasicGet {
            queue: queue.to_string(),
            no_ack: options.no_ack,
        };
        let reply = self.rpc_call(RpcKey::BasicGet, method, true).await?;
        match reply {
            RpcReply::BasicGet(message) => Ok(*message),
            other => Err(unexpected_reply("basic.get-ok", other)),
        }
    }

    /// Acknowledges a delivery.
    pub async fn basic_client_ack(
        &self,
        delivery_tag: u64,
        options: BasicAckOptions,
    ) -> Result<()> {
        let method = Method::BasicAck {
            delivery_tag,
            multiple: options.multiple,
        };
        self.send_method(method, true).await
    }

    /// Negatively acknowledges a delivery.
    pub async fn basic_client_nack(
        &self,
        delivery_tag: u64,
        options: BasicNackOptions,
    ) -> Result<()> {
        let method = Method::BasicNack {
            delivery_tag,
            multiple: options.multiple,
            requeue: options.requeue,
        };
        self.send_method(method, true).await
    }

    /// Rejects a delivery.
    pub async fn basic_reject(
        &self,
        delivery_tag: u64,
        options: BasicRejectOptions,
    ) -> Result<()> {
        let method = Method::BasicReject {
            delivery_tag,
            requeue: options.requeue,
        };
        self.send_method(method, true).await
    }

    /// Asks the server to redeliver unacknowledged messages and waits for
    /// `basic.recover-ok`.
    pub async fn basic_recover(&self, options: BasicRecoverOptions) -> Result<()> {
        let method = Method::BasicRecover {
            requeue: options.requeue,
        };
        let reply = self.rpc_call(RpcKey::BasicRecover, method, true).await?;
        expect_unit(reply, "basic.recover-ok")
    }

    /// The legacy fire-and-forget form of [`basic_recover`](Channel::basic_recover).
    pub async fn basic_recover_async(&self, options: BasicRecoverOptions) -> Result<()> {
        let method = Method::BasicRecoverAsync {
            requeue: options.requeue,
        };
        self.send_method(method, true).await
    }

    //
    // publishing
    //

    /// Publishes a message without waiting for a broker confirm.
    ///
    /// When publisher confirms are enabled the publish still consumes the
    /// next delivery tag (returned as `Some`) and registers its per-tag
    /// completion, so the broker's eventual ack finds its bookkeeping; only
    /// the waiting is skipped.
    pub async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        options: BasicPublishOptions,
        payload: impl Into<Payload>,
        properties: BasicProperties,
    ) -> Result<Option<u64>> {
        let (delivery_tag, _confirm) = self
            .publish_frames(exchange, routing_key, options, payload.into(), properties)
            .await?;
        Ok(delivery_tag)
    }

    /// Publishes a message; when publisher confirms are enabled, waits for
    /// the broker to confirm it.
    ///
    /// Resolves with the consumed delivery tag, or fails with
    /// [`Error::PublishFailed`] if the broker nacked the message.
    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        options: BasicPublishOptions,
        payload: impl Into<Payload>,
        properties: BasicProperties,
    ) -> Result<Option<u64>> {
        let (delivery_tag, confirm) = self
            .publish_frames(exchange, routing_key, options, payload.into(), properties)
            .await?;
        if let Some(confirm) = confirm {
            match confirm.await {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => return Err(err),
                Err(_) => return Err(Error::closed()),
            }
        }
        Ok(delivery_tag)
    }

    /// Enables publisher confirms on this channel.
    ///
    /// Fails with [`Error::InvalidState`] if confirms are already enabled.
    pub async fn confirm_select(&self, options: ConfirmSelectOptions) -> Result<()> {
        if self.inner.confirms.lock().enabled {
            return Err(Error::InvalidState("publisher confirms already enabled"));
        }
        let method = Method::ConfirmSelect {
            nowait: options.nowait,
        };
        if options.nowait {
            self.send_method(method, true).await?;
            self.enable_confirms();
            return Ok(());
        }
        let reply = self.rpc_call(RpcKey::ConfirmSelect, method, true).await?;
        expect_unit(reply, "confirm.select-ok")
    }

    /// True once publisher confirms have been enabled.
    pub fn publisher_confirms(&self) -> bool {
        self.inner.confirms.lock().enabled
    }

    pub(crate) fn enable_confirms(&self) {
        let mut confirms = self.inner.confirms.lock();
        confirms.enabled = true;
        confirms.next_delivery_tag = 1;
        debug!(channel = self.inner.id, "publisher confirms enabled");
    }

    /// Consumes the next client-side delivery tag if confirms are enabled.
    pub(crate) fn next_delivery_tag(&self) -> Option<u64> {
        let mut confirms = self.inner.confirms.lock();
        if !confirms.enabled {
            return None;
        }
        let tag = confirms.next_delivery_tag;
        confirms.next_delivery_tag += 1;
        Some(tag)
    }

    pub(crate) fn connection(&self) -> &Arc<dyn Connection> {
        &self.inner.connection
    }

    pub(crate) fn rpc(&self) -> &Correlator {
        &self.inner.rpc
    }

    pub(crate) fn consumers(&self) -> &Consumers {
        &self.inner.consumers
    }

    pub(crate) fn return_callback(&self) -> Option<ReturnCallback> {
        self.inner.return_callback.lock().clone()
    }

    pub(crate) fn cancellation_callbacks(&self) -> Vec<CancellationCallback> {
        self.inner.cancellation_callbacks.lock().clone()
    }

    pub(crate) fn mark_open(&self) {
        self.set_state(ChannelState::Open);
        let _ = self.inner.closed.send(false);
    }
}

pub(crate) fn expect_unit(reply: RpcReply, expected: &'static str) -> Result<()> {
    match reply {
        RpcReply::Unit => Ok(()),
        other => Err(unexpected_reply(expected, other)),
    }
}

pub(crate) fn unexpected_reply(expected: &'static str, got: RpcReply) -> Error {
    Error::Synchronization(format!("expected {expected}, got {got:?}"))
}
