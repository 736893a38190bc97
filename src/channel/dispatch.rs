//! Inbound frame dispatch
//!
//! The connection's reader loop calls [`Channel::dispatch_frame`] for every
//! frame demultiplexed to this channel. Handlers either resolve a pending RPC
//! completion, drive the consumer/confirm/return machinery, or react to a
//! peer-initiated shutdown. Content-bearing methods pull their header and
//! body frames from the connection inline; nothing else may consume frames in
//! between.

use bytes::BytesMut;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use crate::consumer::{self, DeliveredMessage};
use crate::error::{CloseReason, Error, Result};
use crate::frame::{ContentHeader, Frame, Method};
use crate::message::{Delivery, GetMessage, Queue, ReturnedMessage};
use crate::rpc::{RpcKey, RpcReply};
use crate::Payload;

use super::Channel;

impl Channel {
    /// Dispatches one inbound frame.
    ///
    /// Any dispatch failure is terminal for the channel: the state moves to
    /// closed and every pending RPC fails with the same error, which is also
    /// returned so the connection can decide policy.
    pub async fn dispatch_frame(&self, frame: Frame) -> Result<()> {
        let result = self.dispatch(frame).await;
        if let Err(err) = &result {
            error!(channel = self.id(), error = %err, "frame dispatch failed, closing channel");
            self.set_closed(err.clone());
        }
        result
    }

    async fn dispatch(&self, frame: Frame) -> Result<()> {
        let method = match frame {
            Frame::Method(method) => method,
            // Header and body frames are only valid while assembling content,
            // and assembly pulls them itself.
            Frame::Header(_) | Frame::Body(_) => {
                return Err(Error::UnexpectedFrame("a method frame"))
            }
        };

        trace!(
            channel = self.id(),
            class = method.class_id(),
            method = method.method_id(),
            "dispatching method"
        );

        match method {
            // channel class
            Method::ChannelOpenOk => self.on_open_ok(),
            Method::ChannelFlowOk { active } => self.on_flow_ok(active),
            Method::ChannelCloseOk => self.on_close_ok(),
            Method::ChannelClose {
                reply_code,
                reply_text,
                class_id,
                method_id,
            } => {
                self.on_server_channel_close(reply_code, reply_text, class_id, method_id)
                    .await
            }

            // exchange class
            Method::ExchangeDeclareOk => self.rpc().resolve(RpcKey::ExchangeDeclare, RpcReply::Unit),
            Method::ExchangeDeleteOk => self.rpc().resolve(RpcKey::ExchangeDelete, RpcReply::Unit),
            Method::ExchangeBindOk => self.rpc().resolve(RpcKey::ExchangeBind, RpcReply::Unit),
            Method::ExchangeUnbindOk => self.rpc().resolve(RpcKey::ExchangeUnbind, RpcReply::Unit),

            // queue class
            Method::QueueDeclareOk {
                queue,
                message_count,
                consumer_count,
            } => self.rpc().resolve(
                RpcKey::QueueDeclare,
                RpcReply::QueueDeclare(Queue {
                    name: queue,
                    message_count,
                    consumer_count,
                }),
            ),
            Method::QueueBindOk => self.rpc().resolve(RpcKey::QueueBind, RpcReply::Unit),
            Method::QueueUnbindOk => self.rpc().resolve(RpcKey::QueueUnbind, RpcReply::Unit),
            Method::QueuePurgeOk { message_count } => self
                .rpc()
                .resolve(RpcKey::QueuePurge, RpcReply::QueuePurge { message_count }),
            Method::QueueDeleteOk { .. } => self.rpc().resolve(RpcKey::QueueDelete, RpcReply::Unit),

            // basic class
            Method::BasicQosOk => self.rpc().resolve(RpcKey::BasicQos, RpcReply::Unit),
            Method::BasicConsumeOk { consumer_tag } => self
                .rpc()
                .resolve(RpcKey::BasicConsume, RpcReply::BasicConsume { consumer_tag }),
            Method::BasicCancelOk { consumer_tag } => self.on_cancel_ok(consumer_tag),
            Method::BasicDeliver {
                consumer_tag,
                delivery_tag,
                redelivered,
                exchange,
                routing_key,
            } => {
                self.on_deliver(consumer_tag, delivery_tag, redelivered, exchange, routing_key)
                    .await
            }
            Method::BasicGetOk {
                delivery_tag,
                redelivered,
                exchange,
                routing_key,
                message_count,
            } => {
                self.on_get_ok(delivery_tag, redelivered, exchange, routing_key, message_count)
                    .await
            }
            Method::BasicGetEmpty => self.rpc().fail(RpcKey::BasicGet, Error::EmptyQueue),
            Method::BasicAck {
                delivery_tag,
                multiple,
            } => self.on_server_ack(delivery_tag, multiple),
            Method::BasicNack {
                delivery_tag,
                multiple,
                ..
            } => self.on_server_nack(delivery_tag, multiple),
            Method::BasicCancel { consumer_tag, .. } => self.on_server_cancel(consumer_tag).await,
            Method::BasicReturn {
                reply_code,
                reply_text,
                exchange,
                routing_key,
            } => {
                self.on_return(reply_code, reply_text, exchange, routing_key)
                    .await
            }
            Method::BasicRecoverOk => self.rpc().resolve(RpcKey::BasicRecover, RpcReply::Unit),

            // confirm class
            Method::ConfirmSelectOk => self.on_confirm_select_ok(),

            // Outbound-only methods have no inbound handler.
            other => Err(Error::NotImplemented(other.class_id(), other.method_id())),
        }
    }

    //
    // lifecycle handlers
    //

    fn on_open_ok(&self) -> Result<()> {
        self.mark_open();
        debug!(channel = self.id(), "channel is open");
        self.rpc().resolve(RpcKey::Open, RpcReply::Unit)
    }

    fn on_flow_ok(&self, active: bool) -> Result<()> {
        // The peer confirmed pausing or resuming the flow; independent of the
        // closed signal.
        debug!(channel = self.id(), active, "flow ok");
        self.rpc().resolve(RpcKey::Flow, RpcReply::Flow { active })
    }

    fn on_close_ok(&self) -> Result<()> {
        info!(channel = self.id(), "channel closed");
        let result = self.rpc().resolve(RpcKey::Close, RpcReply::Unit);
        self.set_closed(Error::closed());
        result
    }

    async fn on_server_channel_close(
        &self,
        reply_code: u16,
        reply_text: String,
        class_id: u16,
        method_id: u16,
    ) -> Result<()> {
        error!(
            channel = self.id(),
            reply_code,
            reply_text = %reply_text,
            class_id,
            method_id,
            "channel closed by server"
        );
        self.send_method(Method::ChannelCloseOk, false).await?;
        self.set_closed(Error::ChannelClosed(Some(CloseReason {
            code: reply_code,
            text: reply_text,
            class_id,
            method_id,
        })));
        Ok(())
    }

    //
    // consumer and content handlers
    //

    /// Pulls the content header and body frames that follow a content-bearing
    /// method, concatenating body payloads until `body_size` is reached.
    async fn read_content(&self) -> Result<(ContentHeader, Payload)> {
        let header = match self.connection().next_frame(self.id()).await? {
            Frame::Header(header) => header,
            _ => return Err(Error::UnexpectedFrame("a content header frame")),
        };
        let mut body = BytesMut::with_capacity(header.body_size as usize);
        while (body.len() as u64) < header.body_size {
            match self.connection().next_frame(self.id()).await? {
                Frame::Body(chunk) => body.extend_from_slice(&chunk),
                _ => return Err(Error::UnexpectedFrame("a content body frame")),
            }
        }
        Ok((header, body.freeze()))
    }

    async fn on_deliver(
        &self,
        consumer_tag: String,
        delivery_tag: u64,
        redelivered: bool,
        exchange: String,
        routing_key: String,
    ) -> Result<()> {
        let (header, body) = self.read_content().await?;
        trace!(
            channel = self.id(),
            consumer_tag = %consumer_tag,
            delivery_tag,
            body_size = body.len(),
            "delivery assembled"
        );
        let message = DeliveredMessage {
            delivery: Delivery {
                consumer_tag: consumer_tag.clone(),
                delivery_tag,
                exchange,
                routing_key,
                redelivered,
            },
            properties: header.properties,
            body,
        };
        if !self.consumers().deliver(&consumer_tag, message) {
            consumer::warn_unroutable_delivery(self.id(), &consumer_tag);
        }
        Ok(())
    }

    async fn on_get_ok(
        &self,
        delivery_tag: u64,
        redelivered: bool,
        exchange: String,
        routing_key: String,
        message_count: u32,
    ) -> Result<()> {
        let (header, body) = self.read_content().await?;
        let message = GetMessage {
            delivery_tag,
            redelivered,
            exchange,
            routing_key,
            message_count,
            properties: header.properties,
            body,
        };
        self.rpc()
            .resolve(RpcKey::BasicGet, RpcReply::BasicGet(Box::new(message)))
    }

    async fn on_return(
        &self,
        reply_code: u16,
        reply_text: String,
        exchange: String,
        routing_key: String,
    ) -> Result<()> {
        let (header, body) = self.read_content().await?;
        let envelope = ReturnedMessage {
            reply_code,
            reply_text,
            exchange,
            routing_key,
        };
        match self.return_callback() {
            Some(callback) => callback(self.clone(), body, envelope, header.properties)
                .await
                .map_err(|err| Error::Callback(Arc::new(err))),
            None => {
                warn!(
                    channel = self.id(),
                    reply_code = envelope.reply_code,
                    "message returned by the broker but no return callback is registered"
                );
                Ok(())
            }
        }
    }

    fn on_cancel_ok(&self, consumer_tag: String) -> Result<()> {
        self.consumers().remove(&consumer_tag);
        self.rpc()
            .resolve(RpcKey::BasicCancel, RpcReply::BasicCancel { consumer_tag })
    }

    async fn on_server_cancel(&self, consumer_tag: String) -> Result<()> {
        // https://www.rabbitmq.com/consumer-cancel.html
        info!(channel = self.id(), consumer_tag = %consumer_tag, "consumer cancelled by server");
        self.consumers().mark_cancelled(&consumer_tag);
        for callback in self.cancellation_callbacks() {
            if let Err(err) = callback(self.clone(), consumer_tag.clone()).await {
                error!(
                    channel = self.id(),
                    consumer_tag = %consumer_tag,
                    error = %err,
                    "cancellation callback failed"
                );
            }
        }
        self.consumers().remove(&consumer_tag);
        Ok(())
    }

    //
    // publisher confirm handlers
    //

    fn on_server_ack(&self, delivery_tag: u64, multiple: bool) -> Result<()> {
        trace!(channel = self.id(), delivery_tag, multiple, "broker acked publish");
        if multiple {
            // Tag 0 with the multiple bit means everything outstanding.
            let upper = if delivery_tag == 0 { u64::MAX } else { delivery_tag };
            self.rpc()
                .complete_confirms_up_to(upper, |_| Ok(RpcReply::Unit));
            Ok(())
        } else {
            self.rpc()
                .resolve(RpcKey::PublishConfirm(delivery_tag), RpcReply::Unit)
        }
    }

    fn on_server_nack(&self, delivery_tag: u64, multiple: bool) -> Result<()> {
        debug!(channel = self.id(), delivery_tag, multiple, "broker nacked publish");
        if multiple {
            let upper = if delivery_tag == 0 { u64::MAX } else { delivery_tag };
            self.rpc()
                .complete_confirms_up_to(upper, |tag| Err(Error::PublishFailed(tag)));
            Ok(())
        } else {
            self.rpc().fail(
                RpcKey::PublishConfirm(delivery_tag),
                Error::PublishFailed(delivery_tag),
            )
        }
    }

    fn on_confirm_select_ok(&self) -> Result<()> {
        self.enable_confirms();
        self.rpc().resolve(RpcKey::ConfirmSelect, RpcReply::Unit)
    }
}
