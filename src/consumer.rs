//! Consumer registry and delivery workers
//!
//! Each consumer owns a spawned worker task fed by an unbounded delivery
//! queue. The worker awaits the consumer's one-shot ready gate before the
//! first callback, so a delivery that arrives ahead of `basic.consume-ok`
//! parks in the worker instead of stalling frame dispatch, and callbacks for
//! one consumer always run in arrival order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, trace, warn};

use crate::channel::Channel;
use crate::error::{BoxError, Error};
use crate::message::{Delivery, ReturnedMessage};
use crate::types::BasicProperties;
use crate::Payload;

/// Callback invoked for every message delivered to a consumer.
pub type ConsumerCallback = Arc<
    dyn Fn(Channel, Payload, Delivery, BasicProperties) -> BoxFuture<'static, Result<(), BoxError>>
        + Send
        + Sync,
>;

/// Callback invoked for messages the broker returned as undeliverable.
pub type ReturnCallback = Arc<
    dyn Fn(
            Channel,
            Payload,
            ReturnedMessage,
            BasicProperties,
        ) -> BoxFuture<'static, Result<(), BoxError>>
        + Send
        + Sync,
>;

/// Callback invoked when the broker cancels a consumer unilaterally.
pub type CancellationCallback =
    Arc<dyn Fn(Channel, String) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// A fully assembled delivery on its way to a consumer callback.
#[derive(Debug)]
pub(crate) struct DeliveredMessage {
    pub delivery: Delivery,
    pub properties: BasicProperties,
    pub body: Payload,
}

struct ConsumerEntry {
    deliveries: mpsc::UnboundedSender<DeliveredMessage>,
    /// Opener half of the ready gate; `None` once opened.
    gate: Option<oneshot::Sender<()>>,
}

/// The channel's consumer table.
#[derive(Default)]
pub(crate) struct Consumers {
    entries: Mutex<HashMap<String, ConsumerEntry>>,
    cancelled: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for Consumers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumers")
            .field("tags", &self.entries.lock().keys().collect::<Vec<_>>())
            .field("cancelled", &self.cancelled.lock())
            .finish()
    }
}

impl Consumers {
    /// Registers `callback` under `tag` and spawns its delivery worker.
    ///
    /// Called before `basic.consume` is written so a fast server cannot
    /// deliver to an unknown tag. Re-registering a tag replaces the previous
    /// entry; the orphaned worker drains and exits.
    pub fn register(&self, tag: &str, callback: ConsumerCallback, channel: Channel) {
        let (deliveries, rx) = mpsc::unbounded_channel();
        let (gate, gate_rx) = oneshot::channel();
        tokio::spawn(run_consumer(channel, tag.to_string(), callback, gate_rx, rx));
        self.entries.lock().insert(
            tag.to_string(),
            ConsumerEntry {
                deliveries,
                gate: Some(gate),
            },
        );
    }

    /// Opens the ready gate for `tag`, unblocking its first delivery.
    pub fn open_gate(&self, tag: &str) {
        if let Some(entry) = self.entries.lock().get_mut(tag) {
            if let Some(gate) = entry.gate.take() {
                let _ = gate.send(());
            }
        }
    }

    /// Re-keys a consumer whose server-assigned tag differs from the
    /// requested one.
    pub fn rename(&self, requested: &str, assigned: &str) {
        if requested == assigned {
            return;
        }
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.remove(requested) {
            entries.insert(assigned.to_string(), entry);
        }
    }

    /// Queues an assembled delivery for `tag`'s worker.
    ///
    /// Returns false for an unknown tag (e.g. a spurious delivery after a
    /// server-side cancel).
    pub fn deliver(&self, tag: &str, message: DeliveredMessage) -> bool {
        match self.entries.lock().get(tag) {
            Some(entry) => entry.deliveries.send(message).is_ok(),
            None => false,
        }
    }

    /// Drops the consumer entry for `tag`; its worker drains and exits.
    pub fn remove(&self, tag: &str) -> bool {
        self.entries.lock().remove(tag).is_some()
    }

    /// Records a server-side cancellation of `tag`.
    pub fn mark_cancelled(&self, tag: &str) {
        self.cancelled.lock().insert(tag.to_string());
    }

    /// True if the broker has unilaterally cancelled `tag`.
    pub fn is_cancelled(&self, tag: &str) -> bool {
        self.cancelled.lock().contains(tag)
    }

    /// Drops every consumer entry; called on channel teardown.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// One consumer's delivery loop.
async fn run_consumer(
    channel: Channel,
    tag: String,
    callback: ConsumerCallback,
    gate: oneshot::Receiver<()>,
    mut deliveries: mpsc::UnboundedReceiver<DeliveredMessage>,
) {
    let mut gate = Some(gate);
    while let Some(message) = deliveries.recv().await {
        if let Some(gate) = gate.take() {
            trace!(consumer_tag = %tag, "waiting for consume-ok before first delivery");
            if gate.await.is_err() {
                // Opener dropped without firing: the consumer was torn down
                // before the caller ever observed consume-ok.
                return;
            }
        }
        let delivery_tag = message.delivery.delivery_tag;
        trace!(consumer_tag = %tag, delivery_tag, "invoking consumer callback");
        if let Err(err) = callback(
            channel.clone(),
            message.body,
            message.delivery,
            message.properties,
        )
        .await
        {
            error!(consumer_tag = %tag, delivery_tag, error = %err, "consumer callback failed");
            channel.abort(Error::Callback(Arc::new(err)));
            return;
        }
    }
    trace!(consumer_tag = %tag, "consumer worker finished");
}

/// Logs a delivery that no longer has a consumer attached.
pub(crate) fn warn_unroutable_delivery(channel_id: u16, consumer_tag: &str) {
    warn!(
        channel = channel_id,
        consumer_tag, "dropping delivery for unknown or cancelled consumer"
    );
}
