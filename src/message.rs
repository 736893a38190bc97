//! Envelopes and assembled messages handed to callers and callbacks

use crate::types::BasicProperties;
use crate::Payload;

/// The delivery envelope of a consumed message (`basic.deliver`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Tag of the consumer the message was delivered to.
    pub consumer_tag: String,
    /// Per-channel delivery tag, used to acknowledge the message.
    pub delivery_tag: u64,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key the message was published with.
    pub routing_key: String,
    /// True if the message may have been delivered before.
    pub redelivered: bool,
}

/// The envelope of a message the broker sent back (`basic.return`) because a
/// `mandatory` or `immediate` publish could not be satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnedMessage {
    /// AMQP reply code explaining the return.
    pub reply_code: u16,
    /// Human readable reply text.
    pub reply_text: String,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key the message was published with.
    pub routing_key: String,
}

/// A message pulled synchronously with `basic_get`.
#[derive(Debug, Clone, PartialEq)]
pub struct GetMessage {
    /// Per-channel delivery tag, used to acknowledge the message.
    pub delivery_tag: u64,
    /// True if the message may have been delivered before.
    pub redelivered: bool,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key the message was published with.
    pub routing_key: String,
    /// Number of messages remaining in the queue.
    pub message_count: u32,
    /// The message properties.
    pub properties: BasicProperties,
    /// The assembled message body.
    pub body: Payload,
}

/// The result of `queue_declare`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Queue {
    /// The queue name, possibly server-generated.
    pub name: String,
    /// Number of messages in the queue.
    pub message_count: u32,
    /// Number of consumers on the queue.
    pub consumer_count: u32,
}
