//! Typed AMQP 0-9-1 frames as exchanged with the connection
//!
//! The connection owns the byte-level codec; the channel layer deals in
//! decoded frames only. Every method variant is pinned to its standard
//! `(class_id, method_id)` pair so protocol errors can name the offending
//! method.

use crate::types::{BasicProperties, FieldTable};
use crate::Payload;

/// Class id of the `channel.*` methods.
pub const CLASS_CHANNEL: u16 = 20;
/// Class id of the `exchange.*` methods.
pub const CLASS_EXCHANGE: u16 = 40;
/// Class id of the `queue.*` methods.
pub const CLASS_QUEUE: u16 = 50;
/// Class id of the `basic.*` methods.
pub const CLASS_BASIC: u16 = 60;
/// Class id of the `confirm.*` methods (RabbitMQ extension).
pub const CLASS_CONFIRM: u16 = 85;

/// A decoded frame belonging to one channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A method frame.
    Method(Method),
    /// A content header frame, following `basic.publish`, `basic.deliver`,
    /// `basic.get-ok` or `basic.return`.
    Header(ContentHeader),
    /// A content body frame.
    Body(Payload),
}

/// The content header carried between a content-bearing method and its body
/// frames.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentHeader {
    /// Class id of the carrying method (always `CLASS_BASIC` here).
    pub class_id: u16,
    /// Total size of the content body in bytes, across all body frames.
    pub body_size: u64,
    /// The basic properties of the message.
    pub properties: BasicProperties,
}

/// A decoded AMQP 0-9-1 method.
///
/// One tagged variant per method of the channel-scoped classes; matched
/// exhaustively by the dispatcher instead of hashing `(class, method)` pairs.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum Method {
    // channel (20)
    ChannelOpen,
    ChannelOpenOk,
    ChannelFlow {
        active: bool,
    },
    ChannelFlowOk {
        active: bool,
    },
    ChannelClose {
        reply_code: u16,
        reply_text: String,
        class_id: u16,
        method_id: u16,
    },
    ChannelCloseOk,

    // exchange (40)
    ExchangeDeclare {
        exchange: String,
        kind: String,
        passive: bool,
        durable: bool,
        auto_delete: bool,
        internal: bool,
        nowait: bool,
        arguments: FieldTable,
    },
    ExchangeDeclareOk,
    ExchangeDelete {
        exchange: String,
        if_unused: bool,
        nowait: bool,
    },
    ExchangeDeleteOk,
    ExchangeBind {
        destination: String,
        source: String,
        routing_key: String,
        nowait: bool,
        arguments: FieldTable,
    },
    ExchangeBindOk,
    ExchangeUnbind {
        destination: String,
        source: String,
        routing_key: String,
        nowait: bool,
        arguments: FieldTable,
    },
    ExchangeUnbindOk,

    // queue (50)
    QueueDeclare {
        queue: String,
        passive: bool,
        durable: bool,
        exclusive: bool,
        auto_delete: bool,
        nowait: bool,
        arguments: FieldTable,
    },
    QueueDeclareOk {
        queue: String,
        message_count: u32,
        consumer_count: u32,
    },
    QueueBind {
        queue: String,
        exchange: String,
        routing_key: String,
        nowait: bool,
        arguments: FieldTable,
    },
    QueueBindOk,
    QueuePurge {
        queue: String,
        nowait: bool,
    },
    QueuePurgeOk {
        message_count: u32,
    },
    QueueDelete {
        queue: String,
        if_unused: bool,
        if_empty: bool,
        nowait: bool,
    },
    QueueDeleteOk {
        message_count: u32,
    },
    QueueUnbind {
        queue: String,
        exchange: String,
        routing_key: String,
        arguments: FieldTable,
    },
    QueueUnbindOk,

    // basic (60)
    BasicQos {
        prefetch_size: u32,
        prefetch_count: u16,
        global: bool,
    },
    BasicQosOk,
    BasicConsume {
        queue: String,
        consumer_tag: String,
        no_local: bool,
        no_ack: bool,
        exclusive: bool,
        nowait: bool,
        arguments: FieldTable,
    },
    BasicConsumeOk {
        consumer_tag: String,
    },
    BasicCancel {
        consumer_tag: String,
        nowait: bool,
    },
    BasicCancelOk {
        consumer_tag: String,
    },
    BasicPublish {
        exchange: String,
        routing_key: String,
        mandatory: bool,
        immediate: bool,
    },
    BasicReturn {
        reply_code: u16,
        reply_text: String,
        exchange: String,
        routing_key: String,
    },
    BasicDeliver {
        consumer_tag: String,
        delivery_tag: u64,
        redelivered: bool,
        exchange: String,
        routing_key: String,
    },
    BasicGet {
        queue: String,
        no_ack: bool,
    },
    BasicGetOk {
        delivery_tag: u64,
        redelivered: bool,
        exchange: String,
        routing_key: String,
        message_count: u32,
    },
    BasicGetEmpty,
    BasicAck {
        delivery_tag: u64,
        multiple: bool,
    },
    BasicReject {
        delivery_tag: u64,
        requeue: bool,
    },
    BasicRecoverAsync {
        requeue: bool,
    },
    BasicRecover {
        requeue: bool,
    },
    BasicRecoverOk,
    BasicNack {
        delivery_tag: u64,
        multiple: bool,
        requeue: bool,
    },

    // confirm (85)
    ConfirmSelect {
        nowait: bool,
    },
    ConfirmSelectOk,
}

impl Method {
    /// The AMQP class id of this method.
    pub fn class_id(&self) -> u16 {
        use Method::*;
        match self {
            ChannelOpen | ChannelOpenOk | ChannelFlow { .. } | ChannelFlowOk { .. }
            | ChannelClose { .. } | ChannelCloseOk => CLASS_CHANNEL,
            ExchangeDeclare { .. } | ExchangeDeclareOk | ExchangeDelete { .. }
            | ExchangeDeleteOk | ExchangeBind { .. } | ExchangeBindOk | ExchangeUnbind { .. }
            | ExchangeUnbindOk => CLASS_EXCHANGE,
            QueueDeclare { .. } | QueueDeclareOk { .. } | QueueBind { .. } | QueueBindOk
            | QueuePurge { .. } | QueuePurgeOk { .. } | QueueDelete { .. }
            | QueueDeleteOk { .. } | QueueUnbind { .. } | QueueUnbindOk => CLASS_QUEUE,
            BasicQos { .. } | BasicQosOk | BasicConsume { .. } | BasicConsumeOk { .. }
            | BasicCancel { .. } | BasicCancelOk { .. } | BasicPublish { .. }
            | BasicReturn { .. } | BasicDeliver { .. } | BasicGet { .. } | BasicGetOk { .. }
            | BasicGetEmpty | BasicAck { .. } | BasicReject { .. } | BasicRecoverAsync { .. }
            | BasicRecover { .. } | BasicRecoverOk | BasicNack { .. } => CLASS_BASIC,
            ConfirmSelect { .. } | ConfirmSelectOk => CLASS_CONFIRM,
        }
    }

    /// The AMQP method id of this method within its class.
    pub fn method_id(&self) -> u16 {
        use Method::*;
        match self {
            ChannelOpen => 10,
            ChannelOpenOk => 11,
            ChannelFlow { .. } => 20,
            ChannelFlowOk { .. } => 21,
            ChannelClose { .. } => 40,
            ChannelCloseOk => 41,

            ExchangeDeclare { .. } => 10,
            ExchangeDeclareOk => 11,
            ExchangeDelete { .. } => 20,
            ExchangeDeleteOk => 21,
            ExchangeBind { .. } => 30,
            ExchangeBindOk => 31,
            ExchangeUnbind { .. } => 40,
            ExchangeUnbindOk => 51,

            QueueDeclare { .. } => 10,
            QueueDeclareOk { .. } => 11,
            QueueBind { .. } => 20,
            QueueBindOk => 21,
            QueuePurge { .. } => 30,
            QueuePurgeOk { .. } => 31,
            QueueDelete { .. } => 40,
            QueueDeleteOk { .. } => 41,
            QueueUnbind { .. } => 50,
            QueueUnbindOk => 51,

            BasicQos { .. } => 10,
            BasicQosOk => 11,
            BasicConsume { .. } => 20,
            BasicConsumeOk { .. } => 21,
            BasicCancel { .. } => 30,
            BasicCancelOk { .. } => 31,
            BasicPublish { .. } => 40,
            BasicReturn { .. } => 50,
            BasicDeliver { .. } => 60,
            BasicGet { .. } => 70,
            BasicGetOk { .. } => 71,
            BasicGetEmpty => 72,
            BasicAck { .. } => 80,
            BasicReject { .. } => 90,
            BasicRecoverAsync { .. } => 100,
            BasicRecover { .. } => 110,
            BasicRecoverOk => 111,
            BasicNack { .. } => 120,

            ConfirmSelect { .. } => 10,
            ConfirmSelectOk => 11,
        }
    }
}
