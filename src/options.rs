//! Per-operation flag sets
//!
//! Every synchronous class method takes its AMQP flags as one `Default`-able
//! struct, so call sites only spell out the flags they set.

/// Flags for `exchange_declare`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeDeclareOptions {
    /// Check for existence without creating.
    pub passive: bool,
    /// Survive broker restarts.
    pub durable: bool,
    /// Delete when the last queue unbinds.
    pub auto_delete: bool,
    /// Not directly publishable; only bindable from other exchanges.
    pub internal: bool,
    /// Do not wait for `exchange.declare-ok`.
    pub nowait: bool,
}

/// Flags for `exchange_delete`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeDeleteOptions {
    /// Only delete if the exchange has no bindings.
    pub if_unused: bool,
    /// Do not wait for `exchange.delete-ok`.
    pub nowait: bool,
}

/// Flags for `exchange_bind`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeBindOptions {
    /// Do not wait for `exchange.bind-ok`.
    pub nowait: bool,
}

/// Flags for `exchange_unbind`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeUnbindOptions {
    /// Do not wait for `exchange.unbind-ok`.
    pub nowait: bool,
}

/// Flags for `queue_declare`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDeclareOptions {
    /// Check for existence without creating.
    pub passive: bool,
    /// Survive broker restarts.
    pub durable: bool,
    /// Only accessible from this connection; deleted when it closes.
    pub exclusive: bool,
    /// Delete when the last consumer cancels.
    pub auto_delete: bool,
    /// Do not wait for `queue.declare-ok`.
    pub nowait: bool,
}

/// Flags for `queue_bind`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueBindOptions {
    /// Do not wait for `queue.bind-ok`.
    pub nowait: bool,
}

/// Flags for `queue_purge`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueuePurgeOptions {
    /// Do not wait for `queue.purge-ok`.
    pub nowait: bool,
}

/// Flags for `queue_delete`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDeleteOptions {
    /// Only delete if the queue has no consumers.
    pub if_unused: bool,
    /// Only delete if the queue has no messages.
    pub if_empty: bool,
    /// Do not wait for `queue.delete-ok`.
    pub nowait: bool,
}

/// Flags for `basic_qos`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BasicQosOptions {
    /// Prefetch window in octets, 0 for unlimited.
    pub prefetch_size: u32,
    /// Prefetch window in whole messages, 0 for unlimited.
    pub prefetch_count: u16,
    /// Apply per-channel rather than per-consumer.
    pub global: bool,
}

/// Flags for `basic_consume`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BasicConsumeOptions {
    /// Do not deliver messages published on this connection.
    pub no_local: bool,
    /// The server does not expect acknowledgements.
    pub no_ack: bool,
    /// Request exclusive consumer access to the queue.
    pub exclusive: bool,
    /// Do not wait for `basic.consume-ok`.
    pub nowait: bool,
}

/// Flags for `basic_cancel`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BasicCancelOptions {
    /// Do not wait for `basic.cancel-ok`.
    pub nowait: bool,
}

/// Flags for `basic_publish`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BasicPublishOptions {
    /// Return the message if it cannot be routed to a queue.
    pub mandatory: bool,
    /// Return the message if it cannot be delivered immediately.
    pub immediate: bool,
}

/// Flags for `basic_get`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BasicGetOptions {
    /// The server does not expect an acknowledgement.
    pub no_ack: bool,
}

/// Flags for `basic_client_ack`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BasicAckOptions {
    /// Acknowledge all unacknowledged deliveries up to this tag.
    pub multiple: bool,
}

/// Flags for `basic_client_nack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicNackOptions {
    /// Reject all unacknowledged deliveries up to this tag.
    pub multiple: bool,
    /// Ask the server to requeue the rejected message.
    pub requeue: bool,
}

impl Default for BasicNackOptions {
    fn default() -> Self {
        Self {
            multiple: false,
            requeue: true,
        }
    }
}

/// Flags for `basic_reject`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BasicRejectOptions {
    /// Ask the server to requeue the rejected message.
    pub requeue: bool,
}

/// Flags for `basic_recover` and `basic_recover_async`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicRecoverOptions {
    /// Requeue unacknowledged deliveries instead of redelivering them to the
    /// original recipient.
    pub requeue: bool,
}

impl Default for BasicRecoverOptions {
    fn default() -> Self {
        Self { requeue: true }
    }
}

/// Flags for `confirm_select`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfirmSelectOptions {
    /// Do not wait for `confirm.select-ok`.
    pub nowait: bool,
}
