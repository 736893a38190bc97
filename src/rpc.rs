//! RPC correlation between suspended callers and the dispatch path
//!
//! AMQP 0-9-1 allows at most one synchronous method per class/method pair to
//! be outstanding on a channel, so completions are keyed by method name
//! rather than by a correlation id. Publisher confirms are the exception and
//! key per delivery tag.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::message::{GetMessage, Queue};

/// Key naming one in-flight synchronous conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum RpcKey {
    Open,
    Close,
    Flow,
    ExchangeDeclare,
    ExchangeDelete,
    ExchangeBind,
    ExchangeUnbind,
    QueueDeclare,
    QueueBind,
    QueueUnbind,
    QueuePurge,
    QueueDelete,
    BasicQos,
    BasicConsume,
    BasicCancel,
    BasicGet,
    BasicRecover,
    ConfirmSelect,
    /// One pending broker confirm per published delivery tag.
    PublishConfirm(u64),
}

impl fmt::Display for RpcKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcKey::Open => write!(f, "channel.open"),
            RpcKey::Close => write!(f, "channel.close"),
            RpcKey::Flow => write!(f, "channel.flow"),
            RpcKey::ExchangeDeclare => write!(f, "exchange.declare"),
            RpcKey::ExchangeDelete => write!(f, "exchange.delete"),
            RpcKey::ExchangeBind => write!(f, "exchange.bind"),
            RpcKey::ExchangeUnbind => write!(f, "exchange.unbind"),
            RpcKey::QueueDeclare => write!(f, "queue.declare"),
            RpcKey::QueueBind => write!(f, "queue.bind"),
            RpcKey::QueueUnbind => write!(f, "queue.unbind"),
            RpcKey::QueuePurge => write!(f, "queue.purge"),
            RpcKey::QueueDelete => write!(f, "queue.delete"),
            RpcKey::BasicQos => write!(f, "basic.qos"),
            RpcKey::BasicConsume => write!(f, "basic.consume"),
            RpcKey::BasicCancel => write!(f, "basic.cancel"),
            RpcKey::BasicGet => write!(f, "basic.get"),
            RpcKey::BasicRecover => write!(f, "basic.recover"),
            RpcKey::ConfirmSelect => write!(f, "confirm.select"),
            RpcKey::PublishConfirm(tag) => write!(f, "publish confirm for tag {tag}"),
        }
    }
}

/// Decoded payload of a `*.Ok` reply, delivered through the completion.
#[derive(Debug)]
pub(crate) enum RpcReply {
    Unit,
    Flow { active: bool },
    QueueDeclare(Queue),
    QueuePurge { message_count: u32 },
    BasicConsume { consumer_tag: String },
    BasicCancel { consumer_tag: String },
    BasicGet(Box<GetMessage>),
}

pub(crate) type RpcResult = Result<RpcReply>;

/// Maps in-flight RPC keys to their single-shot completions.
///
/// The mutex makes registration and resolution atomic with respect to the
/// dispatch path; it is never held across a suspension point.
#[derive(Debug, Default)]
pub(crate) struct Correlator {
    pending: Mutex<HashMap<RpcKey, oneshot::Sender<RpcResult>>>,
}

impl Correlator {
    /// Allocates the completion for `key`.
    ///
    /// Fails with a synchronization error if the key is already in flight;
    /// per-method mutual exclusion falls out of this.
    pub fn register(&self, key: RpcKey) -> Result<oneshot::Receiver<RpcResult>> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock();
        if pending.contains_key(&key) {
            return Err(Error::Synchronization(format!(
                "a waiter for {key} is already registered"
            )));
        }
        pending.insert(key, tx);
        Ok(rx)
    }

    /// Pops the completion for `key` and resolves it with `reply`.
    pub fn resolve(&self, key: RpcKey, reply: RpcReply) -> Result<()> {
        self.complete(key, Ok(reply))
    }

    /// Pops the completion for `key` and fails it with `error`.
    pub fn fail(&self, key: RpcKey, error: Error) -> Result<()> {
        self.complete(key, Err(error))
    }

    fn complete(&self, key: RpcKey, result: RpcResult) -> Result<()> {
        let tx = self.pending.lock().remove(&key).ok_or_else(|| {
            Error::Synchronization(format!("no waiter registered for {key}"))
        })?;
        // The caller may have abandoned the RPC; the popped entry is dropped
        // either way.
        let _ = tx.send(result);
        Ok(())
    }

    /// Removes a registration without completing it, if still present.
    ///
    /// Used to roll back after a failed write and by the abandon guard.
    pub fn forget(&self, key: RpcKey) {
        self.pending.lock().remove(&key);
    }

    /// Fails every pending completion with a clone of `error`.
    pub fn fail_all(&self, error: &Error) {
        let drained: Vec<_> = {
            let mut pending = self.pending.lock();
            pending.drain().collect()
        };
        for (key, tx) in drained {
            tracing::debug!(%key, "failing pending rpc on channel teardown");
            let _ = tx.send(Err(error.clone()));
        }
    }

    /// Completes every pending `PublishConfirm(t)` with `t <= tag`.
    ///
    /// Used for `basic.ack`/`basic.nack` with the `multiple` bit set; a tag
    /// already resolved is simply absent and not an error.
    pub fn complete_confirms_up_to(&self, tag: u64, result: impl Fn(u64) -> RpcResult) {
        let swept: Vec<_> = {
            let mut pending = self.pending.lock();
            let keys: Vec<RpcKey> = pending
                .keys()
                .filter(|key| matches!(key, RpcKey::PublishConfirm(t) if *t <= tag))
                .copied()
                .collect();
            keys.into_iter()
                .filter_map(|key| pending.remove(&key).map(|tx| (key, tx)))
                .collect()
        };
        for (key, tx) in swept {
            if let RpcKey::PublishConfirm(t) = key {
                let _ = tx.send(result(t));
            }
        }
    }

    /// Number of in-flight completions.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }
}
