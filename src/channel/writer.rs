//! Outbound frame writing
//!
//! Single methods are written and drained in one step. A publish batches its
//! method, header and body fragments into the connection's output buffer and
//! drains once at the end. Synchronous methods go through
//! [`Channel::rpc_call`], which registers the completion before the write and
//! rolls the registration back if the write fails.

use tokio::sync::oneshot;
use tracing::trace;

use crate::error::{Error, Result};
use crate::frame::{ContentHeader, Method, CLASS_BASIC};
use crate::options::BasicPublishOptions;
use crate::rpc::{Correlator, RpcKey, RpcReply, RpcResult};
use crate::types::BasicProperties;
use crate::Payload;

use super::Channel;

/// Removes an RPC registration that its caller abandoned mid-suspend, so the
/// correlator does not keep a completion nobody will consume.
struct AbandonGuard<'a> {
    rpc: &'a Correlator,
    key: RpcKey,
    armed: bool,
}

impl<'a> AbandonGuard<'a> {
    fn new(rpc: &'a Correlator, key: RpcKey) -> Self {
        Self {
            rpc,
            key,
            armed: true,
        }
    }

    /// Call once the completion has been consumed (resolved, failed or rolled
    /// back); the guard must not touch a successor registration under the
    /// same key.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.rpc.forget(self.key);
        }
    }
}

impl Channel {
    /// Writes one method frame.
    ///
    /// `check_open` is skipped by the open and close handshakes, which run
    /// outside the open state by nature.
    pub(crate) async fn write_method(&self, method: Method, check_open: bool) -> Result<()> {
        self.connection().ensure_open()?;
        if check_open && !self.is_open() {
            return Err(Error::closed());
        }
        trace!(
            channel = self.id(),
            class = method.class_id(),
            method = method.method_id(),
            "writing method frame"
        );
        self.connection().write_method_frame(self.id(), method).await
    }

    /// Writes one method frame and flushes it.
    pub(crate) async fn send_method(&self, method: Method, check_open: bool) -> Result<()> {
        self.write_method(method, check_open).await?;
        self.connection().drain().await
    }

    /// The write-with-response protocol: registers the completion under
    /// `key`, writes and flushes the method frame, then suspends until the
    /// dispatcher resolves the completion.
    ///
    /// A failed write rolls the registration back before the error surfaces;
    /// an abandoned call removes it on drop.
    pub(crate) async fn rpc_call(
        &self,
        key: RpcKey,
        method: Method,
        check_open: bool,
    ) -> Result<RpcReply> {
        let rx = self.rpc().register(key)?;
        let mut guard = AbandonGuard::new(self.rpc(), key);
        self.send_method(method, check_open).await?;
        let result = rx.await;
        guard.disarm();
        match result {
            Ok(reply) => reply,
            // Completion dropped without a verdict: the channel state was
            // torn out from under us.
            Err(_) => Err(Error::closed()),
        }
    }

    /// Writes the method, header and body frames of one publish with a single
    /// drain at the end, registering the per-tag confirm completion first
    /// when publisher confirms are enabled.
    ///
    /// Returns the consumed delivery tag and the confirm completion, both
    /// `None` when confirms are off.
    pub(crate) async fn publish_frames(
        &self,
        exchange: &str,
        routing_key: &str,
        options: BasicPublishOptions,
        payload: Payload,
        properties: BasicProperties,
    ) -> Result<(Option<u64>, Option<oneshot::Receiver<RpcResult>>)> {
        let registration = match self.next_delivery_tag() {
            Some(tag) => Some((tag, self.rpc().register(RpcKey::PublishConfirm(tag))?)),
            None => None,
        };

        let method = Method::BasicPublish {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            mandatory: options.mandatory,
            immediate: options.immediate,
        };
        let header = ContentHeader {
            class_id: CLASS_BASIC,
            body_size: payload.len() as u64,
            properties,
        };
        let fragments = fragment_payload(&payload, self.connection().server_frame_max());
        trace!(
            channel = self.id(),
            body_size = payload.len(),
            fragments = fragments.len(),
            "publishing"
        );

        let written = async {
            self.write_method(method, true).await?;
            self.connection()
                .write_content(self.id(), header, fragments)
                .await?;
            self.connection().drain().await
        }
        .await;

        if let Err(err) = written {
            if let Some((tag, _)) = &registration {
                self.rpc().forget(RpcKey::PublishConfirm(*tag));
            }
            return Err(err);
        }

        match registration {
            Some((tag, rx)) => Ok((Some(tag), Some(rx))),
            None => Ok((None, None)),
        }
    }
}

/// Splits a payload into body-frame fragments of at most `frame_max` bytes.
///
/// `frame_max == 0` means the limit is unknown or unlimited and the whole
/// payload goes out as one body frame. An empty payload produces no body
/// frames, only the header.
pub(crate) fn fragment_payload(payload: &Payload, frame_max: u32) -> Vec<Payload> {
    if payload.is_empty() {
        return Vec::new();
    }
    if frame_max == 0 {
        return vec![payload.clone()];
    }
    let max = frame_max as usize;
    let mut fragments = Vec::with_capacity(payload.len().div_ceil(max));
    let mut offset = 0;
    while offset < payload.len() {
        let end = usize::min(offset + max, payload.len());
        fragments.push(payload.slice(offset..end));
        offset = end;
    }
    fragments
}
