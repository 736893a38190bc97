#![allow(dead_code)]

//! Mock connection driving the channel under test.
//!
//! Records every write-side event (frames and drains) and feeds injected
//! inbound frames to `next_frame`, the way the real connection's
//! demultiplexer would.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use fe3o4_amqp::{
    BasicProperties, Channel, Connection, ContentHeader, Error, Frame, Method, Payload, Result,
};

/// One recorded write-side event.
#[derive(Debug, Clone, PartialEq)]
pub enum WireEvent {
    Frame(u16, Frame),
    Drain,
}

#[derive(Debug, Default)]
pub struct MockConnection {
    written: Mutex<Vec<WireEvent>>,
    inbound: Mutex<VecDeque<Frame>>,
    inbound_ready: Notify,
    frame_max: u32,
    connection_closed: AtomicBool,
    fail_writes: AtomicBool,
    released: Mutex<Vec<u16>>,
}

impl MockConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_frame_max(frame_max: u32) -> Arc<Self> {
        Arc::new(Self {
            frame_max,
            ..Self::default()
        })
    }

    /// Queues an inbound frame for `next_frame`.
    pub fn feed(&self, frame: Frame) {
        self.inbound.lock().push_back(frame);
        self.inbound_ready.notify_one();
    }

    /// Everything written so far, in order.
    pub fn written(&self) -> Vec<WireEvent> {
        self.written.lock().clone()
    }

    /// Drains and returns everything written so far.
    pub fn take_written(&self) -> Vec<WireEvent> {
        std::mem::take(&mut *self.written.lock())
    }

    /// The method frames written so far, in order.
    pub fn methods_written(&self) -> Vec<Method> {
        self.written()
            .into_iter()
            .filter_map(|event| match event {
                WireEvent::Frame(_, Frame::Method(method)) => Some(method),
                _ => None,
            })
            .collect()
    }

    /// Channel ids handed back to the allocator.
    pub fn released(&self) -> Vec<u16> {
        self.released.lock().clone()
    }

    /// Makes every subsequent write fail with an I/O error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes `ensure_open` report the connection as gone.
    pub fn close(&self) {
        self.connection_closed.store(true, Ordering::SeqCst);
    }

    fn record(&self, event: WireEvent) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "mock write failure").into());
        }
        self.written.lock().push(event);
        Ok(())
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn ensure_open(&self) -> Result<()> {
        if self.connection_closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }

    fn server_frame_max(&self) -> u32 {
        self.frame_max
    }

    fn release_channel_id(&self, channel_id: u16) {
        self.released.lock().push(channel_id);
    }

    async fn write_method_frame(&self, channel_id: u16, method: Method) -> Result<()> {
        self.record(WireEvent::Frame(channel_id, Frame::Method(method)))
    }

    async fn write_content(
        &self,
        channel_id: u16,
        header: ContentHeader,
        body: Vec<Payload>,
    ) -> Result<()> {
        self.record(WireEvent::Frame(channel_id, Frame::Header(header)))?;
        for fragment in body {
            self.record(WireEvent::Frame(channel_id, Frame::Body(fragment)))?;
        }
        Ok(())
    }

    async fn drain(&self) -> Result<()> {
        self.record(WireEvent::Drain)
    }

    async fn next_frame(&self, _channel_id: u16) -> Result<Frame> {
        loop {
            let ready = self.inbound_ready.notified();
            if let Some(frame) = self.inbound.lock().pop_front() {
                return Ok(frame);
            }
            ready.await;
        }
    }
}

/// Creates channel 1 on `conn` and completes its open handshake.
pub async fn open_channel(conn: &Arc<MockConnection>) -> Channel {
    let channel = Channel::new(1, conn.clone());
    let (opened, _) = tokio::join!(channel.open(), async {
        channel
            .dispatch_frame(Frame::Method(Method::ChannelOpenOk))
            .await
            .unwrap();
    });
    opened.unwrap();
    conn.take_written();
    channel
}

/// A `basic.deliver` method frame.
pub fn deliver_method(consumer_tag: &str, delivery_tag: u64) -> Frame {
    Frame::Method(Method::BasicDeliver {
        consumer_tag: consumer_tag.to_string(),
        delivery_tag,
        redelivered: false,
        exchange: "ex".to_string(),
        routing_key: "rk".to_string(),
    })
}

/// A content header frame for a basic-class message.
pub fn content_header(body_size: u64) -> Frame {
    Frame::Header(ContentHeader {
        class_id: 60,
        body_size,
        properties: BasicProperties::default(),
    })
}

/// A content body frame.
pub fn content_body(bytes: &'static [u8]) -> Frame {
    Frame::Body(Payload::from_static(bytes))
}

/// Polls `condition` until it holds, panicking after two seconds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition was not reached in time")
}
