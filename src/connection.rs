//! The downward contract between a channel and its connection
//!
//! Frame            Connection  Channel
//! ===================================
//! byte codec           H
//! demultiplexing       H
//! method dispatch                 H
//! content assembly                H
//! rpc correlation                 H
//! ----------------------------------
//! Key:
//!     H: handled by that layer
//!
//! The connection owns the socket, the handshake and the byte-level codec; the
//! channel hands it typed frames and pulls typed frames back. Implementations
//! live outside this crate; the test suite drives the channel through a mock.

use async_trait::async_trait;

use crate::error::Result;
use crate::frame::{ContentHeader, Frame, Method};
use crate::Payload;

/// Services a connection provides to every channel multiplexed on it.
///
/// Writes are buffered: nothing is guaranteed to reach the socket until
/// [`drain`](Connection::drain) completes. The channel relies on this to batch
/// the method, header and body frames of one publish into a single flush.
#[async_trait]
pub trait Connection: std::fmt::Debug + Send + Sync + 'static {
    /// Asserts that the connection is still usable.
    fn ensure_open(&self) -> Result<()>;

    /// The `frame_max` negotiated with the server; 0 means unlimited.
    fn server_frame_max(&self) -> u32;

    /// Returns a channel id to the connection's allocator on teardown.
    fn release_channel_id(&self, channel_id: u16);

    /// Serializes one method frame into the output buffer.
    async fn write_method_frame(&self, channel_id: u16, method: Method) -> Result<()>;

    /// Serializes a content header followed by the given, already fragmented,
    /// body frames into the output buffer.
    async fn write_content(
        &self,
        channel_id: u16,
        header: ContentHeader,
        body: Vec<Payload>,
    ) -> Result<()>;

    /// Flushes the output buffer to the socket.
    async fn drain(&self) -> Result<()>;

    /// Pulls the next inbound frame belonging to `channel_id`.
    ///
    /// The connection's reader loop owns demultiplexing and guarantees
    /// per-channel ordering. The channel calls this while assembling
    /// multi-frame content.
    async fn next_frame(&self, channel_id: u16) -> Result<Frame>;
}
