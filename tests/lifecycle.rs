//! Channel lifecycle: open/close handshakes, server-initiated close,
//! connection teardown and flow control.

mod common;

use std::time::Duration;

use tokio_test::{assert_pending, assert_ready, task};

use common::{open_channel, MockConnection, WireEvent};
use fe3o4_amqp::options::QueueDeclareOptions;
use fe3o4_amqp::{Channel, ChannelState, Error, FieldTable, Frame, Method};

#[tokio::test]
async fn open_transitions_the_channel_to_open() {
    let conn = MockConnection::new();
    let channel = Channel::new(1, conn.clone());
    assert_eq!(channel.state(), ChannelState::Opening);
    assert!(!channel.is_open());

    let (opened, _) = tokio::join!(channel.open(), async {
        channel
            .dispatch_frame(Frame::Method(Method::ChannelOpenOk))
            .await
            .unwrap();
    });
    opened.unwrap();

    assert_eq!(channel.state(), ChannelState::Open);
    assert_eq!(
        conn.methods_written(),
        vec![Method::ChannelOpen],
        "open writes exactly the channel.open method"
    );
}

#[tokio::test]
async fn close_handshake_releases_the_channel_id() {
    let conn = MockConnection::new();
    let channel = open_channel(&conn).await;

    let (closed, _) = tokio::join!(channel.close(200, "bye"), async {
        channel
            .dispatch_frame(Frame::Method(Method::ChannelCloseOk))
            .await
            .unwrap();
    });
    closed.unwrap();

    assert_eq!(channel.state(), ChannelState::Closed);
    assert_eq!(conn.released(), vec![1]);
    match &conn.methods_written()[..] {
        [Method::ChannelClose {
            reply_code,
            reply_text,
            ..
        }] => {
            assert_eq!(*reply_code, 200);
            assert_eq!(reply_text, "bye");
        }
        other => panic!("unexpected methods written: {other:?}"),
    }
}

#[tokio::test]
async fn closing_twice_fails_with_a_distinct_error() {
    let conn = MockConnection::new();
    let channel = open_channel(&conn).await;

    let mut first = task::spawn(channel.close(200, "bye"));
    assert_pending!(first.poll());

    // Channel is now closing; a second close must not start another handshake.
    let err = channel.close(200, "again").await.unwrap_err();
    assert!(matches!(err, Error::AlreadyClosing));

    channel
        .dispatch_frame(Frame::Method(Method::ChannelCloseOk))
        .await
        .unwrap();
    assert!(first.is_woken());
    assert_ready!(first.poll()).unwrap();

    // And a third close on the now-closed channel fails the same way.
    let err = channel.close(200, "and again").await.unwrap_err();
    assert!(matches!(err, Error::AlreadyClosing));
}

#[tokio::test]
async fn server_close_fails_pending_rpcs_and_replies_close_ok() {
    let conn = MockConnection::new();
    let channel = open_channel(&conn).await;

    let mut declare = task::spawn(channel.queue_declare(
        "missing",
        QueueDeclareOptions::default(),
        FieldTable::new(),
    ));
    assert_pending!(declare.poll());
    conn.take_written();

    channel
        .dispatch_frame(Frame::Method(Method::ChannelClose {
            reply_code: 404,
            reply_text: "NOT_FOUND".to_string(),
            class_id: 50,
            method_id: 10,
        }))
        .await
        .unwrap();

    // close-ok goes out first
    assert_eq!(
        conn.written(),
        vec![
            WireEvent::Frame(1, Frame::Method(Method::ChannelCloseOk)),
            WireEvent::Drain,
        ]
    );

    // the pending declare fails with the server's code and reason
    assert!(declare.is_woken());
    let err = assert_ready!(declare.poll()).unwrap_err();
    match err {
        Error::ChannelClosed(Some(reason)) => {
            assert_eq!(reason.code, 404);
            assert_eq!(reason.text, "NOT_FOUND");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(channel.state(), ChannelState::Closed);
    assert_eq!(conn.released(), vec![1]);
    assert_eq!(channel.pending_rpc_count(), 0);
}

#[tokio::test]
async fn connection_closed_fails_every_unresolved_completion() {
    let conn = MockConnection::new();
    let channel = open_channel(&conn).await;

    let mut declare = task::spawn(channel.queue_declare(
        "q",
        QueueDeclareOptions::default(),
        FieldTable::new(),
    ));
    assert_pending!(declare.poll());

    channel.connection_closed(Some(320), Some("CONNECTION_FORCED"), None);

    let err = assert_ready!(declare.poll()).unwrap_err();
    match err {
        Error::ChannelClosed(Some(reason)) => {
            assert_eq!(reason.code, 320);
            assert_eq!(reason.text, "CONNECTION_FORCED");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(channel.state(), ChannelState::Closed);
    assert_eq!(channel.pending_rpc_count(), 0);
}

#[tokio::test]
async fn on_closed_resolves_when_the_channel_closes() {
    let conn = MockConnection::new();
    let channel = open_channel(&conn).await;

    let waiter = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.on_closed().await })
    };

    channel.connection_closed(None, None, None);
    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("closed signal was not raised")
        .unwrap();
}

#[tokio::test]
async fn flow_resolves_with_the_echoed_active_flag() {
    let conn = MockConnection::new();
    let channel = open_channel(&conn).await;

    let (paused, _) = tokio::join!(channel.flow(false), async {
        channel
            .dispatch_frame(Frame::Method(Method::ChannelFlowOk { active: false }))
            .await
            .unwrap();
    });
    assert!(!paused.unwrap());
    // Flow reporting is independent of the closed signal.
    assert!(channel.is_open());
}

#[tokio::test]
async fn unhandled_inbound_method_is_not_implemented_and_terminal() {
    let conn = MockConnection::new();
    let channel = open_channel(&conn).await;

    // channel.open is client-to-server only; receiving it is a protocol error
    let err = channel
        .dispatch_frame(Frame::Method(Method::ChannelOpen))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotImplemented(20, 10)));
    assert_eq!(channel.state(), ChannelState::Closed);
}

#[tokio::test]
async fn stray_content_frame_is_terminal() {
    let conn = MockConnection::new();
    let channel = open_channel(&conn).await;

    let err = channel
        .dispatch_frame(common::content_header(4))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnexpectedFrame(_)));
    assert_eq!(channel.state(), ChannelState::Closed);
}
