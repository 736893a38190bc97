//! Queue, exchange and basic-class request/response wrappers.

mod common;

use tokio_test::{assert_pending, assert_ready, task};

use common::{content_body, content_header, open_channel, MockConnection, WireEvent};
use fe3o4_amqp::options::*;
use fe3o4_amqp::{
    Channel, ChannelState, Error, ExchangeKind, FieldTable, FieldValue, Frame, Method, Payload,
};

#[tokio::test]
async fn declare_and_delete_queue() {
    let conn = MockConnection::new();
    let channel = open_channel(&conn).await;

    let (declared, _) = tokio::join!(
        channel.queue_declare("q", QueueDeclareOptions::default(), FieldTable::new()),
        async {
            channel
                .dispatch_frame(Frame::Method(Method::QueueDeclareOk {
                    queue: "q".to_string(),
                    message_count: 0,
                    consumer_count: 0,
                }))
                .await
                .unwrap();
        }
    );
    let queue = declared.unwrap();
    assert_eq!(queue.name, "q");
    assert_eq!(queue.message_count, 0);
    assert_eq!(queue.consumer_count, 0);

    let (deleted, _) = tokio::join!(
        channel.queue_delete("q", QueueDeleteOptions::default()),
        async {
            channel
                .dispatch_frame(Frame::Method(Method::QueueDeleteOk { message_count: 0 }))
                .await
                .unwrap();
        }
    );
    deleted.unwrap();
    assert!(channel.is_open());
    assert_eq!(channel.pending_rpc_count(), 0);
}

#[tokio::test]
async fn queue_purge_resolves_with_the_message_count() {
    let conn = MockConnection::new();
    let channel = open_channel(&conn).await;

    let (purged, _) = tokio::join!(
        channel.queue_purge("q", QueuePurgeOptions::default()),
        async {
            channel
                .dispatch_frame(Frame::Method(Method::QueuePurgeOk { message_count: 7 }))
                .await
                .unwrap();
        }
    );
    assert_eq!(purged.unwrap(), 7);
}

#[tokio::test]
async fn nowait_operations_skip_the_completion() {
    let conn = MockConnection::new();
    let channel = open_channel(&conn).await;

    let queue = channel
        .queue_declare(
            "q",
            QueueDeclareOptions {
                nowait: true,
                ..Default::default()
            },
            FieldTable::new(),
        )
        .await
        .unwrap();
    assert_eq!(queue.name, "q");
    assert_eq!(channel.pending_rpc_count(), 0);

    channel
        .exchange_declare(
            "ex",
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                nowait: true,
                ..Default::default()
            },
            FieldTable::new(),
        )
        .await
        .unwrap();
    assert_eq!(channel.pending_rpc_count(), 0);

    // both methods were flushed straight out
    assert_eq!(
        conn.written()
            .iter()
            .filter(|event| matches!(event, WireEvent::Drain))
            .count(),
        2
    );
}

#[tokio::test]
async fn exchange_declare_carries_kind_and_arguments() {
    let conn = MockConnection::new();
    let channel = open_channel(&conn).await;

    let mut arguments = FieldTable::new();
    arguments.insert("alternate-exchange".to_string(), FieldValue::from("alt"));

    let (declared, _) = tokio::join!(
        channel.exchange_declare(
            "logs",
            ExchangeKind::Fanout,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            arguments.clone(),
        ),
        async {
            channel
                .dispatch_frame(Frame::Method(Method::ExchangeDeclareOk))
                .await
                .unwrap();
        }
    );
    declared.unwrap();

    match &conn.methods_written()[..] {
        [Method::ExchangeDeclare {
            exchange,
            kind,
            durable,
            arguments: written,
            ..
        }] => {
            assert_eq!(exchange, "logs");
            assert_eq!(kind, "fanout");
            assert!(*durable);
            assert_eq!(written, &arguments);
        }
        other => panic!("unexpected methods written: {other:?}"),
    }
}

#[tokio::test]
async fn bind_and_unbind_round_trips() {
    let conn = MockConnection::new();
    let channel = open_channel(&conn).await;

    let (bound, _) = tokio::join!(
        channel.queue_bind("q", "ex", "rk", QueueBindOptions::default(), FieldTable::new()),
        async {
            channel
                .dispatch_frame(Frame::Method(Method::QueueBindOk))
                .await
                .unwrap();
        }
    );
    bound.unwrap();

    let (unbound, _) = tokio::join!(
        channel.queue_unbind("q", "ex", "rk", FieldTable::new()),
        async {
            channel
                .dispatch_frame(Frame::Method(Method::QueueUnbindOk))
                .await
                .unwrap();
        }
    );
    unbound.unwrap();

    let (ex_bound, _) = tokio::join!(
        channel.exchange_bind(
            "dst",
            "src",
            "rk",
            ExchangeBindOptions::default(),
            FieldTable::new()
        ),
        async {
            channel
                .dispatch_frame(Frame::Method(Method::ExchangeBindOk))
                .await
                .unwrap();
        }
    );
    ex_bound.unwrap();
}

#[tokio::test]
async fn basic_qos_and_recover_complete() {
    let conn = MockConnection::new();
    let channel = open_channel(&conn).await;

    let (qos, _) = tokio::join!(
        channel.basic_qos(BasicQosOptions {
            prefetch_count: 10,
            ..Default::default()
        }),
        async {
            channel
                .dispatch_frame(Frame::Method(Method::BasicQosOk))
                .await
                .unwrap();
        }
    );
    qos.unwrap();

    let (recovered, _) = tokio::join!(channel.basic_recover(BasicRecoverOptions::default()), async {
        channel
            .dispatch_frame(Frame::Method(Method::BasicRecoverOk))
            .await
            .unwrap();
    });
    recovered.unwrap();
}

#[tokio::test]
async fn basic_get_assembles_the_pulled_message() {
    let conn = MockConnection::new();
    let channel = open_channel(&conn).await;

    // the get-ok's content follows it in the per-channel frame stream
    conn.feed(content_header(10));
    conn.feed(content_body(b"hello"));
    conn.feed(content_body(b"world"));

    let (got, _) = tokio::join!(channel.basic_get("q", BasicGetOptions::default()), async {
        channel
            .dispatch_frame(Frame::Method(Method::BasicGetOk {
                delivery_tag: 3,
                redelivered: true,
                exchange: "ex".to_string(),
                routing_key: "rk".to_string(),
                message_count: 1,
            }))
            .await
            .unwrap();
    });
    let message = got.unwrap();
    assert_eq!(message.delivery_tag, 3);
    assert!(message.redelivered);
    assert_eq!(message.exchange, "ex");
    assert_eq!(message.routing_key, "rk");
    assert_eq!(message.message_count, 1);
    assert_eq!(message.body, Payload::from_static(b"helloworld"));
}

#[tokio::test]
async fn basic_get_on_an_empty_queue_fails() {
    let conn = MockConnection::new();
    let channel = open_channel(&conn).await;

    let (got, _) = tokio::join!(channel.basic_get("q", BasicGetOptions::default()), async {
        channel
            .dispatch_frame(Frame::Method(Method::BasicGetEmpty))
            .await
            .unwrap();
    });
    assert!(matches!(got.unwrap_err(), Error::EmptyQueue));
    assert!(channel.is_open());
}

#[tokio::test]
async fn client_acknowledgements_are_plain_writes() {
    let conn = MockConnection::new();
    let channel = open_channel(&conn).await;

    channel
        .basic_client_ack(1, BasicAckOptions::default())
        .await
        .unwrap();
    channel
        .basic_client_nack(2, BasicNackOptions::default())
        .await
        .unwrap();
    channel
        .basic_reject(3, BasicRejectOptions { requeue: true })
        .await
        .unwrap();
    channel
        .basic_recover_async(BasicRecoverOptions::default())
        .await
        .unwrap();

    assert_eq!(
        conn.methods_written(),
        vec![
            Method::BasicAck {
                delivery_tag: 1,
                multiple: false
            },
            Method::BasicNack {
                delivery_tag: 2,
                multiple: false,
                requeue: true
            },
            Method::BasicReject {
                delivery_tag: 3,
                requeue: true
            },
            Method::BasicRecoverAsync { requeue: true },
        ]
    );
    assert_eq!(channel.pending_rpc_count(), 0);
}

#[tokio::test]
async fn operations_require_an_open_channel() {
    let conn = MockConnection::new();
    let channel = Channel::new(1, conn.clone());

    let err = channel
        .queue_declare("q", QueueDeclareOptions::default(), FieldTable::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ChannelClosed(None)));
    assert!(conn.written().is_empty());
    assert_eq!(channel.pending_rpc_count(), 0);
}

#[tokio::test]
async fn failed_write_rolls_back_the_registration() {
    let conn = MockConnection::new();
    let channel = open_channel(&conn).await;

    conn.fail_writes(true);
    let err = channel
        .queue_declare("q", QueueDeclareOptions::default(), FieldTable::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)));

    // the completion was cancelled and the channel stays usable
    assert_eq!(channel.pending_rpc_count(), 0);
    assert!(channel.is_open());

    conn.fail_writes(false);
    let (declared, _) = tokio::join!(
        channel.queue_declare("q", QueueDeclareOptions::default(), FieldTable::new()),
        async {
            channel
                .dispatch_frame(Frame::Method(Method::QueueDeclareOk {
                    queue: "q".to_string(),
                    message_count: 0,
                    consumer_count: 0,
                }))
                .await
                .unwrap();
        }
    );
    declared.unwrap();
}

#[tokio::test]
async fn concurrent_same_method_rpcs_collide() {
    let conn = MockConnection::new();
    let channel = open_channel(&conn).await;

    let mut first = task::spawn(channel.queue_declare(
        "a",
        QueueDeclareOptions::default(),
        FieldTable::new(),
    ));
    assert_pending!(first.poll());

    // Per-method mutual exclusion: the second declare cannot register.
    let err = channel
        .queue_declare("b", QueueDeclareOptions::default(), FieldTable::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Synchronization(_)));

    channel
        .dispatch_frame(Frame::Method(Method::QueueDeclareOk {
            queue: "a".to_string(),
            message_count: 0,
            consumer_count: 0,
        }))
        .await
        .unwrap();
    assert_ready!(first.poll()).unwrap();
}

#[tokio::test]
async fn connection_must_be_open_to_write() {
    let conn = MockConnection::new();
    let channel = open_channel(&conn).await;

    conn.close();
    let err = channel
        .basic_client_ack(1, BasicAckOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
    // a write failure alone does not close the channel
    assert_eq!(channel.state(), ChannelState::Open);
}
