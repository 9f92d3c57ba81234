//! Concurrency tests for the shared connection.
//!
//! Many tasks drive one `Conn` at a time; frames must never interleave and
//! every message must reach exactly one reader.

use std::collections::HashSet;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf, duplex};
use tokio::sync::Barrier;
use tokio::task::JoinSet;
use wsconn::{
    Conn, EncodablePayload, Error, MessageType, Options, RawPayload, TextPayload,
};

fn pair(options: &Options) -> (Arc<Conn<DuplexStream>>, Arc<Conn<DuplexStream>>) {
    let (a, b) = duplex(256 * 1024);
    (
        Arc::new(Conn::new_client(a, options)),
        Arc::new(Conn::new_server(b, options)),
    )
}

/// Transport that never yields data and counts write calls.
struct SpyTransport {
    writes: Arc<AtomicUsize>,
}

impl AsyncRead for SpyTransport {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

impl AsyncWrite for SpyTransport {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

struct Broken;

impl Serialize for Broken {
    fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom("broken value"))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writes_do_not_interleave() {
    const WRITERS: usize = 8;
    const MESSAGES_PER_WRITER: usize = 20;
    // Larger than the default fragment size, so every message spans frames.
    const MESSAGE_SIZE: usize = 40 * 1024;

    let (client, server) = pair(&Options::new());
    let barrier = Arc::new(Barrier::new(WRITERS));
    let mut set = JoinSet::new();

    for writer in 0..WRITERS {
        let client = Arc::clone(&client);
        let barrier = Arc::clone(&barrier);
        set.spawn(async move {
            barrier.wait().await;
            for seq in 0..MESSAGES_PER_WRITER {
                let mut message = vec![writer as u8; MESSAGE_SIZE];
                message[0] = seq as u8;
                client
                    .write_message(MessageType::Binary, RawPayload(message))
                    .await
                    .unwrap();
            }
        });
    }

    let mut next_seq = [0usize; WRITERS];
    for _ in 0..WRITERS * MESSAGES_PER_WRITER {
        let (kind, payload) = server.read_message().await.unwrap();
        assert_eq!(kind, MessageType::Binary);
        assert_eq!(payload.len(), MESSAGE_SIZE);

        let writer = payload[1] as usize;
        assert!(
            payload[1..].iter().all(|&b| b as usize == writer),
            "message mixes bytes from different writers"
        );
        assert_eq!(payload[0] as usize, next_seq[writer], "writer order broken");
        next_seq[writer] += 1;
    }

    while let Some(result) = set.join_next().await {
        result.unwrap();
    }
    assert!(next_seq.iter().all(|&n| n == MESSAGES_PER_WRITER));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_get_distinct_messages() {
    const READERS: usize = 5;
    const MESSAGES: usize = 100;

    let (client, server) = pair(&Options::new());
    let mut set = JoinSet::new();

    for _ in 0..READERS {
        let server = Arc::clone(&server);
        set.spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..MESSAGES / READERS {
                let (kind, payload) = server.read_message().await.unwrap();
                assert_eq!(kind, MessageType::Text);
                seen.push(String::from_utf8(payload).unwrap());
            }
            seen
        });
    }

    for i in 0..MESSAGES {
        client
            .write_message(MessageType::Text, TextPayload(format!("message-{i}")))
            .await
            .unwrap();
    }

    let mut all = HashSet::new();
    while let Some(result) = set.join_next().await {
        for message in result.unwrap() {
            assert!(all.insert(message), "message delivered twice");
        }
    }
    assert_eq!(all.len(), MESSAGES);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_read_and_write_in_parallel() {
    let (client, server) = pair(&Options::new());

    // A read blocked on an idle connection must not hold up writes.
    let reader = Arc::clone(&client);
    let pending = tokio::spawn(async move { reader.read_message().await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    tokio::time::timeout(
        Duration::from_secs(1),
        client.write_message(MessageType::Text, TextPayload("ping")),
    )
    .await
    .expect("write blocked by pending read")
    .unwrap();

    let (kind, payload) = server.read_message().await.unwrap();
    assert_eq!((kind, payload.as_slice()), (MessageType::Text, &b"ping"[..]));
    server
        .write_message(MessageType::Text, RawPayload(payload))
        .await
        .unwrap();

    assert_eq!(
        pending.await.unwrap().unwrap(),
        (MessageType::Text, b"ping".to_vec())
    );
}

#[tokio::test]
async fn test_raw_payload_is_bit_identical() {
    let (client, server) = pair(&Options::new().with_compression(true));
    let every_byte: Vec<u8> = (0..=255).cycle().take(4096).collect();

    client
        .write_message(MessageType::Binary, RawPayload(&every_byte))
        .await
        .unwrap();
    assert_eq!(
        server.read_message().await.unwrap(),
        (MessageType::Binary, every_byte)
    );
}

#[tokio::test]
async fn test_encode_failure_writes_nothing() {
    let writes = Arc::new(AtomicUsize::new(0));
    let conn = Conn::new_client(
        SpyTransport {
            writes: Arc::clone(&writes),
        },
        &Options::new(),
    );

    let err = conn
        .write_message(MessageType::Text, EncodablePayload(Broken))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Encode(ref msg) if msg.contains("broken value")));
    assert_eq!(writes.load(Ordering::SeqCst), 0);

    conn.write_message(MessageType::Text, EncodablePayload(vec![1, 2, 3]))
        .await
        .unwrap();
    assert!(writes.load(Ordering::SeqCst) > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_releases_blocked_readers() {
    const READERS: usize = 4;

    let (client, _server) = pair(&Options::new());
    let mut set = JoinSet::new();
    for _ in 0..READERS {
        let client = Arc::clone(&client);
        set.spawn(async move { client.read_message().await });
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut closers = JoinSet::new();
    for _ in 0..3 {
        let client = Arc::clone(&client);
        closers.spawn(async move { client.close().await });
    }
    while let Some(result) = closers.join_next().await {
        result.unwrap().unwrap();
    }

    let mut released = 0;
    while let Some(result) = set.join_next().await {
        assert_eq!(result.unwrap(), Err(Error::ConnectionClosed(None)));
        released += 1;
    }
    assert_eq!(released, READERS);

    assert_eq!(
        client
            .write_message(MessageType::Text, TextPayload("after close"))
            .await,
        Err(Error::ConnectionClosed(None))
    );
}

#[tokio::test]
async fn test_close_handshake_between_peers() {
    let (client, server) = pair(&Options::new());

    client
        .write_message(MessageType::Close, RawPayload(1000u16.to_be_bytes()))
        .await
        .unwrap();

    let (kind, payload) = server.read_message().await.unwrap();
    assert_eq!(kind, MessageType::Close);
    assert_eq!(payload, 1000u16.to_be_bytes());

    let (kind, _) = client.read_message().await.unwrap();
    assert_eq!(kind, MessageType::Close);

    assert_eq!(
        server.read_message().await,
        Err(Error::ConnectionClosed(Some(1000)))
    );
    client.close().await.unwrap();
    server.close().await.unwrap();
}
