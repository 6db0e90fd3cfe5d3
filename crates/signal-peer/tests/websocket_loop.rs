use futures_util::{SinkExt, StreamExt};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use signal_peer::transport::websocket;
use signal_peer::{
    codec, Delivery, Message, Peer, PeerConfig, PeerError, TransportError, WorkerPool,
};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Role};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{accept_async, WebSocketStream};

fn text(message: Message) -> WsMessage {
    WsMessage::Text(codec::encode(&message).unwrap())
}

async fn next_frame<S>(socket: &mut S) -> WsMessage
where
    S: futures_util::Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    timeout(Duration::from_secs(3), socket.next())
        .await
        .expect("frame before timeout")
        .expect("socket open")
        .expect("frame ok")
}

async fn next_message<S>(socket: &mut S) -> Message
where
    S: futures_util::Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    loop {
        if let WsMessage::Text(raw) = next_frame(socket).await {
            return codec::decode(&raw).unwrap();
        }
    }
}

/// Read until the socket ends or errors.
async fn drain<S>(socket: &mut S)
where
    S: futures_util::Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    while let Some(Ok(_)) = socket.next().await {}
}

fn test_peer() -> Peer {
    let config = PeerConfig::default();
    let pool = WorkerPool::new(config.workers).unwrap();
    Peer::new("ws-peer", pool, &config)
}

/// Socket whose reads never complete and whose writes always fail.
struct BrokenPipe;

impl AsyncRead for BrokenPipe {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

impl AsyncWrite for BrokenPipe {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[test_timeout::tokio_timeout_test(15)]
async fn peer_negotiates_over_websocket_until_end() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = accept_async(stream).await.unwrap();

        // the peer asks to create before the handshake completes on its side
        let create = next_message(&mut socket).await;
        assert_eq!(create.signal(), Some("create"));
        assert_eq!(create.content(), Some("room1"));

        socket
            .send(text(
                Message::builder()
                    .signal("created")
                    .to("alice")
                    .content("room1")
                    .build(),
            ))
            .await
            .unwrap();
        socket
            .send(text(Message::builder().signal("ping").build()))
            .await
            .unwrap();
        socket
            .send(text(
                Message::builder().signal("offerRequest").from("bob").build(),
            ))
            .await
            .unwrap();

        let offer = next_message(&mut socket).await;
        socket
            .send(text(
                Message::builder().signal("end").content("kicked").build(),
            ))
            .await
            .unwrap();
        let close = next_frame(&mut socket).await;
        drain(&mut socket).await;
        (offer, close)
    });

    let peer = test_peer();
    let _ = peer.create_conv("room1").unwrap();
    let outcome = websocket::connect_and_run(&peer, &url).await;

    assert_eq!(
        outcome,
        Err(PeerError::Terminated {
            reason: "kicked".into()
        })
    );
    let (offer, close) = server.await.unwrap();
    assert_eq!(offer.to(), Some("bob"));
    assert_eq!(offer.content(), Some("offer fromalice"));
    match close {
        WsMessage::Close(Some(frame)) => {
            assert_eq!(frame.code, CloseCode::Normal);
            assert_eq!(frame.reason, "kicked");
        }
        other => panic!("expected a close frame, got {other:?}"),
    }
    assert_eq!(peer.state().name().as_deref(), Some("alice"));
    assert!(!peer.state().is_connected());

    let log = peer.state().log();
    assert!(log.iter().all(|m| !m.is_keepalive()));
    assert_eq!(log.last().and_then(|m| m.content()), Some("kicked"));
}

#[test_timeout::tokio_timeout_test(15)]
async fn close_frame_ends_the_loop_cleanly() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = accept_async(stream).await.unwrap();
        socket
            .send(text(
                Message::builder()
                    .signal("newjoined")
                    .content("carol")
                    .build(),
            ))
            .await
            .unwrap();
        socket
            .close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "server restart".into(),
            }))
            .await
            .unwrap();
        drain(&mut socket).await;
    });

    let peer = test_peer();
    let outcome = websocket::connect_and_run(&peer, &url).await;
    assert_eq!(outcome, Ok(()));
    assert!(!peer.state().is_connected());
    assert_eq!(
        peer.state().log().last(),
        Some(&Message::builder().content("server restart").build())
    );
}

#[test_timeout::tokio_timeout_test(10)]
async fn connect_failure_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let peer = test_peer();
    let outcome = websocket::connect_and_run(&peer, &url).await;
    assert!(matches!(outcome, Err(PeerError::Transport(_))));
    assert!(!peer.state().is_connected());
}

#[test_timeout::tokio_timeout_test(10)]
async fn failed_socket_write_fails_the_send_and_drops_the_session() {
    let config = PeerConfig::default().with_send_timeout(Duration::from_millis(200));
    let pool = WorkerPool::new(config.workers).unwrap();
    let peer = Peer::new("ws-peer", pool, &config);

    let stream = WebSocketStream::from_raw_socket(BrokenPipe, Role::Client, None).await;
    let driver = {
        let peer = peer.clone();
        tokio::spawn(async move { websocket::run(&peer, stream).await })
    };

    let first = peer.join("room1").unwrap().wait().await;
    assert!(
        matches!(first, Err(PeerError::Write(TransportError::Io(_)))),
        "unexpected send outcome: {first:?}"
    );

    let outcome = driver.await.unwrap();
    assert!(
        matches!(outcome, Err(PeerError::Transport(TransportError::Io(_)))),
        "unexpected loop outcome: {outcome:?}"
    );
    assert!(!peer.state().is_connected());
    assert!(matches!(
        peer.state().faults().as_slice(),
        [PeerError::Write(TransportError::Io(_))]
    ));

    // nothing to write through any more, so the gate gives up
    let second = peer.leave().unwrap().wait().await;
    assert_eq!(second, Ok(Delivery::Abandoned));
}

#[test_timeout::tokio_timeout_test(15)]
async fn shutdown_flushes_written_frames_before_closing() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = accept_async(stream).await.unwrap();
        let mut received = Vec::new();
        let close = loop {
            match next_frame(&mut socket).await {
                WsMessage::Text(raw) => received.push(codec::decode(&raw).unwrap()),
                WsMessage::Close(frame) => break frame,
                _ => {}
            }
        };
        drain(&mut socket).await;
        (received, close)
    });

    let config = PeerConfig::default().with_send_timeout(Duration::from_millis(200));
    let pool = WorkerPool::new(config.workers).unwrap();
    let peer = Peer::new("ws-peer", pool, &config);
    let (stop, stopped) = oneshot::channel::<()>();
    let driver = {
        let peer = peer.clone();
        tokio::spawn(async move {
            websocket::connect_and_run_until(&peer, &url, async move {
                let _ = stopped.await;
            })
            .await
        })
    };

    let mut connected = peer.state().subscribe_session();
    connected.wait_for(|session| session.is_some()).await.unwrap();

    let messages: Vec<Message> = (0..20)
        .map(|index| {
            Message::builder()
                .signal("candidate")
                .to("bob")
                .content(format!("candidate {index}"))
                .build()
        })
        .collect();
    let completions: Vec<_> = messages
        .iter()
        .map(|message| peer.send(message.clone()).unwrap())
        .collect();
    stop.send(()).unwrap();

    let mut written = Vec::new();
    for (message, completion) in messages.iter().zip(completions) {
        match completion.wait().await {
            Ok(Delivery::Written) => written.push(message.clone()),
            Ok(Delivery::Abandoned) | Err(PeerError::Write(TransportError::Closed)) => {}
            other => panic!("send neither written nor refused: {other:?}"),
        }
    }

    assert_eq!(driver.await.unwrap(), Ok(()));
    assert!(!peer.state().is_connected());
    assert_eq!(
        peer.state().log().last(),
        Some(&Message::builder().content("shutdown").build())
    );

    let (received, close) = server.await.unwrap();
    for message in &written {
        assert!(received.contains(message), "{message:?} reported written but never arrived");
    }
    assert_eq!(close.map(|frame| frame.code), Some(CloseCode::Normal));
}

#[test_timeout::tokio_timeout_test(15)]
async fn binary_frames_are_read_as_text_when_utf8() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = accept_async(stream).await.unwrap();
        let joined = Message::builder().signal("newjoined").content("dave").build();
        socket
            .send(WsMessage::Binary(codec::encode(&joined).unwrap().into_bytes()))
            .await
            .unwrap();
        socket
            .send(WsMessage::Binary(vec![0xff, 0xfe, 0x00]))
            .await
            .unwrap();
        socket
            .send(text(Message::builder().signal("newjoined").content("erin").build()))
            .await
            .unwrap();
        socket.close(None).await.unwrap();
        drain(&mut socket).await;
    });

    let peer = test_peer();
    let outcome = websocket::connect_and_run(&peer, &url).await;
    assert_eq!(outcome, Ok(()));

    // handlers run on the pool; give them a moment to land
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while peer.state().joined().len() < 2 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let mut joined = peer.state().joined();
    joined.sort();
    assert_eq!(joined, vec!["dave".to_string(), "erin".to_string()]);
    assert!(peer.state().faults().is_empty());
    // two decoded frames plus the close entry; the garbage frame left no trace
    assert_eq!(peer.state().log_len(), 3);
}
