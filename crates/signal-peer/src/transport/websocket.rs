use async_trait::async_trait;
use futures_util::{Sink, SinkExt, StreamExt};
use std::future::{self, Future};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, WebSocketStream};
use tracing::{debug, warn};

use super::{Session, TransportError};
use crate::error::{PeerError, PeerResult};
use crate::peer::Peer;

const NORMAL_CLOSURE: u16 = 1000;
const NO_STATUS: u16 = 1005;
const ABNORMAL_CLOSURE: u16 = 1006;

/// How long the writer gets to flush queued frames and the close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(2);
/// Close reasons are limited to 123 bytes on the wire.
const MAX_CLOSE_REASON: usize = 123;

enum Outbound {
    Text {
        text: String,
        written: oneshot::Sender<Result<(), TransportError>>,
    },
    Close(CloseFrame<'static>),
}

/// Session handed to the peer while a socket is open.
///
/// Each write is handed to the task owning the socket sink and completes
/// once that task has sent it. After the task stops every write fails with
/// [`TransportError::Closed`].
pub struct WebSocketSession {
    outbound: mpsc::UnboundedSender<Outbound>,
}

#[async_trait]
impl Session for WebSocketSession {
    async fn write_text(&self, text: String) -> Result<(), TransportError> {
        let (written, outcome) = oneshot::channel();
        self.outbound
            .send(Outbound::Text { text, written })
            .map_err(|_| TransportError::Closed)?;
        outcome.await.unwrap_or(Err(TransportError::Closed))
    }
}

/// Connect `peer` to the signaling server at `url` and pump frames until the
/// socket closes or the remote ends the peer's session.
pub async fn connect_and_run(peer: &Peer, url: &str) -> PeerResult<()> {
    connect_and_run_until(peer, url, future::pending()).await
}

/// Like [`connect_and_run`], but also closes the socket once `shutdown`
/// resolves.
pub async fn connect_and_run_until<F>(peer: &Peer, url: &str, shutdown: F) -> PeerResult<()>
where
    F: Future<Output = ()>,
{
    let (stream, _) = connect_async(url)
        .await
        .map_err(|err| PeerError::Transport(TransportError::Connect(err.to_string())))?;
    debug!(peer = %peer.label(), url, "websocket connected");
    run_until(peer, stream, shutdown).await
}

/// Drive an already-established socket.
///
/// Returns `Ok(())` when the socket closes, and [`PeerError::Terminated`] when
/// an `end` signal stops the peer first.
pub async fn run<S>(peer: &Peer, stream: WebSocketStream<S>) -> PeerResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    run_until(peer, stream, future::pending()).await
}

/// Drive an already-established socket until it closes, the peer is
/// terminated, a write fails, or `shutdown` resolves.
///
/// Frames accepted before the loop stops are flushed ahead of a normal close
/// frame.
pub async fn run_until<S, F>(peer: &Peer, stream: WebSocketStream<S>, shutdown: F) -> PeerResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    F: Future<Output = ()>,
{
    let (sink, mut source) = stream.split();
    let (outbound, pending) = mpsc::unbounded_channel::<Outbound>();
    let mut writer = tokio::spawn(write_frames(peer.label().to_string(), sink, pending));
    let mut writer_running = true;
    let mut close_reason = String::new();

    peer.on_connect(Arc::new(WebSocketSession {
        outbound: outbound.clone(),
    }));
    tokio::pin!(shutdown);

    let result = loop {
        tokio::select! {
            biased;
            terminated = peer.terminated() => {
                if let PeerError::Terminated { reason } = &terminated {
                    peer.on_close(NORMAL_CLOSURE, reason);
                    close_reason = reason.clone();
                }
                break Err(terminated);
            }
            _ = &mut shutdown => {
                peer.on_close(NORMAL_CLOSURE, "shutdown");
                break Ok(());
            }
            written = &mut writer => {
                writer_running = false;
                let reason = match written {
                    Ok(Err(err)) => err.to_string(),
                    Ok(Ok(())) => "websocket writer stopped".to_string(),
                    Err(err) => err.to_string(),
                };
                peer.on_close(ABNORMAL_CLOSURE, &reason);
                break Err(PeerError::Transport(TransportError::Io(reason)));
            }
            frame = source.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => deliver(peer, &text),
                Some(Ok(WsMessage::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => deliver(peer, &text),
                    Err(_) => debug!(peer = %peer.label(), "ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    let (status, reason) = frame
                        .map(|frame| (u16::from(frame.code), frame.reason.into_owned()))
                        .unwrap_or((NO_STATUS, String::new()));
                    peer.on_close(status, &reason);
                    break Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    peer.on_close(ABNORMAL_CLOSURE, &err.to_string());
                    break Err(PeerError::Transport(TransportError::Io(err.to_string())));
                }
                None => {
                    peer.on_close(ABNORMAL_CLOSURE, "stream ended");
                    break Ok(());
                }
            }
        }
    };

    if writer_running {
        // queued behind every frame already accepted, so those go out first
        let _ = outbound.send(Outbound::Close(close_frame(&close_reason)));
        drop(outbound);
        if time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
            warn!(peer = %peer.label(), "websocket writer did not finish; aborting");
            writer.abort();
        }
    }
    result
}

async fn write_frames<Si>(
    label: String,
    mut sink: Si,
    mut pending: mpsc::UnboundedReceiver<Outbound>,
) -> Result<(), TransportError>
where
    Si: Sink<WsMessage, Error = WsError> + Unpin,
{
    while let Some(outbound) = pending.recv().await {
        match outbound {
            Outbound::Text { text, written } => {
                if let Err(err) = sink.send(WsMessage::Text(text)).await {
                    let err = TransportError::Io(err.to_string());
                    warn!(peer = %label, error = %err, "websocket write failed");
                    let _ = written.send(Err(err.clone()));
                    return Err(err);
                }
                let _ = written.send(Ok(()));
            }
            Outbound::Close(frame) => {
                if let Err(err) = sink.send(WsMessage::Close(Some(frame))).await {
                    debug!(peer = %label, error = %err, "close frame not sent");
                }
                // flushes the reply to a close the server started
                let _ = sink.close().await;
                debug!(peer = %label, "websocket writer finished");
                return Ok(());
            }
        }
    }
    let _ = sink.close().await;
    Ok(())
}

fn close_frame(reason: &str) -> CloseFrame<'static> {
    let reason = if reason.len() <= MAX_CLOSE_REASON {
        reason.to_string()
    } else {
        String::new()
    };
    CloseFrame {
        code: CloseCode::Normal,
        reason: reason.into(),
    }
}

fn deliver(peer: &Peer, text: &str) {
    if let Err(err) = peer.on_inbound_text(text) {
        debug!(peer = %peer.label(), error = %err, "inbound frame not dispatched");
    }
}
