use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};

use crate::groups::{ConnectionSender, MemberHandle};
use crate::state::SessionSettings;
use crate::ws::protocol::CLOSE_GOING_AWAY;

/// How long the writer gets to flush a final close frame.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Receives text frames from the reader loop, one at a time.
#[async_trait]
pub trait FrameHandler: Send {
    async fn on_text(&mut self, text: &str);
}

/// Why the reader loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    ClientClosed,
    StreamEnded,
    TransportError,
    KeepaliveTimeout,
    WriterGone,
}

/// Drive one WebSocket until it ends.
///
/// Splits the socket into reader and writer halves:
/// - Writer task: owns the sink, forwards frames queued on the member's channel
/// - Keepalive task: pings periodically and closes on a missed pong
/// - Reader loop (this task): hands text frames to `handler` in arrival order
///
/// Returns once the client is gone; cleanup is the caller's job.
pub async fn drive<H: FrameHandler>(
    socket: WebSocket,
    member: &MemberHandle,
    outbound: mpsc::UnboundedReceiver<Message>,
    settings: &SessionSettings,
    handler: &mut H,
) -> DisconnectReason {
    let (ws_sender, mut ws_receiver) = socket.split();
    let tx = member.sender().clone();

    let mut writer_handle = tokio::spawn(writer_task(ws_sender, outbound));

    let (pong_tx, pong_rx) = mpsc::unbounded_channel::<()>();
    let mut keepalive_handle = tokio::spawn(keepalive_task(
        tx.clone(),
        pong_rx,
        settings.ping_interval,
        settings.pong_timeout,
    ));

    let reason = loop {
        tokio::select! {
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => handler.on_text(text.as_str()).await,
                Some(Ok(Message::Binary(data))) => {
                    tracing::debug!(
                        connection_id = %member.id(),
                        bytes = data.len(),
                        "Ignoring binary frame"
                    );
                }
                Some(Ok(Message::Pong(_))) => {
                    let _ = pong_tx.send(());
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(connection_id = %member.id(), reason = ?frame, "Client initiated close");
                    break DisconnectReason::ClientClosed;
                }
                Some(Err(e)) => {
                    tracing::warn!(connection_id = %member.id(), error = %e, "WebSocket receive error");
                    break DisconnectReason::TransportError;
                }
                None => break DisconnectReason::StreamEnded,
            },
            ended = &mut keepalive_handle => {
                break ended.unwrap_or(DisconnectReason::WriterGone);
            }
        }
    };

    keepalive_handle.abort();
    // On keepalive timeout the close frame is already queued; let the writer flush it.
    let grace = (reason == DisconnectReason::KeepaliveTimeout).then_some(CLOSE_FLUSH_TIMEOUT);
    stop_writer(&mut writer_handle, grace).await;

    reason
}

/// Wait up to `grace` for the writer to finish on its own, then abort it.
/// The writer never outlives the session, even when the peer stops reading.
async fn stop_writer(writer: &mut JoinHandle<()>, grace: Option<Duration>) {
    if let Some(grace) = grace {
        if timeout(grace, &mut *writer).await.is_ok() {
            return;
        }
        tracing::debug!("Writer did not flush within {:?}, aborting", grace);
    }
    writer.abort();
}

/// Forwards queued frames to the socket. Stops after a close frame or a send failure.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        let is_close = matches!(msg, Message::Close(_));
        if ws_sender.send(msg).await.is_err() || is_close {
            break;
        }
    }
}

async fn keepalive_task(
    tx: ConnectionSender,
    mut pong_rx: mpsc::UnboundedReceiver<()>,
    ping_interval: Duration,
    pong_timeout: Duration,
) -> DisconnectReason {
    let mut ping_timer = interval(ping_interval);
    // Skip the first immediate tick
    ping_timer.tick().await;

    loop {
        ping_timer.tick().await;

        // Only a pong that follows this ping counts.
        while pong_rx.try_recv().is_ok() {}

        if tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
            return DisconnectReason::WriterGone;
        }

        match timeout(pong_timeout, pong_rx.recv()).await {
            Ok(Some(())) => {}
            _ => {
                tracing::warn!("Pong timeout, closing connection");
                let _ = tx.send(Message::Close(Some(CloseFrame {
                    code: CLOSE_GOING_AWAY,
                    reason: "Pong timeout".into(),
                })));
                return DisconnectReason::KeepaliveTimeout;
            }
        }
    }
}
