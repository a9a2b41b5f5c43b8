use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use trollbox_types::{ChatAction, Credentials, ServerFrame};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: the gateway sends a Ping every 10 seconds.
/// If 2 consecutive Pongs are missed (~20s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const MAX_MISSED_PONGS: u8 = 2;

/// Why a client frame was refused. The text is sent back as `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("Unparseable message")]
    Unparseable,
    #[error("No permission to post as this author")]
    ForeignAuthor,
    #[error("No permission to delete this post")]
    NotModerator,
}

impl Rejection {
    fn to_frame(&self) -> String {
        ServerFrame::Error(self.to_string())
            .to_json()
            .unwrap_or_else(|_| r#"{"error":"internal error"}"#.to_string())
    }
}

/// Serve one widget whose token was verified at the HTTP upgrade.
///
/// Sends the history first, then relays broadcasts and applies the
/// widget's actions until either side goes away.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, credentials: Credentials) {
    let (mut sender, mut receiver) = socket.split();
    let (history, mut broadcast_rx) = dispatcher.join().await;

    info!(
        "{} (uid {}, {}) connected, sending {} past messages",
        credentials.username,
        credentials.uid,
        credentials.role,
        history.len()
    );

    let history = match ServerFrame::History(history).to_json() {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize history: {}", e);
            return;
        }
    };
    if sender.send(Message::Text(history.into())).await.is_err() {
        return;
    }

    // Replies meant only for this widget (error frames).
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<String>();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let Some(json) = relayable(result) else { break };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                reply = reply_rx.recv() => {
                    let Some(reply) = reply else { break };
                    if sender.send(Message::Text(reply.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= MAX_MISSED_PONGS {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sender.close().await;
    });

    let username = credentials.username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Err(rejection) = handle_frame(&dispatcher, &credentials, text.as_str()).await {
                        warn!(
                            "{} ({}) rejected: {} -- raw: {}",
                            credentials.username,
                            credentials.uid,
                            rejection,
                            text.as_str().chars().take(200).collect::<String>()
                        );
                        if reply_tx.send(rejection.to_frame()).is_err() {
                            break;
                        }
                    }
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("{} disconnected", username);
}

/// A frame to forward, or `None` when the connection must end. A lagged
/// receiver has lost frames for good; closing makes the widget reconnect and
/// resync from the history batch.
fn relayable(result: Result<String, broadcast::error::RecvError>) -> Option<String> {
    match result {
        Ok(json) => Some(json),
        Err(broadcast::error::RecvError::Lagged(n)) => {
            warn!("Broadcast receiver lagged by {} frames, dropping connection", n);
            None
        }
        Err(broadcast::error::RecvError::Closed) => None,
    }
}

/// Apply one text frame from a widget on behalf of `credentials`.
///
/// Posts must name the token's own author; the stored copy gets a fresh id
/// and the verified author fields. Deletes need a moderating role.
pub async fn handle_frame(dispatcher: &Dispatcher, credentials: &Credentials, text: &str) -> Result<(), Rejection> {
    let action: ChatAction = serde_json::from_str(text).map_err(|_| Rejection::Unparseable)?;

    match action {
        ChatAction::PostMessage(draft) => {
            if draft.author_name != credentials.username || draft.author_uid != credentials.uid {
                return Err(Rejection::ForeignAuthor);
            }
            let posted = dispatcher.post(draft, credentials).await;
            debug!("{} posted {}", credentials.username, posted.id);
        }
        ChatAction::DeleteMessage(target) => {
            if !credentials.role.can_moderate() {
                return Err(Rejection::NotModerator);
            }
            let found = dispatcher.delete(&target.id).await;
            info!("{} deleted {} (in history: {})", credentials.username, target.id, found);
        }
    }
    Ok(())
}
