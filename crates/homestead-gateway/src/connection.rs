use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::task::JoinError;
use tracing::{error, info, trace, warn};
use uuid::Uuid;

use homestead_db::Database;
use homestead_types::events::{GatewayCommand, GatewayEvent};

use crate::hub::{ConnectionId, Hub};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a pre-authenticated WebSocket connection.
/// The token was validated at the HTTP upgrade, so the loop starts with Ready.
pub async fn handle_connection(
    socket: WebSocket,
    hub: Hub,
    db: Arc<Database>,
    user_id: Uuid,
    name: String,
) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} ({}) connected to gateway", name, user_id);

    let ready = GatewayEvent::Ready {
        user_id,
        name: name.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    let (conn_id, mut events_rx) = hub.register(user_id);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward hub events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    let Some(event) = event else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let hub_recv = hub.clone();
    let name_recv = name.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&hub_recv, &db, conn_id, user_id, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            name_recv,
                            user_id,
                            e,
                            truncate(&text, 200)
                        );
                    }
                },
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

    hub.unregister(conn_id);
    info!("{} ({}) disconnected from gateway", name, user_id);
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), ()> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to serialize gateway event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}

async fn handle_command(
    hub: &Hub,
    db: &Arc<Database>,
    conn_id: ConnectionId,
    user_id: Uuid,
    cmd: GatewayCommand,
) {
    match cmd {
        GatewayCommand::JoinConversation { conversation_id } => {
            let db = db.clone();
            let allowed = tokio::task::spawn_blocking(move || {
                db.is_participant(conversation_id, user_id)
            })
            .await;
            apply_join(hub, conn_id, user_id, conversation_id, allowed);
        }

        GatewayCommand::LeaveConversation { conversation_id } => {
            hub.leave_conversation(conn_id, conversation_id);
        }

        GatewayCommand::Typing {
            conversation_id,
            is_typing,
        } => {
            if !hub.typing(conn_id, conversation_id, is_typing) {
                trace!(
                    "Dropped typing from {} for unjoined conversation {}",
                    user_id, conversation_id
                );
            }
        }
    }
}

/// Join on a confirmed participant check. Anything else is answered with
/// `joinRejected` to the requesting connection only.
fn apply_join(
    hub: &Hub,
    conn_id: ConnectionId,
    user_id: Uuid,
    conversation_id: Uuid,
    allowed: Result<homestead_db::Result<bool>, JoinError>,
) -> bool {
    match allowed {
        Ok(Ok(true)) => return hub.join_conversation(conn_id, conversation_id),
        Ok(Ok(false)) => warn!(
            "User {} tried to join conversation {} without being a participant",
            user_id, conversation_id
        ),
        Ok(Err(e)) => error!("Participant check for {} failed: {}", conversation_id, e),
        Err(e) => error!(
            "Participant check task for {} failed: {}",
            conversation_id, e
        ),
    }
    hub.send_to(conn_id, GatewayEvent::JoinRejected { conversation_id });
    false
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
