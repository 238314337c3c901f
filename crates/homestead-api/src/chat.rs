use axum::{
    Extension,
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, info};
use uuid::Uuid;

use homestead_db::models::NewMessage;
use homestead_gateway::connection;
use homestead_types::api::{
    ConversationResponse, MarkReadRequest, MarkReadResponse, MessageResponse, SendMessageRequest,
    StartConversationRequest, UnreadResponse,
};

use crate::auth::AppState;
use crate::error::{AppError, AppResult, FieldError};
use crate::extract::{Json, Path};
use crate::middleware::AuthUser;

pub const MAX_MESSAGE_CHARS: usize = 4000;
pub const MAX_ATTACHMENTS: usize = 10;

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<Vec<ConversationResponse>>> {
    let user_id = user.id;
    let views = state
        .db_call(move |db| db.list_conversations(user_id))
        .await?;
    Ok(Json(
        views.into_iter().map(|v| v.into_response(user_id)).collect(),
    ))
}

/// Get-or-create. 201 when a conversation was created, 200 when it existed.
pub async fn start_conversation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<StartConversationRequest>,
) -> AppResult<impl IntoResponse> {
    let user_id = user.id;
    let counterpart_id = req.participant_id;
    let (view, created) = state
        .db_call(move |db| db.start_conversation(user_id, counterpart_id, req.product_id))
        .await?;

    let status = if created {
        info!(
            "Conversation {} started by {} with {}",
            view.conversation.id, user_id, counterpart_id
        );
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(view.into_response(user_id))))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<ConversationResponse>> {
    let user_id = user.id;
    let view = state
        .db_call(move |db| db.conversation_for_participant(conversation_id, user_id))
        .await?;
    Ok(Json(view.into_response(user_id)))
}

/// Full history, oldest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<Vec<MessageResponse>>> {
    let user_id = user.id;
    let rows = state
        .db_call(move |db| db.get_messages(conversation_id, user_id))
        .await?;
    Ok(Json(rows.into_iter().map(MessageResponse::from).collect()))
}

/// Persist, then broadcast to the conversation's room, then respond.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<impl IntoResponse> {
    let (text, attachments) = validate_message(&req.text, req.attachments)?;

    let new = NewMessage {
        conversation_id: req.conversation_id,
        sender_id: user.id,
        text,
        attachments,
    };
    let row = state.db_call(move |db| db.create_message(&new)).await?;
    let message = MessageResponse::from(row);

    let delivered = state.hub.broadcast_new_message(message.clone());
    debug!(
        "Message {} in {} delivered to {} connections",
        message.id, message.conversation_id, delivered
    );

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_as_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<MarkReadRequest>,
) -> AppResult<Json<MarkReadResponse>> {
    let user_id = user.id;
    let conversation_id = req.conversation_id;
    let marked = state
        .db_call(move |db| db.mark_read(conversation_id, user_id))
        .await?;

    if marked > 0 {
        state.hub.broadcast_read(conversation_id, user_id);
    }

    Ok(Json(MarkReadResponse {
        conversation_id,
        marked,
    }))
}

pub async fn unread_counts(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<UnreadResponse>> {
    let user_id = user.id;
    let conversations = state.db_call(move |db| db.unread_counts(user_id)).await?;
    Ok(Json(UnreadResponse {
        total: conversations.values().sum(),
        conversations,
    }))
}

/// WebSocket upgrade. Authentication already ran in `require_auth`.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let hub = state.hub.clone();
    let db = state.db.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, hub, db, user.id, user.name))
}

/// Trim text and attachment paths. A message needs text or an attachment.
fn validate_message(text: &str, attachments: Vec<String>) -> AppResult<(String, Vec<String>)> {
    let text = text.trim().to_string();
    let attachments: Vec<String> = attachments
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();

    let mut errors = Vec::new();
    if text.is_empty() && attachments.is_empty() {
        errors.push(FieldError::new(
            "text",
            "Message must have text or at least one attachment",
        ));
    }
    if text.chars().count() > MAX_MESSAGE_CHARS {
        errors.push(FieldError::new(
            "text",
            format!("Message cannot exceed {} characters", MAX_MESSAGE_CHARS),
        ));
    }
    if attachments.len() > MAX_ATTACHMENTS {
        errors.push(FieldError::new(
            "attachments",
            format!("At most {} attachments are allowed", MAX_ATTACHMENTS),
        ));
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    Ok((text, attachments))
}
