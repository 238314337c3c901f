use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::MessageResponse;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum GatewayEvent {
    /// Server confirms the connection is authenticated
    Ready { user_id: Uuid, name: String },

    /// A message was persisted in a conversation
    NewMessage(MessageResponse),

    /// A participant started or stopped typing
    Typing {
        conversation_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },

    /// A participant marked the conversation as read
    MessagesRead { conversation_id: Uuid, user_id: Uuid },

    /// A join was refused because the user is not a participant
    JoinRejected { conversation_id: Uuid },
}

impl GatewayEvent {
    /// Returns the conversation this event belongs to, if any.
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            Self::NewMessage(message) => Some(message.conversation_id),
            Self::Typing { conversation_id, .. }
            | Self::MessagesRead { conversation_id, .. }
            | Self::JoinRejected { conversation_id } => Some(*conversation_id),
            Self::Ready { .. } => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum GatewayCommand {
    /// Start receiving a conversation's events
    JoinConversation { conversation_id: Uuid },

    /// Stop receiving a conversation's events
    LeaveConversation { conversation_id: Uuid },

    /// Typing indicator for a joined conversation
    Typing {
        conversation_id: Uuid,
        is_typing: bool,
    },
}
