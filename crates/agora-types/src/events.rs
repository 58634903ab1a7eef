use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ContentNode, NotificationRecord, Poll, ReactionGroup};

/// Events sent over the WebSocket gateway.
///
/// The `type` tag is the stable event name clients switch on. Payloads carry
/// the ids a client needs to patch local state without refetching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    #[serde(rename = "ready")]
    Ready { user_id: Uuid, connection_id: Uuid },

    /// A notification was persisted for the receiving user
    #[serde(rename = "notification")]
    Notification(NotificationRecord),

    /// A notification was marked read (sync across the user's other tabs)
    #[serde(rename = "notification:read")]
    NotificationRead {
        notification_id: Option<Uuid>,
        unread_count: u64,
    },

    #[serde(rename = "comment:new")]
    CommentNew { comment: ContentNode },

    #[serde(rename = "comment:updated")]
    CommentUpdated { comment: ContentNode },

    /// A comment was deleted; `removed_ids` includes cascaded replies
    #[serde(rename = "comment:deleted")]
    CommentDeleted {
        scope_id: Uuid,
        comment_id: Uuid,
        removed_ids: Vec<Uuid>,
    },

    #[serde(rename = "comment:liked")]
    CommentLiked {
        scope_id: Uuid,
        comment_id: Uuid,
        user_id: Uuid,
        liked: bool,
        like_count: usize,
    },

    /// A reaction was added to or removed from a comment
    #[serde(rename = "comment:reaction")]
    CommentReaction {
        scope_id: Uuid,
        comment_id: Uuid,
        user_id: Uuid,
        emoji: String,
        added: bool,
        reactions: Vec<ReactionGroup>,
    },

    #[serde(rename = "chat:message")]
    ChatMessage { message: ContentNode },

    #[serde(rename = "chat:message_updated")]
    ChatMessageUpdated { message: ContentNode },

    #[serde(rename = "chat:message_deleted")]
    ChatMessageDeleted {
        conversation_id: Uuid,
        message_id: Uuid,
    },

    #[serde(rename = "chat:liked")]
    ChatMessageLiked {
        conversation_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        liked: bool,
        like_count: usize,
    },

    /// A reaction was added to or removed from a chat message
    #[serde(rename = "chat:reaction")]
    ChatReaction {
        conversation_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        emoji: String,
        added: bool,
        reactions: Vec<ReactionGroup>,
    },

    #[serde(rename = "poll:updated")]
    PollUpdated { poll: Poll },
}

impl GatewayEvent {
    /// The wire name of this event, identical to the serialized `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Notification(_) => "notification",
            Self::NotificationRead { .. } => "notification:read",
            Self::CommentNew { .. } => "comment:new",
            Self::CommentUpdated { .. } => "comment:updated",
            Self::CommentDeleted { .. } => "comment:deleted",
            Self::CommentLiked { .. } => "comment:liked",
            Self::CommentReaction { .. } => "comment:reaction",
            Self::ChatMessage { .. } => "chat:message",
            Self::ChatMessageUpdated { .. } => "chat:message_updated",
            Self::ChatMessageDeleted { .. } => "chat:message_deleted",
            Self::ChatMessageLiked { .. } => "chat:liked",
            Self::ChatReaction { .. } => "chat:reaction",
            Self::PollUpdated { .. } => "poll:updated",
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    #[serde(rename = "identify")]
    Identify { token: String },
}
