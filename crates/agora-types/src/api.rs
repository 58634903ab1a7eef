use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ContentNode, ReactionGroup};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the WebSocket handshake.
/// Tokens are issued elsewhere; this service only verifies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Comments --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCommentRequest {
    pub body: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditContentRequest {
    pub body: String,
}

/// A top-level comment (or a reply) with its interaction state.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadNode {
    #[serde(flatten)]
    pub node: ContentNode,
    pub like_count: usize,
    pub liked_by: Vec<Uuid>,
    pub reactions: Vec<ReactionGroup>,
    /// Always empty for replies.
    pub replies: Vec<ThreadNode>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub removed_ids: Vec<Uuid>,
}

// -- Chat --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConversationRequest {
    pub member_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub body: String,
    #[serde(default)]
    pub reply_to: Option<Uuid>,
}

// -- Reactions --

#[derive(Debug, Serialize)]
pub struct ReactionResponse {
    /// Whether the call added or removed anything.
    pub changed: bool,
    pub reactions: Vec<ReactionGroup>,
}

// -- Polls --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePollRequest {
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoteRequest {
    pub option_index: usize,
}

// -- Notifications --

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread: u64,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub changed: bool,
    pub unread: u64,
}

// -- Presence --

#[derive(Debug, Serialize)]
pub struct PresenceResponse {
    pub user_id: Uuid,
    pub online: bool,
}

#[derive(Debug, Serialize)]
pub struct OnlineUsersResponse {
    pub user_ids: Vec<Uuid>,
    pub connections: usize,
}
