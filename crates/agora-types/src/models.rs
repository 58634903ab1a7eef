use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Users are opaque identities issued by the auth service.
pub type UserId = Uuid;

/// The two flavours of threaded content share one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Comment on a subject (post, task). One level of replies.
    Comment,
    /// Chat message in a conversation. May point at an earlier message.
    Message,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Comment => "comment",
            Self::Message => "message",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "comment" => Some(Self::Comment),
            "message" => Some(Self::Message),
            _ => None,
        }
    }
}

/// A comment or a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentNode {
    pub id: Uuid,
    pub kind: ContentKind,
    /// Subject id for comments, conversation id for messages.
    pub scope_id: Uuid,
    /// Set on comment replies only. Always a top-level comment.
    pub parent_id: Option<Uuid>,
    /// Set on chat messages quoting an earlier message.
    pub reply_to: Option<Uuid>,
    pub author_id: UserId,
    pub body: String,
    pub edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a like toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeState {
    pub liked: bool,
    pub like_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: usize,
    pub user_ids: Vec<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub member_ids: Vec<UserId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub index: usize,
    pub text: String,
    pub votes: usize,
    /// Rounded share of all votes, 0-100.
    pub percentage: u32,
    pub voter_ids: Vec<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: Uuid,
    pub creator_id: UserId,
    pub question: String,
    pub options: Vec<PollOption>,
    pub total_votes: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Like,
    Reply,
    Reaction,
    PollVote,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Reply => "reply",
            Self::Reaction => "reaction",
            Self::PollVote => "poll_vote",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "like" => Some(Self::Like),
            "reply" => Some(Self::Reply),
            "reaction" => Some(Self::Reaction),
            "poll_vote" => Some(Self::PollVote),
            _ => None,
        }
    }
}

/// Persisted witness of something that happened to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub recipient_id: UserId,
    pub from_user_id: UserId,
    pub message: String,
    pub action_url: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
