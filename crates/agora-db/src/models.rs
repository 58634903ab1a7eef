//! Database row types. These map directly to SQLite rows; ids and
//! timestamps stay as text until converted into `agora-types` models.

use agora_types::models::{ContentKind, ContentNode, NotificationKind, NotificationRecord};
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use uuid::Uuid;

/// Outcome of a check-then-write performed inside one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guarded<T> {
    /// The target row does not exist.
    Missing,
    /// The target exists but the caller may not perform the write.
    Denied,
    Done(T),
}

impl<T> Guarded<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Guarded<U> {
        match self {
            Self::Missing => Guarded::Missing,
            Self::Denied => Guarded::Denied,
            Self::Done(v) => Guarded::Done(f(v)),
        }
    }
}

/// Current time at the precision the database stores.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Timestamp format used for every `created_at`/`updated_at` column.
/// Fixed width, so text ordering matches time ordering.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') has no timezone. Parse as naive UTC.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .with_context(|| format!("corrupt timestamp '{}'", raw))
}

pub fn parse_id(field: &str, raw: &str) -> Result<Uuid> {
    raw.parse::<Uuid>()
        .with_context(|| format!("corrupt {} '{}'", field, raw))
}

#[derive(Debug, Clone)]
pub struct ContentRow {
    pub id: String,
    pub kind: String,
    pub scope_id: String,
    pub parent_id: Option<String>,
    pub reply_to: Option<String>,
    pub author_id: String,
    pub body: String,
    pub edited: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl ContentRow {
    pub fn from_node(node: &ContentNode) -> Self {
        Self {
            id: node.id.to_string(),
            kind: node.kind.as_str().to_string(),
            scope_id: node.scope_id.to_string(),
            parent_id: node.parent_id.map(|id| id.to_string()),
            reply_to: node.reply_to.map(|id| id.to_string()),
            author_id: node.author_id.to_string(),
            body: node.body.clone(),
            edited: node.edited,
            created_at: timestamp(node.created_at),
            updated_at: timestamp(node.updated_at),
        }
    }

    pub fn into_node(self) -> Result<ContentNode> {
        Ok(ContentNode {
            id: parse_id("content id", &self.id)?,
            kind: ContentKind::parse(&self.kind)
                .ok_or_else(|| anyhow!("unknown content kind '{}' on '{}'", self.kind, self.id))?,
            scope_id: parse_id("scope_id", &self.scope_id)?,
            parent_id: self.parent_id.as_deref().map(|p| parse_id("parent_id", p)).transpose()?,
            reply_to: self.reply_to.as_deref().map(|r| parse_id("reply_to", r)).transpose()?,
            author_id: parse_id("author_id", &self.author_id)?,
            body: self.body,
            edited: self.edited,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

pub struct LikeRow {
    pub node_id: String,
    pub user_id: String,
}

pub struct ReactionRow {
    pub node_id: String,
    pub user_id: String,
    pub emoji: String,
    pub created_at: String,
}

pub struct ConversationRow {
    pub id: String,
    pub member_ids: Vec<String>,
    pub created_at: String,
}

pub struct PollRow {
    pub id: String,
    pub creator_id: String,
    pub question: String,
    pub created_at: String,
}

pub struct PollOptionRow {
    pub idx: i64,
    pub text: String,
}

pub struct PollVoteRow {
    pub user_id: String,
    pub option_idx: i64,
}

/// A poll with every option and every vote, read in one transaction.
pub struct PollSnapshot {
    pub poll: PollRow,
    pub options: Vec<PollOptionRow>,
    pub votes: Vec<PollVoteRow>,
}

/// What a vote replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteChange {
    pub previous: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: String,
    pub kind: String,
    pub recipient_id: String,
    pub from_user_id: String,
    pub message: String,
    pub action_url: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

impl NotificationRow {
    pub fn from_record(record: &NotificationRecord) -> Self {
        Self {
            id: record.id.to_string(),
            kind: record.kind.as_str().to_string(),
            recipient_id: record.recipient_id.to_string(),
            from_user_id: record.from_user_id.to_string(),
            message: record.message.clone(),
            action_url: record.action_url.clone(),
            is_read: record.is_read,
            created_at: timestamp(record.created_at),
        }
    }

    pub fn into_record(self) -> Result<NotificationRecord> {
        Ok(NotificationRecord {
            id: parse_id("notification id", &self.id)?,
            kind: NotificationKind::parse(&self.kind)
                .ok_or_else(|| anyhow!("unknown notification kind '{}' on '{}'", self.kind, self.id))?,
            recipient_id: parse_id("recipient_id", &self.recipient_id)?,
            from_user_id: parse_id("from_user_id", &self.from_user_id)?,
            message: self.message,
            action_url: self.action_url,
            is_read: self.is_read,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}
