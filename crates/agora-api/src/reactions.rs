use std::collections::HashMap;
use std::sync::Arc;

use agora_db::Database;
use agora_db::models::{ReactionRow, now, timestamp};
use agora_types::models::{LikeState, ReactionGroup};
use tracing::warn;
use uuid::Uuid;

use crate::blocking;
use crate::error::InteractionError;

const MAX_EMOJI_BYTES: usize = 64;

/// Keyed multiset of `(node, key, user)` memberships: likes (toggle) and
/// emoji reactions (ensure-present / explicit remove).
#[derive(Clone)]
pub struct ReactionSet {
    db: Arc<Database>,
}

impl ReactionSet {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Like if not liked, unlike if liked. One storage transaction.
    pub async fn toggle_like(&self, node_id: Uuid, user_id: Uuid) -> Result<LikeState, InteractionError> {
        let at = timestamp(now());
        let result = blocking::run(&self.db, move |db| {
            db.toggle_like(&node_id.to_string(), &user_id.to_string(), &at)
        })
        .await?;

        let (liked, like_count) = result.ok_or(InteractionError::NotFound("content"))?;
        Ok(LikeState { liked, like_count })
    }

    /// Make sure the reaction exists. Returns whether it was newly added.
    pub async fn ensure(&self, node_id: Uuid, user_id: Uuid, emoji: &str) -> Result<bool, InteractionError> {
        let emoji = validate_emoji(emoji)?.to_string();
        let at = timestamp(now());
        blocking::run(&self.db, move |db| {
            db.ensure_reaction(&node_id.to_string(), &user_id.to_string(), &emoji, &at)
        })
        .await?
        .ok_or(InteractionError::NotFound("content"))
    }

    /// Remove the reaction. Returns whether it existed.
    pub async fn remove(&self, node_id: Uuid, user_id: Uuid, emoji: &str) -> Result<bool, InteractionError> {
        let emoji = validate_emoji(emoji)?.to_string();
        blocking::run(&self.db, move |db| {
            db.remove_reaction(&node_id.to_string(), &user_id.to_string(), &emoji)
        })
        .await?
        .ok_or(InteractionError::NotFound("content"))
    }

    /// Reaction groups per node, in order of each emoji's first use.
    pub async fn groups(&self, node_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<ReactionGroup>>, InteractionError> {
        let ids: Vec<String> = node_ids.iter().map(Uuid::to_string).collect();
        let rows = blocking::run(&self.db, move |db| db.reactions_for(&ids)).await?;
        Ok(group_reactions(rows))
    }

    pub async fn groups_of(&self, node_id: Uuid) -> Result<Vec<ReactionGroup>, InteractionError> {
        Ok(self.groups(&[node_id]).await?.remove(&node_id).unwrap_or_default())
    }

    /// Users who like each node, in like order.
    pub async fn likers(&self, node_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<Uuid>>, InteractionError> {
        let ids: Vec<String> = node_ids.iter().map(Uuid::to_string).collect();
        let rows = blocking::run(&self.db, move |db| db.likes_for(&ids)).await?;

        let mut likers: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for row in rows {
            match (row.node_id.parse::<Uuid>(), row.user_id.parse::<Uuid>()) {
                (Ok(node), Ok(user)) => likers.entry(node).or_default().push(user),
                _ => warn!("Corrupt like row '{}'/'{}'", row.node_id, row.user_id),
            }
        }
        Ok(likers)
    }
}

pub fn validate_emoji(emoji: &str) -> Result<&str, InteractionError> {
    let emoji = emoji.trim();
    if emoji.is_empty() {
        return Err(InteractionError::validation("emoji must not be empty"));
    }
    if emoji.len() > MAX_EMOJI_BYTES || emoji.chars().any(char::is_whitespace) {
        return Err(InteractionError::validation("emoji must be a single short token"));
    }
    Ok(emoji)
}

/// Group reactions by node_id -> emoji -> user_ids.
fn group_reactions(rows: Vec<ReactionRow>) -> HashMap<Uuid, Vec<ReactionGroup>> {
    let mut grouped: HashMap<Uuid, Vec<ReactionGroup>> = HashMap::new();
    for r in rows {
        let (Ok(node_id), Ok(user_id)) = (r.node_id.parse::<Uuid>(), r.user_id.parse::<Uuid>()) else {
            warn!("Corrupt reaction row '{}'/'{}'", r.node_id, r.user_id);
            continue;
        };

        let groups = grouped.entry(node_id).or_default();
        match groups.iter_mut().find(|g| g.emoji == r.emoji) {
            Some(group) => {
                group.count += 1;
                group.user_ids.push(user_id);
            }
            None => groups.push(ReactionGroup {
                emoji: r.emoji,
                count: 1,
                user_ids: vec![user_id],
            }),
        }
    }
    grouped
}
