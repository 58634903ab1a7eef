use std::collections::HashMap;
use std::sync::Arc;

use agora_db::Database;
use agora_db::models::{ContentRow, Guarded, now, parse_id, parse_timestamp, timestamp};
use agora_gateway::dispatcher::Dispatcher;
use agora_types::api::{ReactionResponse, ThreadNode};
use agora_types::events::GatewayEvent;
use agora_types::models::{ContentKind, ContentNode, Conversation, LikeState, NotificationKind, ReactionGroup, UserId};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::blocking;
use crate::error::InteractionError;
use crate::notifications::{NewNotification, NotificationFanout};
use crate::reactions::{ReactionSet, validate_emoji};

const MAX_BODY_CHARS: usize = 4000;
const MAX_PAGE: u32 = 200;

/// Position of the oldest message on the previous history page.
#[derive(Debug, Clone, Copy)]
pub struct MessageCursor {
    pub created_at: DateTime<Utc>,
    /// Breaks ties between messages sent in the same instant.
    pub id: Option<Uuid>,
}

/// Comments and chat messages: creation, author-only edits and deletes,
/// likes and reactions, plus the real-time fan-out that follows each
/// successful mutation.
///
/// Comments nest one level deep under a subject. Deleting a top-level
/// comment deletes its replies. Messages live in conversations, are visible
/// to members only, and may quote an earlier message through `reply_to`.
#[derive(Clone)]
pub struct ThreadedContentStore {
    db: Arc<Database>,
    reactions: ReactionSet,
    dispatcher: Dispatcher,
    notifier: NotificationFanout,
}

impl ThreadedContentStore {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher, notifier: NotificationFanout) -> Self {
        Self {
            reactions: ReactionSet::new(db.clone()),
            db,
            dispatcher,
            notifier,
        }
    }

    // -- Conversations --

    pub async fn open_conversation(
        &self,
        creator: UserId,
        member_ids: Vec<UserId>,
    ) -> Result<Conversation, InteractionError> {
        let mut members = vec![creator];
        for id in member_ids {
            if !members.contains(&id) {
                members.push(id);
            }
        }
        if members.len() < 2 {
            return Err(InteractionError::validation("a conversation needs at least one other member"));
        }

        let conversation = Conversation {
            id: Uuid::new_v4(),
            member_ids: members,
            created_at: now(),
        };

        let id = conversation.id.to_string();
        let member_keys: Vec<String> = conversation.member_ids.iter().map(Uuid::to_string).collect();
        let at = timestamp(conversation.created_at);
        blocking::run(&self.db, move |db| db.create_conversation(&id, &member_keys, &at)).await?;

        info!(
            "Conversation {} opened by {} with {} members",
            conversation.id,
            creator,
            conversation.member_ids.len()
        );
        Ok(conversation)
    }

    /// The conversation, if `viewer` is a member.
    pub async fn conversation(&self, id: Uuid, viewer: UserId) -> Result<Conversation, InteractionError> {
        let conversation = self.load_conversation(id).await?;
        if !conversation.member_ids.contains(&viewer) {
            return Err(InteractionError::Forbidden);
        }
        Ok(conversation)
    }

    async fn load_conversation(&self, id: Uuid) -> Result<Conversation, InteractionError> {
        let key = id.to_string();
        let row = blocking::run(&self.db, move |db| db.get_conversation(&key))
            .await?
            .ok_or(InteractionError::NotFound("conversation"))?;

        let member_ids = row
            .member_ids
            .iter()
            .map(|m| parse_id("member_id", m))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Conversation {
            id,
            member_ids,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }

    // -- Content --

    /// Post a comment (optionally replying to a top-level comment) or send a
    /// chat message (optionally quoting an earlier one).
    pub async fn create(
        &self,
        kind: ContentKind,
        scope_id: Uuid,
        parent: Option<Uuid>,
        author: UserId,
        body: &str,
    ) -> Result<ContentNode, InteractionError> {
        let body = validate_body(body)?;
        if kind == ContentKind::Message {
            self.conversation(scope_id, author).await?;
        }

        let at = now();
        let node = ContentNode {
            id: Uuid::new_v4(),
            kind,
            scope_id,
            parent_id: parent.filter(|_| kind == ContentKind::Comment),
            reply_to: parent.filter(|_| kind == ContentKind::Message),
            author_id: author,
            body,
            edited: false,
            created_at: at,
            updated_at: at,
        };

        let row = ContentRow::from_node(&node);
        match blocking::run(&self.db, move |db| db.insert_content(&row)).await? {
            Guarded::Missing => {
                return Err(InteractionError::NotFound(match kind {
                    ContentKind::Comment => "parent comment",
                    ContentKind::Message => "replied message",
                }));
            }
            Guarded::Denied => {
                return Err(InteractionError::validation("replies can only target top-level comments"));
            }
            Guarded::Done(()) => {}
        }
        debug!("{} {} created in {} by {}", kind.as_str(), node.id, scope_id, author);

        let audience = self.audience(&node, author).await;
        match kind {
            ContentKind::Comment => {
                self.dispatcher
                    .emit_to_users(&audience, &GatewayEvent::CommentNew { comment: node.clone() })
                    .await;

                if let Some(parent_id) = node.parent_id {
                    self.notify_author_of(parent_id, author, NotificationKind::Reply, "replied to your comment", &node)
                        .await;
                }
            }
            ContentKind::Message => {
                self.dispatcher
                    .emit_to_users(&audience, &GatewayEvent::ChatMessage { message: node.clone() })
                    .await;
            }
        }

        Ok(node)
    }

    /// Author-only body change. Parent and reply links are untouched.
    pub async fn edit(
        &self,
        kind: ContentKind,
        node_id: Uuid,
        editor: UserId,
        body: &str,
    ) -> Result<ContentNode, InteractionError> {
        let body = validate_body(body)?;

        let (id, editor_key, at) = (node_id.to_string(), editor.to_string(), timestamp(now()));
        let outcome = blocking::run(&self.db, move |db| {
            db.update_content_body(&id, kind.as_str(), &editor_key, &body, &at)
        })
        .await?;

        let node = match outcome {
            Guarded::Missing => return Err(InteractionError::NotFound(kind.as_str())),
            Guarded::Denied => return Err(InteractionError::Forbidden),
            Guarded::Done(row) => row.into_node()?,
        };

        let audience = self.audience(&node, editor).await;
        let event = match kind {
            ContentKind::Comment => GatewayEvent::CommentUpdated { comment: node.clone() },
            ContentKind::Message => GatewayEvent::ChatMessageUpdated { message: node.clone() },
        };
        self.dispatcher.emit_to_users(&audience, &event).await;

        Ok(node)
    }

    /// Author-only delete. Returns every removed id, cascaded replies included.
    pub async fn delete(
        &self,
        kind: ContentKind,
        node_id: Uuid,
        requester: UserId,
    ) -> Result<Vec<Uuid>, InteractionError> {
        // Resolved first so authors of cascaded replies are still told.
        let node = self.get_node(kind, node_id).await?;
        let audience = self.audience(&node, requester).await;

        let (id, requester_key) = (node_id.to_string(), requester.to_string());
        let outcome = blocking::run(&self.db, move |db| db.delete_content(&id, kind.as_str(), &requester_key)).await?;

        let removed_ids = match outcome {
            Guarded::Missing => return Err(InteractionError::NotFound(kind.as_str())),
            Guarded::Denied => return Err(InteractionError::Forbidden),
            Guarded::Done((_, removed)) => removed
                .iter()
                .map(|id| parse_id("content id", id))
                .collect::<anyhow::Result<Vec<_>>>()?,
        };
        info!(
            "{} {} deleted by {} ({} nodes removed)",
            kind.as_str(),
            node_id,
            requester,
            removed_ids.len()
        );

        let event = match kind {
            ContentKind::Comment => GatewayEvent::CommentDeleted {
                scope_id: node.scope_id,
                comment_id: node_id,
                removed_ids: removed_ids.clone(),
            },
            ContentKind::Message => GatewayEvent::ChatMessageDeleted {
                conversation_id: node.scope_id,
                message_id: node_id,
            },
        };
        self.dispatcher.emit_to_users(&audience, &event).await;

        Ok(removed_ids)
    }

    /// Like if not liked, unlike if liked.
    pub async fn toggle_like(&self, kind: ContentKind, node_id: Uuid, user: UserId) -> Result<LikeState, InteractionError> {
        let node = self.visible_node(kind, node_id, user).await?;
        let state = self.reactions.toggle_like(node_id, user).await?;

        let event = match kind {
            ContentKind::Comment => GatewayEvent::CommentLiked {
                scope_id: node.scope_id,
                comment_id: node_id,
                user_id: user,
                liked: state.liked,
                like_count: state.like_count,
            },
            ContentKind::Message => GatewayEvent::ChatMessageLiked {
                conversation_id: node.scope_id,
                message_id: node_id,
                user_id: user,
                liked: state.liked,
                like_count: state.like_count,
            },
        };
        let audience = self.audience(&node, user).await;
        self.dispatcher.emit_to_users(&audience, &event).await;

        if state.liked {
            let message = format!("liked your {}", kind.as_str());
            self.notify(node.author_id, user, NotificationKind::Like, message, &node).await;
        }

        Ok(state)
    }

    /// Ensure the user's reaction is present. Reacting twice is a no-op.
    pub async fn react(
        &self,
        kind: ContentKind,
        node_id: Uuid,
        user: UserId,
        emoji: &str,
    ) -> Result<ReactionResponse, InteractionError> {
        let emoji = validate_emoji(emoji)?.to_string();
        let node = self.visible_node(kind, node_id, user).await?;

        let changed = self.reactions.ensure(node_id, user, &emoji).await?;
        let reactions = self.reactions.groups_of(node_id).await?;

        if changed {
            self.emit_reaction(&node, user, &emoji, true, &reactions).await;
            let message = format!("reacted {} to your {}", emoji, kind.as_str());
            self.notify(node.author_id, user, NotificationKind::Reaction, message, &node).await;
        }

        Ok(ReactionResponse { changed, reactions })
    }

    /// Remove the user's reaction, if present.
    pub async fn unreact(
        &self,
        kind: ContentKind,
        node_id: Uuid,
        user: UserId,
        emoji: &str,
    ) -> Result<ReactionResponse, InteractionError> {
        let emoji = validate_emoji(emoji)?.to_string();
        let node = self.visible_node(kind, node_id, user).await?;

        let changed = self.reactions.remove(node_id, user, &emoji).await?;
        let reactions = self.reactions.groups_of(node_id).await?;

        if changed {
            self.emit_reaction(&node, user, &emoji, false, &reactions).await;
        }

        Ok(ReactionResponse { changed, reactions })
    }

    // -- Reads --

    pub async fn get(&self, kind: ContentKind, node_id: Uuid, viewer: UserId) -> Result<ContentNode, InteractionError> {
        self.visible_node(kind, node_id, viewer).await
    }

    /// Top-level comments of a subject, oldest first, with their replies.
    pub async fn thread(&self, subject_id: Uuid) -> Result<Vec<ThreadNode>, InteractionError> {
        let key = subject_id.to_string();
        let rows = blocking::run(&self.db, move |db| db.list_scope(ContentKind::Comment.as_str(), &key)).await?;
        let nodes = rows
            .into_iter()
            .map(ContentRow::into_node)
            .collect::<anyhow::Result<Vec<_>>>()?;

        let ids: Vec<Uuid> = nodes.iter().map(|n| n.id).collect();
        let mut likers = self.reactions.likers(&ids).await?;
        let mut groups = self.reactions.groups(&ids).await?;

        let mut top_level = Vec::new();
        let mut replies: HashMap<Uuid, Vec<ThreadNode>> = HashMap::new();
        for node in nodes {
            let liked_by = likers.remove(&node.id).unwrap_or_default();
            let entry = ThreadNode {
                like_count: liked_by.len(),
                liked_by,
                reactions: groups.remove(&node.id).unwrap_or_default(),
                replies: Vec::new(),
                node,
            };
            match entry.node.parent_id {
                Some(parent_id) => replies.entry(parent_id).or_default().push(entry),
                None => top_level.push(entry),
            }
        }
        for entry in &mut top_level {
            entry.replies = replies.remove(&entry.node.id).unwrap_or_default();
        }

        Ok(top_level)
    }

    /// A page of a conversation, newest first.
    pub async fn history(
        &self,
        conversation_id: Uuid,
        viewer: UserId,
        limit: u32,
        before: Option<MessageCursor>,
    ) -> Result<Vec<ContentNode>, InteractionError> {
        self.conversation(conversation_id, viewer).await?;

        let key = conversation_id.to_string();
        let limit = limit.clamp(1, MAX_PAGE);
        let before = before.map(|c| (timestamp(c.created_at), c.id.map(|id| id.to_string())));
        let rows = blocking::run(&self.db, move |db| {
            let before = before.as_ref().map(|(at, id)| (at.as_str(), id.as_deref()));
            db.list_messages(&key, limit, before)
        })
        .await?;

        let nodes = rows
            .into_iter()
            .map(ContentRow::into_node)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(nodes)
    }

    // -- Internals --

    async fn get_node(&self, kind: ContentKind, node_id: Uuid) -> Result<ContentNode, InteractionError> {
        let key = node_id.to_string();
        let row = blocking::run(&self.db, move |db| db.get_content(&key))
            .await?
            .filter(|row| row.kind == kind.as_str())
            .ok_or(InteractionError::NotFound(kind.as_str()))?;
        Ok(row.into_node()?)
    }

    /// The node, if `user` may see it. Messages are for conversation members.
    async fn visible_node(&self, kind: ContentKind, node_id: Uuid, user: UserId) -> Result<ContentNode, InteractionError> {
        let node = self.get_node(kind, node_id).await?;
        if kind == ContentKind::Message {
            self.conversation(node.scope_id, user).await?;
        }
        Ok(node)
    }

    /// Who hears about changes to `node`: everyone who has written in the
    /// subject for comments, every member for messages. Always includes the
    /// actor so their other tabs stay in sync.
    async fn audience(&self, node: &ContentNode, actor: UserId) -> Vec<UserId> {
        let resolved = match node.kind {
            ContentKind::Comment => {
                let key = node.scope_id.to_string();
                blocking::run(&self.db, move |db| db.scope_authors(ContentKind::Comment.as_str(), &key))
                    .await
                    .map(|ids| ids.iter().filter_map(|id| id.parse::<Uuid>().ok()).collect::<Vec<_>>())
            }
            ContentKind::Message => self.load_conversation(node.scope_id).await.map(|c| c.member_ids),
        };

        let mut audience = resolved.unwrap_or_else(|e| {
            warn!("Failed to resolve audience of {} {}: {}", node.kind.as_str(), node.id, e);
            Vec::new()
        });
        if !audience.contains(&actor) {
            audience.push(actor);
        }
        audience
    }

    async fn emit_reaction(&self, node: &ContentNode, user: UserId, emoji: &str, added: bool, reactions: &[ReactionGroup]) {
        let event = match node.kind {
            ContentKind::Comment => GatewayEvent::CommentReaction {
                scope_id: node.scope_id,
                comment_id: node.id,
                user_id: user,
                emoji: emoji.to_string(),
                added,
                reactions: reactions.to_vec(),
            },
            ContentKind::Message => GatewayEvent::ChatReaction {
                conversation_id: node.scope_id,
                message_id: node.id,
                user_id: user,
                emoji: emoji.to_string(),
                added,
                reactions: reactions.to_vec(),
            },
        };
        let audience = self.audience(node, user).await;
        self.dispatcher.emit_to_users(&audience, &event).await;
    }

    async fn notify_author_of(
        &self,
        target_id: Uuid,
        from: UserId,
        kind: NotificationKind,
        message: &str,
        about: &ContentNode,
    ) {
        match self.get_node(about.kind, target_id).await {
            Ok(target) => self.notify(target.author_id, from, kind, message.to_string(), about).await,
            // Deleted in the meantime; nobody left to tell.
            Err(InteractionError::NotFound(_)) => {}
            Err(e) => warn!("Failed to look up {} for notification: {}", target_id, e),
        }
    }

    /// Record a notification for `recipient`. The triggering mutation has
    /// already committed, so a failure here is logged, not returned.
    async fn notify(&self, recipient: UserId, from: UserId, kind: NotificationKind, message: String, about: &ContentNode) {
        let new = NewNotification {
            kind,
            recipient_id: recipient,
            from_user_id: from,
            message,
            action_url: Some(action_url(about)),
        };
        if let Err(e) = self.notifier.notify_others(new).await {
            warn!("Failed to record {} notification for {}: {}", kind.as_str(), recipient, e);
        }
    }
}

fn action_url(node: &ContentNode) -> String {
    match node.kind {
        ContentKind::Comment => format!("/subjects/{}/comments#{}", node.scope_id, node.id),
        ContentKind::Message => format!("/conversations/{}#{}", node.scope_id, node.id),
    }
}

fn validate_body(body: &str) -> Result<String, InteractionError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(InteractionError::validation("body must not be empty"));
    }
    if body.chars().count() > MAX_BODY_CHARS {
        return Err(InteractionError::validation(format!(
            "body must be at most {} characters",
            MAX_BODY_CHARS
        )));
    }
    Ok(body.to_string())
}
