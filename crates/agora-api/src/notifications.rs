use std::sync::Arc;

use agora_db::Database;
use agora_db::models::{Guarded, NotificationRow, now};
use agora_gateway::dispatcher::Dispatcher;
use agora_types::api::MarkReadResponse;
use agora_types::events::GatewayEvent;
use agora_types::models::{NotificationKind, NotificationRecord, UserId};
use tracing::debug;
use uuid::Uuid;

use crate::blocking;
use crate::error::InteractionError;

const MAX_LIST: u32 = 100;

/// A notification about to be recorded.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub recipient_id: UserId,
    pub from_user_id: UserId,
    pub message: String,
    pub action_url: Option<String>,
}

/// Persists notifications, then pushes them to the recipient's live
/// connections. The persisted record is the source of truth: unread counts
/// come from storage, never from who happened to be connected.
#[derive(Clone)]
pub struct NotificationFanout {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl NotificationFanout {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    pub async fn notify(&self, new: NewNotification) -> Result<NotificationRecord, InteractionError> {
        let record = NotificationRecord {
            id: Uuid::new_v4(),
            kind: new.kind,
            recipient_id: new.recipient_id,
            from_user_id: new.from_user_id,
            message: new.message,
            action_url: new.action_url,
            is_read: false,
            created_at: now(),
        };

        let row = NotificationRow::from_record(&record);
        blocking::run(&self.db, move |db| db.insert_notification(&row)).await?;

        let report = self
            .dispatcher
            .emit_to_user(record.recipient_id, &GatewayEvent::Notification(record.clone()))
            .await;
        debug!(
            "Notification {} for {} pushed to {} connections",
            record.id,
            record.recipient_id,
            report.delivered.len()
        );

        Ok(record)
    }

    /// Like [`notify`](Self::notify), but nobody is notified about their own actions.
    pub async fn notify_others(&self, new: NewNotification) -> Result<Option<NotificationRecord>, InteractionError> {
        if new.recipient_id == new.from_user_id {
            return Ok(None);
        }
        self.notify(new).await.map(Some)
    }

    /// Newest first.
    pub async fn list(&self, user_id: UserId, limit: u32) -> Result<Vec<NotificationRecord>, InteractionError> {
        let limit = limit.clamp(1, MAX_LIST);
        let rows = blocking::run(&self.db, move |db| db.list_notifications(&user_id.to_string(), limit)).await?;
        rows.into_iter()
            .map(|row| row.into_record().map_err(InteractionError::from))
            .collect()
    }

    /// Mark one notification read. Marking it again is a no-op.
    pub async fn mark_read(&self, id: Uuid, user_id: UserId) -> Result<MarkReadResponse, InteractionError> {
        let outcome = blocking::run(&self.db, move |db| {
            db.mark_notification_read(&id.to_string(), &user_id.to_string())
        })
        .await?;

        let changed = match outcome {
            Guarded::Missing => return Err(InteractionError::NotFound("notification")),
            Guarded::Denied => return Err(InteractionError::Forbidden),
            Guarded::Done(changed) => changed,
        };

        let unread = self.unread_count(user_id).await?;
        if changed {
            self.sync_read_state(user_id, Some(id), unread).await;
        }
        Ok(MarkReadResponse { changed, unread })
    }

    pub async fn mark_all_read(&self, user_id: UserId) -> Result<MarkReadResponse, InteractionError> {
        let changed = blocking::run(&self.db, move |db| db.mark_all_notifications_read(&user_id.to_string())).await?;
        let unread = self.unread_count(user_id).await?;
        if changed > 0 {
            self.sync_read_state(user_id, None, unread).await;
        }
        Ok(MarkReadResponse {
            changed: changed > 0,
            unread,
        })
    }

    pub async fn delete(&self, id: Uuid, user_id: UserId) -> Result<(), InteractionError> {
        let outcome = blocking::run(&self.db, move |db| {
            db.delete_notification(&id.to_string(), &user_id.to_string())
        })
        .await?;

        match outcome {
            Guarded::Missing => Err(InteractionError::NotFound("notification")),
            Guarded::Denied => Err(InteractionError::Forbidden),
            Guarded::Done(()) => Ok(()),
        }
    }

    pub async fn unread_count(&self, user_id: UserId) -> Result<u64, InteractionError> {
        blocking::run(&self.db, move |db| db.unread_count(&user_id.to_string())).await
    }

    /// Other tabs of the same user update their badge.
    async fn sync_read_state(&self, user_id: UserId, notification_id: Option<Uuid>, unread_count: u64) {
        self.dispatcher
            .emit_to_user(
                user_id,
                &GatewayEvent::NotificationRead {
                    notification_id,
                    unread_count,
                },
            )
            .await;
    }
}
