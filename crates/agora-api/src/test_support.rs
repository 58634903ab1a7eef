use std::sync::Arc;

use agora_db::Database;
use agora_db::models::{ContentRow, now, timestamp};
use agora_gateway::dispatcher::Dispatcher;
use agora_gateway::registry::{ConnectionId, ConnectionRegistry, OutboundEvent};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::notifications::NotificationFanout;
use crate::polls::PollEngine;
use crate::threads::ThreadedContentStore;

/// In-memory database plus a live registry.
pub(crate) struct Harness {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            db: Arc::new(Database::open_in_memory().unwrap()),
            dispatcher: Dispatcher::new(ConnectionRegistry::new()),
        }
    }

    pub fn notifications(&self) -> NotificationFanout {
        NotificationFanout::new(self.db.clone(), self.dispatcher.clone())
    }

    pub fn store(&self) -> ThreadedContentStore {
        ThreadedContentStore::new(self.db.clone(), self.dispatcher.clone(), self.notifications())
    }

    pub fn polls(&self) -> PollEngine {
        PollEngine::new(self.db.clone(), self.dispatcher.clone(), self.notifications())
    }

    /// Open a fresh connection for `user` and return its receiving end.
    pub async fn listen(&self, user_id: Uuid) -> mpsc::Receiver<OutboundEvent> {
        let (tx, rx) = mpsc::channel(64);
        self.dispatcher
            .registry()
            .register(user_id, ConnectionId::new(), Arc::new(tx))
            .await;
        rx
    }

    /// A bare message row, bypassing conversation membership.
    pub async fn seed_message(&self) -> Uuid {
        let id = Uuid::new_v4();
        let at = timestamp(now());
        self.db
            .insert_content(&ContentRow {
                id: id.to_string(),
                kind: "message".into(),
                scope_id: Uuid::new_v4().to_string(),
                parent_id: None,
                reply_to: None,
                author_id: Uuid::new_v4().to_string(),
                body: "seed".into(),
                edited: false,
                created_at: at.clone(),
                updated_at: at,
            })
            .unwrap();
        id
    }
}

/// Everything queued on a connection so far, parsed.
pub(crate) fn drain(rx: &mut mpsc::Receiver<OutboundEvent>) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(serde_json::from_str(&event.json).unwrap());
    }
    out
}

/// Names of everything queued on a connection so far.
pub(crate) fn drain_names(rx: &mut mpsc::Receiver<OutboundEvent>) -> Vec<String> {
    drain(rx)
        .into_iter()
        .map(|v| v["type"].as_str().unwrap_or_default().to_string())
        .collect()
}
