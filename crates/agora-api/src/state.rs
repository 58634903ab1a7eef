use std::sync::Arc;

use agora_db::Database;
use agora_gateway::dispatcher::Dispatcher;
use agora_gateway::registry::ConnectionRegistry;

use crate::notifications::NotificationFanout;
use crate::polls::PollEngine;
use crate::threads::ThreadedContentStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub threads: ThreadedContentStore,
    pub polls: PollEngine,
    pub notifications: NotificationFanout,
    pub registry: ConnectionRegistry,
    pub jwt_secret: String,
}

impl AppStateInner {
    /// Wire every engine to one database and one dispatcher.
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher, jwt_secret: String) -> AppState {
        let notifications = NotificationFanout::new(db.clone(), dispatcher.clone());
        let registry = dispatcher.registry().clone();
        Arc::new(Self {
            threads: ThreadedContentStore::new(db.clone(), dispatcher.clone(), notifications.clone()),
            polls: PollEngine::new(db, dispatcher, notifications.clone()),
            notifications,
            registry,
            jwt_secret,
        })
    }
}
