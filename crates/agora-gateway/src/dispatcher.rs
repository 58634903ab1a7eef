use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use agora_types::events::GatewayEvent;

use crate::registry::{ConnectionId, ConnectionRegistry, DeliveryError, OutboundEvent};

/// Which connections an emit tried, and how each attempt went.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempted: Vec<ConnectionId>,
    pub delivered: Vec<ConnectionId>,
    pub failed: Vec<(ConnectionId, DeliveryError)>,
}

/// Fans events out to every live connection of the target users.
///
/// Delivery is best effort and happens now: a user without connections
/// simply misses the event, and a failed connection never blocks the others.
/// Durable state (notifications, unread counts) is fetched over REST.
#[derive(Clone)]
pub struct Dispatcher {
    registry: ConnectionRegistry,
}

impl Dispatcher {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Send an event to every connection of one user.
    pub async fn emit_to_user(&self, user_id: Uuid, event: &GatewayEvent) -> DeliveryReport {
        self.emit_to_users(&[user_id], event).await
    }

    /// Send an event to every connection of each user. Repeated user ids
    /// are delivered once.
    pub async fn emit_to_users(&self, user_ids: &[Uuid], event: &GatewayEvent) -> DeliveryReport {
        let mut seen = HashSet::with_capacity(user_ids.len());
        let targets: Vec<Uuid> = user_ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        let sinks = self.registry.sinks_for(&targets).await;
        if sinks.is_empty() {
            trace!("{}: no live connections among {} users", event.name(), targets.len());
            return DeliveryReport::default();
        }

        let json: Arc<str> = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                error!("Failed to serialize {}: {}", event.name(), e);
                return DeliveryReport::default();
            }
        };
        let outbound = OutboundEvent { name: event.name(), json };

        let mut report = DeliveryReport::default();
        for (user_id, conn_id, sink) in sinks {
            report.attempted.push(conn_id);
            match sink.try_deliver(outbound.clone()) {
                Ok(()) => report.delivered.push(conn_id),
                Err(e @ DeliveryError::Full) => {
                    warn!("Dropping {} for {} on {}: {}", outbound.name, user_id, conn_id, e);
                    report.failed.push((conn_id, e));
                }
                Err(e @ DeliveryError::Closed) => {
                    debug!("Dropping {} for {} on {}: {}", outbound.name, user_id, conn_id, e);
                    report.failed.push((conn_id, e));
                }
            }
        }

        report
    }
}
