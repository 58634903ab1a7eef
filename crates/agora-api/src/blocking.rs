use std::sync::Arc;

use agora_db::Database;
use tracing::error;

use crate::error::InteractionError;

/// Run one storage closure off the async runtime.
///
/// Each closure is one logical operation; it must not be split across
/// several calls when the operation reads then writes.
pub(crate) async fn run<F, T>(db: &Arc<Database>, f: F) -> Result<T, InteractionError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            InteractionError::Storage(anyhow::anyhow!("blocking task failed: {}", e))
        })?
        .map_err(InteractionError::Storage)
}
