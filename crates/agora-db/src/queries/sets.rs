use anyhow::Result;
use rusqlite::Connection;

use super::placeholders;
use crate::Database;
use crate::models::{LikeRow, ReactionRow};

impl Database {
    // -- Likes --

    /// Toggle a like: removes if present, inserts if not.
    ///
    /// Returns `None` if the node does not exist, otherwise
    /// `(liked, like_count)` after the toggle. The conditional delete and the
    /// fallback insert run in one transaction.
    pub fn toggle_like(&self, node_id: &str, user_id: &str, at: &str) -> Result<Option<(bool, usize)>> {
        self.with_tx(|tx| {
            if !node_exists(tx, node_id)? {
                return Ok(None);
            }

            let removed = tx.execute(
                "DELETE FROM likes WHERE node_id = ?1 AND user_id = ?2",
                [node_id, user_id],
            )?;
            if removed == 0 {
                tx.execute(
                    "INSERT INTO likes (node_id, user_id, created_at) VALUES (?1, ?2, ?3)",
                    [node_id, user_id, at],
                )?;
            }

            let count: i64 = tx.query_row("SELECT COUNT(*) FROM likes WHERE node_id = ?1", [node_id], |r| r.get(0))?;
            Ok(Some((removed == 0, count as usize)))
        })
    }

    pub fn likes_for(&self, node_ids: &[String]) -> Result<Vec<LikeRow>> {
        if node_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT node_id, user_id FROM likes WHERE node_id IN ({}) ORDER BY created_at",
                placeholders(node_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(node_ids), |row| {
                    Ok(LikeRow {
                        node_id: row.get(0)?,
                        user_id: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Reactions --

    /// Ensure a reaction exists. Returns `None` if the node does not exist,
    /// otherwise whether a row was inserted (`false` if it was already there).
    pub fn ensure_reaction(&self, node_id: &str, user_id: &str, emoji: &str, at: &str) -> Result<Option<bool>> {
        self.with_tx(|tx| {
            if !node_exists(tx, node_id)? {
                return Ok(None);
            }
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO reactions (node_id, user_id, emoji, created_at) VALUES (?1, ?2, ?3, ?4)",
                [node_id, user_id, emoji, at],
            )?;
            Ok(Some(inserted == 1))
        })
    }

    /// Remove a reaction. Returns `None` if the node does not exist,
    /// otherwise whether a row was deleted.
    pub fn remove_reaction(&self, node_id: &str, user_id: &str, emoji: &str) -> Result<Option<bool>> {
        self.with_tx(|tx| {
            if !node_exists(tx, node_id)? {
                return Ok(None);
            }
            let removed = tx.execute(
                "DELETE FROM reactions WHERE node_id = ?1 AND user_id = ?2 AND emoji = ?3",
                [node_id, user_id, emoji],
            )?;
            Ok(Some(removed == 1))
        })
    }

    /// Batch-fetch reactions for a set of node IDs.
    pub fn reactions_for(&self, node_ids: &[String]) -> Result<Vec<ReactionRow>> {
        if node_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT node_id, user_id, emoji, created_at FROM reactions WHERE node_id IN ({}) ORDER BY created_at",
                placeholders(node_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(node_ids), |row| {
                    Ok(ReactionRow {
                        node_id: row.get(0)?,
                        user_id: row.get(1)?,
                        emoji: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn node_exists(conn: &Connection, node_id: &str) -> Result<bool> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM content_nodes WHERE id = ?1", [node_id], |r| r.get(0))?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentRow;

    fn seed(db: &Database, id: &str) {
        db.insert_content(&ContentRow {
            id: id.into(),
            kind: "message".into(),
            scope_id: "conv".into(),
            parent_id: None,
            reply_to: None,
            author_id: "alice".into(),
            body: "hi".into(),
            edited: false,
            created_at: "2024-01-01T00:00:00.000000Z".into(),
            updated_at: "2024-01-01T00:00:00.000000Z".into(),
        })
        .unwrap();
    }

    #[test]
    fn like_toggles_back_to_original() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, "m1");

        assert_eq!(db.toggle_like("m1", "bob", "t").unwrap(), Some((true, 1)));
        assert_eq!(db.toggle_like("m1", "carol", "t").unwrap(), Some((true, 2)));
        assert_eq!(db.toggle_like("m1", "bob", "t").unwrap(), Some((false, 1)));
        assert_eq!(db.toggle_like("missing", "bob", "t").unwrap(), None);

        let likers: Vec<String> = db.likes_for(&["m1".into()]).unwrap().into_iter().map(|l| l.user_id).collect();
        assert_eq!(likers, vec!["carol".to_string()]);
    }

    #[test]
    fn reactions_are_ensure_present() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, "m1");

        assert_eq!(db.ensure_reaction("m1", "bob", "👍", "t").unwrap(), Some(true));
        assert_eq!(db.ensure_reaction("m1", "bob", "👍", "t").unwrap(), Some(false));
        assert_eq!(db.ensure_reaction("m1", "bob", "🎉", "t").unwrap(), Some(true));
        assert_eq!(db.reactions_for(&["m1".into()]).unwrap().len(), 2);

        assert_eq!(db.remove_reaction("m1", "bob", "👍").unwrap(), Some(true));
        assert_eq!(db.remove_reaction("m1", "bob", "👍").unwrap(), Some(false));
        assert_eq!(db.ensure_reaction("nope", "bob", "👍", "t").unwrap(), None);
    }
}
