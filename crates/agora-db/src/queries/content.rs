use anyhow::Result;
use rusqlite::Connection;

use super::OptionalExt;
use crate::Database;
use crate::models::{ContentRow, Guarded};

const CONTENT_COLUMNS: &str =
    "id, kind, scope_id, parent_id, reply_to, author_id, body, edited, created_at, updated_at";

impl Database {
    // -- Content nodes --

    /// Insert a comment or message.
    ///
    /// A `parent_id` must name a top-level node of the same kind and scope
    /// (`Missing` if absent, `Denied` if it is itself a reply). A `reply_to`
    /// must name a node of the same kind and scope. Checks and insert share
    /// one transaction, so a concurrently deleted parent cannot be linked.
    pub fn insert_content(&self, row: &ContentRow) -> Result<Guarded<()>> {
        self.with_tx(|tx| {
            if let Some(parent_id) = &row.parent_id {
                match query_content(tx, parent_id)? {
                    Some(parent) if parent.kind == row.kind && parent.scope_id == row.scope_id => {
                        if parent.parent_id.is_some() {
                            return Ok(Guarded::Denied);
                        }
                    }
                    _ => return Ok(Guarded::Missing),
                }
            }

            if let Some(reply_to) = &row.reply_to {
                match query_content(tx, reply_to)? {
                    Some(target) if target.kind == row.kind && target.scope_id == row.scope_id => {}
                    _ => return Ok(Guarded::Missing),
                }
            }

            tx.execute(
                &format!("INSERT INTO content_nodes ({CONTENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
                rusqlite::params![
                    row.id,
                    row.kind,
                    row.scope_id,
                    row.parent_id,
                    row.reply_to,
                    row.author_id,
                    row.body,
                    row.edited,
                    row.created_at,
                    row.updated_at,
                ],
            )?;
            Ok(Guarded::Done(()))
        })
    }

    pub fn get_content(&self, id: &str) -> Result<Option<ContentRow>> {
        self.with_conn(|conn| query_content(conn, id))
    }

    /// Replace the body of a node if `editor` is its author.
    /// A node of another kind counts as missing.
    pub fn update_content_body(
        &self,
        id: &str,
        kind: &str,
        editor: &str,
        body: &str,
        updated_at: &str,
    ) -> Result<Guarded<ContentRow>> {
        self.with_tx(|tx| {
            let Some(mut row) = query_content(tx, id)?.filter(|r| r.kind == kind) else {
                return Ok(Guarded::Missing);
            };
            if row.author_id != editor {
                return Ok(Guarded::Denied);
            }

            tx.execute(
                "UPDATE content_nodes SET body = ?2, edited = 1, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id, body, updated_at],
            )?;

            row.body = body.to_string();
            row.edited = true;
            row.updated_at = updated_at.to_string();
            Ok(Guarded::Done(row))
        })
    }

    /// Delete a node if `requester` is its author.
    ///
    /// Replies are deleted with their parent. `reply_to` pointers at the node
    /// are cleared. Likes and reactions go with their nodes through the
    /// foreign keys. Returns the deleted row and every removed id, the
    /// node's own id first.
    pub fn delete_content(&self, id: &str, kind: &str, requester: &str) -> Result<Guarded<(ContentRow, Vec<String>)>> {
        self.with_tx(|tx| {
            let Some(row) = query_content(tx, id)?.filter(|r| r.kind == kind) else {
                return Ok(Guarded::Missing);
            };
            if row.author_id != requester {
                return Ok(Guarded::Denied);
            }

            let mut removed = vec![row.id.clone()];
            {
                let mut stmt = tx.prepare("SELECT id FROM content_nodes WHERE parent_id = ?1 ORDER BY created_at")?;
                let replies = stmt
                    .query_map([id], |r| r.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                removed.extend(replies);
            }

            tx.execute("UPDATE content_nodes SET reply_to = NULL WHERE reply_to = ?1", [id])?;
            tx.execute("DELETE FROM content_nodes WHERE parent_id = ?1", [id])?;
            tx.execute("DELETE FROM content_nodes WHERE id = ?1", [id])?;

            Ok(Guarded::Done((row, removed)))
        })
    }

    /// Every node of one kind in a scope, oldest first.
    pub fn list_scope(&self, kind: &str, scope_id: &str) -> Result<Vec<ContentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONTENT_COLUMNS} FROM content_nodes
                 WHERE kind = ?1 AND scope_id = ?2
                 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt
                .query_map([kind, scope_id], content_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Messages of a conversation, newest first.
    ///
    /// Cursor-based pagination: pass the `(created_at, id)` of the oldest
    /// message from the previous page as `before`. Messages sharing a
    /// timestamp are ordered by id, so none is skipped at a page boundary.
    /// Without an id the cursor is the timestamp alone.
    pub fn list_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        before: Option<(&str, Option<&str>)>,
    ) -> Result<Vec<ContentRow>> {
        let (before_at, before_id) = before.unzip();
        let before_id = before_id.flatten();
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONTENT_COLUMNS} FROM content_nodes
                 WHERE kind = 'message' AND scope_id = ?1
                   AND (?2 IS NULL OR created_at < ?2 OR (created_at = ?2 AND id < ?3))
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?4"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![conversation_id, before_at, before_id, limit], content_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Distinct authors who have posted in a scope.
    pub fn scope_authors(&self, kind: &str, scope_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT DISTINCT author_id FROM content_nodes WHERE kind = ?1 AND scope_id = ?2")?;
            let rows = stmt
                .query_map([kind, scope_id], |r| r.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(rows)
        })
    }
}

fn content_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContentRow> {
    Ok(ContentRow {
        id: row.get(0)?,
        kind: row.get(1)?,
        scope_id: row.get(2)?,
        parent_id: row.get(3)?,
        reply_to: row.get(4)?,
        author_id: row.get(5)?,
        body: row.get(6)?,
        edited: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

pub(super) fn query_content(conn: &Connection, id: &str) -> Result<Option<ContentRow>> {
    conn.query_row(
        &format!("SELECT {CONTENT_COLUMNS} FROM content_nodes WHERE id = ?1"),
        [id],
        content_row,
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::timestamp;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn row(kind: &str, scope: &str, author: &str, parent: Option<&str>) -> ContentRow {
        let now = timestamp(Utc::now());
        ContentRow {
            id: Uuid::new_v4().to_string(),
            kind: kind.into(),
            scope_id: scope.into(),
            parent_id: parent.map(str::to_string),
            reply_to: None,
            author_id: author.into(),
            body: "hello".into(),
            edited: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[test]
    fn reply_needs_existing_top_level_parent() {
        let db = Database::open_in_memory().unwrap();
        let scope = Uuid::new_v4().to_string();

        let top = row("comment", &scope, "alice", None);
        assert_eq!(db.insert_content(&top).unwrap(), Guarded::Done(()));

        let reply = row("comment", &scope, "bob", Some(&top.id));
        assert_eq!(db.insert_content(&reply).unwrap(), Guarded::Done(()));

        let nested = row("comment", &scope, "carol", Some(&reply.id));
        assert_eq!(db.insert_content(&nested).unwrap(), Guarded::Denied);

        let orphan = row("comment", &scope, "carol", Some("missing"));
        assert_eq!(db.insert_content(&orphan).unwrap(), Guarded::Missing);

        let other_scope = row("comment", "elsewhere", "carol", Some(&top.id));
        assert_eq!(db.insert_content(&other_scope).unwrap(), Guarded::Missing);
    }

    #[test]
    fn only_author_can_edit() {
        let db = Database::open_in_memory().unwrap();
        let node = row("comment", "s", "alice", None);
        db.insert_content(&node).unwrap();

        assert_eq!(
            db.update_content_body(&node.id, "comment", "bob", "hijack", "t").unwrap().map(|_| ()),
            Guarded::Denied
        );
        let Guarded::Done(updated) = db.update_content_body(&node.id, "comment", "alice", "fixed", "t").unwrap() else {
            panic!("author edit rejected");
        };
        assert_eq!(updated.body, "fixed");
        assert!(updated.edited);
        assert!(db.get_content(&node.id).unwrap().unwrap().edited);

        assert_eq!(
            db.update_content_body(&node.id, "message", "alice", "wrong kind", "t").unwrap().map(|_| ()),
            Guarded::Missing
        );
    }

    #[test]
    fn delete_cascades_replies_and_their_likes() {
        let db = Database::open_in_memory().unwrap();
        let top = row("comment", "s", "alice", None);
        let reply = row("comment", "s", "bob", Some(&top.id));
        db.insert_content(&top).unwrap();
        db.insert_content(&reply).unwrap();
        db.toggle_like(&reply.id, "carol", "t").unwrap();

        assert_eq!(db.delete_content(&top.id, "comment", "bob").unwrap().map(|_| ()), Guarded::Denied);

        let Guarded::Done((_, removed)) = db.delete_content(&top.id, "comment", "alice").unwrap() else {
            panic!("author delete rejected");
        };
        assert_eq!(removed, vec![top.id.clone(), reply.id.clone()]);
        assert!(db.get_content(&reply.id).unwrap().is_none());
        assert!(db.likes_for(&[reply.id.clone()]).unwrap().is_empty());
        assert!(db.list_scope("comment", "s").unwrap().is_empty());
    }

    #[test]
    fn deleting_quoted_message_clears_pointer() {
        let db = Database::open_in_memory().unwrap();
        let first = row("message", "conv", "alice", None);
        let mut second = row("message", "conv", "bob", None);
        second.reply_to = Some(first.id.clone());
        db.insert_content(&first).unwrap();
        db.insert_content(&second).unwrap();

        db.delete_content(&first.id, "message", "alice").unwrap();

        let second = db.get_content(&second.id).unwrap().unwrap();
        assert_eq!(second.reply_to, None);
    }

    #[test]
    fn message_pages_walk_backwards() {
        let db = Database::open_in_memory().unwrap();
        let start = Utc::now();
        let mut ids = Vec::new();
        for i in 0..5 {
            let mut m = row("message", "conv", "alice", None);
            m.created_at = timestamp(start + Duration::seconds(i));
            m.updated_at = m.created_at.clone();
            db.insert_content(&m).unwrap();
            ids.push(m.id);
        }

        let page = db.list_messages("conv", 2, None).unwrap();
        assert_eq!(page.iter().map(|m| m.id.clone()).collect::<Vec<_>>(), vec![ids[4].clone(), ids[3].clone()]);

        let older = db
            .list_messages("conv", 10, Some((page[1].created_at.as_str(), Some(page[1].id.as_str()))))
            .unwrap();
        assert_eq!(older.len(), 3);
        assert_eq!(older[0].id, ids[2]);

        let by_time_only = db.list_messages("conv", 10, Some((page[1].created_at.as_str(), None))).unwrap();
        assert_eq!(by_time_only.len(), 3);
    }

    #[test]
    fn same_instant_messages_survive_a_page_boundary() {
        let db = Database::open_in_memory().unwrap();
        let at = timestamp(Utc::now());
        for _ in 0..4 {
            let mut m = row("message", "conv", "alice", None);
            m.created_at = at.clone();
            m.updated_at = at.clone();
            db.insert_content(&m).unwrap();
        }

        let mut seen = Vec::new();
        let mut cursor: Option<(String, String)> = None;
        loop {
            let page = db
                .list_messages("conv", 3, cursor.as_ref().map(|(t, id)| (t.as_str(), Some(id.as_str()))))
                .unwrap();
            let Some(last) = page.last() else { break };
            cursor = Some((last.created_at.clone(), last.id.clone()));
            seen.extend(page.into_iter().map(|m| m.id));
        }

        assert_eq!(seen.len(), 4);
        let mut unique = seen.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 4);
    }
}
