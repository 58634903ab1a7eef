use anyhow::Result;
use rusqlite::Connection;

use super::OptionalExt;
use crate::Database;
use crate::models::{Guarded, NotificationRow};

impl Database {
    // -- Notifications --

    pub fn insert_notification(&self, row: &NotificationRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, kind, recipient_id, from_user_id, message, action_url, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    row.id,
                    row.kind,
                    row.recipient_id,
                    row.from_user_id,
                    row.message,
                    row.action_url,
                    row.is_read,
                    row.created_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Newest first.
    pub fn list_notifications(&self, recipient_id: &str, limit: u32) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, kind, recipient_id, from_user_id, message, action_url, is_read, created_at
                 FROM notifications
                 WHERE recipient_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![recipient_id, limit], |row| {
                    Ok(NotificationRow {
                        id: row.get(0)?,
                        kind: row.get(1)?,
                        recipient_id: row.get(2)?,
                        from_user_id: row.get(3)?,
                        message: row.get(4)?,
                        action_url: row.get(5)?,
                        is_read: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Flip `is_read` once. Returns whether this call changed anything.
    pub fn mark_notification_read(&self, id: &str, recipient_id: &str) -> Result<Guarded<bool>> {
        self.with_tx(|tx| {
            let Some(owner) = query_recipient(tx, id)? else {
                return Ok(Guarded::Missing);
            };
            if owner != recipient_id {
                return Ok(Guarded::Denied);
            }
            let changed = tx.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND is_read = 0",
                [id],
            )?;
            Ok(Guarded::Done(changed == 1))
        })
    }

    pub fn mark_all_notifications_read(&self, recipient_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE recipient_id = ?1 AND is_read = 0",
                [recipient_id],
            )?;
            Ok(changed)
        })
    }

    pub fn delete_notification(&self, id: &str, recipient_id: &str) -> Result<Guarded<()>> {
        self.with_tx(|tx| {
            let Some(owner) = query_recipient(tx, id)? else {
                return Ok(Guarded::Missing);
            };
            if owner != recipient_id {
                return Ok(Guarded::Denied);
            }
            tx.execute("DELETE FROM notifications WHERE id = ?1", [id])?;
            Ok(Guarded::Done(()))
        })
    }

    pub fn unread_count(&self, recipient_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND is_read = 0",
                [recipient_id],
                |r| r.get(0),
            )?;
            Ok(n as u64)
        })
    }
}

fn query_recipient(conn: &Connection, id: &str) -> Result<Option<String>> {
    conn.query_row("SELECT recipient_id FROM notifications WHERE id = ?1", [id], |r| r.get(0))
        .optional()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, recipient: &str, created_at: &str) -> NotificationRow {
        NotificationRow {
            id: id.into(),
            kind: "like".into(),
            recipient_id: recipient.into(),
            from_user_id: "bob".into(),
            message: "bob liked your comment".into(),
            action_url: None,
            is_read: false,
            created_at: created_at.into(),
        }
    }

    #[test]
    fn read_flag_is_monotonic() {
        let db = Database::open_in_memory().unwrap();
        db.insert_notification(&row("n1", "alice", "2024-01-01T00:00:00.000000Z")).unwrap();
        db.insert_notification(&row("n2", "alice", "2024-01-02T00:00:00.000000Z")).unwrap();
        assert_eq!(db.unread_count("alice").unwrap(), 2);

        assert_eq!(db.mark_notification_read("n1", "alice").unwrap(), Guarded::Done(true));
        assert_eq!(db.mark_notification_read("n1", "alice").unwrap(), Guarded::Done(false));
        assert_eq!(db.mark_notification_read("n1", "mallory").unwrap(), Guarded::Denied);
        assert_eq!(db.mark_notification_read("n9", "alice").unwrap(), Guarded::Missing);
        assert_eq!(db.unread_count("alice").unwrap(), 1);

        assert_eq!(db.mark_all_notifications_read("alice").unwrap(), 1);
        assert_eq!(db.unread_count("alice").unwrap(), 0);
    }

    #[test]
    fn list_is_newest_first_and_delete_is_owner_only() {
        let db = Database::open_in_memory().unwrap();
        db.insert_notification(&row("n1", "alice", "2024-01-01T00:00:00.000000Z")).unwrap();
        db.insert_notification(&row("n2", "alice", "2024-01-02T00:00:00.000000Z")).unwrap();

        let ids: Vec<String> = db.list_notifications("alice", 10).unwrap().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["n2".to_string(), "n1".to_string()]);

        assert_eq!(db.delete_notification("n1", "bob").unwrap(), Guarded::Denied);
        assert_eq!(db.delete_notification("n1", "alice").unwrap(), Guarded::Done(()));
        assert_eq!(db.delete_notification("n1", "alice").unwrap(), Guarded::Missing);
        assert_eq!(db.list_notifications("alice", 10).unwrap().len(), 1);
    }
}
