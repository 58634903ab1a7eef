use anyhow::Result;
use rusqlite::Connection;

use super::OptionalExt;
use crate::Database;
use crate::models::ConversationRow;

impl Database {
    // -- Conversations --

    pub fn create_conversation(&self, id: &str, member_ids: &[String], created_at: &str) -> Result<()> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO conversations (id, created_at) VALUES (?1, ?2)",
                [id, created_at],
            )?;
            for member in member_ids {
                tx.execute(
                    "INSERT OR IGNORE INTO conversation_members (conversation_id, user_id) VALUES (?1, ?2)",
                    [id, member.as_str()],
                )?;
            }
            Ok(())
        })
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let Some(created_at) = conn
                .query_row("SELECT created_at FROM conversations WHERE id = ?1", [id], |r| {
                    r.get::<_, String>(0)
                })
                .optional()?
            else {
                return Ok(None);
            };

            Ok(Some(ConversationRow {
                id: id.to_string(),
                member_ids: query_members(conn, id)?,
                created_at,
            }))
        })
    }
}

fn query_members(conn: &Connection, conversation_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT user_id FROM conversation_members WHERE conversation_id = ?1 ORDER BY rowid")?;
    let rows = stmt
        .query_map([conversation_id], |r| r.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(rows)
}
