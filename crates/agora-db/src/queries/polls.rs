use anyhow::Result;
use rusqlite::Connection;

use super::OptionalExt;
use crate::Database;
use crate::models::{Guarded, PollOptionRow, PollRow, PollSnapshot, PollVoteRow, VoteChange};

impl Database {
    // -- Polls --

    pub fn insert_poll(&self, poll: &PollRow, options: &[String]) -> Result<()> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO polls (id, creator_id, question, created_at) VALUES (?1, ?2, ?3, ?4)",
                [&poll.id, &poll.creator_id, &poll.question, &poll.created_at],
            )?;
            for (idx, text) in options.iter().enumerate() {
                tx.execute(
                    "INSERT INTO poll_options (poll_id, idx, text) VALUES (?1, ?2, ?3)",
                    rusqlite::params![poll.id, idx as i64, text],
                )?;
            }
            Ok(())
        })
    }

    /// Poll, options and votes read under one lock, so the tally is consistent.
    pub fn get_poll(&self, id: &str) -> Result<Option<PollSnapshot>> {
        self.with_conn(|conn| query_poll(conn, id))
    }

    /// Move the user's vote to `option_idx`.
    ///
    /// Any previous vote of the user in this poll is removed before the new
    /// one is inserted, inside one transaction. Voting for the current choice
    /// changes nothing. `Missing` if the poll does not exist, `Denied` if the
    /// option does not.
    pub fn cast_vote(&self, poll_id: &str, user_id: &str, option_idx: i64, at: &str) -> Result<Guarded<VoteChange>> {
        self.with_tx(|tx| {
            if !poll_exists(tx, poll_id)? {
                return Ok(Guarded::Missing);
            }
            let option_exists: i64 = tx.query_row(
                "SELECT COUNT(*) FROM poll_options WHERE poll_id = ?1 AND idx = ?2",
                rusqlite::params![poll_id, option_idx],
                |r| r.get(0),
            )?;
            if option_exists == 0 {
                return Ok(Guarded::Denied);
            }

            let previous = query_choice(tx, poll_id, user_id)?;
            if previous == Some(option_idx) {
                return Ok(Guarded::Done(VoteChange { previous }));
            }

            tx.execute(
                "DELETE FROM poll_votes WHERE poll_id = ?1 AND user_id = ?2",
                [poll_id, user_id],
            )?;
            tx.execute(
                "INSERT INTO poll_votes (poll_id, user_id, option_idx, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![poll_id, user_id, option_idx, at],
            )?;
            Ok(Guarded::Done(VoteChange { previous }))
        })
    }

    /// Remove the user's vote. Returns the option it was on, if any.
    pub fn retract_vote(&self, poll_id: &str, user_id: &str) -> Result<Guarded<Option<i64>>> {
        self.with_tx(|tx| {
            if !poll_exists(tx, poll_id)? {
                return Ok(Guarded::Missing);
            }
            let previous = query_choice(tx, poll_id, user_id)?;
            tx.execute(
                "DELETE FROM poll_votes WHERE poll_id = ?1 AND user_id = ?2",
                [poll_id, user_id],
            )?;
            Ok(Guarded::Done(previous))
        })
    }
}

fn poll_exists(conn: &Connection, poll_id: &str) -> Result<bool> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM polls WHERE id = ?1", [poll_id], |r| r.get(0))?;
    Ok(n > 0)
}

fn query_choice(conn: &Connection, poll_id: &str, user_id: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT option_idx FROM poll_votes WHERE poll_id = ?1 AND user_id = ?2",
        [poll_id, user_id],
        |r| r.get(0),
    )
    .optional()
}

fn query_poll(conn: &Connection, id: &str) -> Result<Option<PollSnapshot>> {
    let Some(poll) = conn
        .query_row(
            "SELECT id, creator_id, question, created_at FROM polls WHERE id = ?1",
            [id],
            |row| {
                Ok(PollRow {
                    id: row.get(0)?,
                    creator_id: row.get(1)?,
                    question: row.get(2)?,
                    created_at: row.get(3)?,
                })
            },
        )
        .optional()?
    else {
        return Ok(None);
    };

    let mut stmt = conn.prepare("SELECT idx, text FROM poll_options WHERE poll_id = ?1 ORDER BY idx")?;
    let options = stmt
        .query_map([id], |row| {
            Ok(PollOptionRow {
                idx: row.get(0)?,
                text: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare("SELECT user_id, option_idx FROM poll_votes WHERE poll_id = ?1 ORDER BY created_at")?;
    let votes = stmt
        .query_map([id], |row| {
            Ok(PollVoteRow {
                user_id: row.get(0)?,
                option_idx: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Some(PollSnapshot { poll, options, votes }))
}
