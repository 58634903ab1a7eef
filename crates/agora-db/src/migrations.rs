use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS content_nodes (
            id          TEXT PRIMARY KEY,
            kind        TEXT NOT NULL CHECK (kind IN ('comment', 'message')),
            scope_id    TEXT NOT NULL,
            parent_id   TEXT REFERENCES content_nodes(id) ON DELETE CASCADE,
            reply_to    TEXT,
            author_id   TEXT NOT NULL,
            body        TEXT NOT NULL,
            edited      INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_content_scope
            ON content_nodes(kind, scope_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_content_parent
            ON content_nodes(parent_id);

        -- One row per (node, user): membership is the like
        CREATE TABLE IF NOT EXISTS likes (
            node_id     TEXT NOT NULL REFERENCES content_nodes(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (node_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS reactions (
            node_id     TEXT NOT NULL REFERENCES content_nodes(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL,
            emoji       TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (node_id, user_id, emoji)
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id          TEXT PRIMARY KEY,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS conversation_members (
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            user_id         TEXT NOT NULL,
            PRIMARY KEY (conversation_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS polls (
            id          TEXT PRIMARY KEY,
            creator_id  TEXT NOT NULL,
            question    TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS poll_options (
            poll_id     TEXT NOT NULL REFERENCES polls(id) ON DELETE CASCADE,
            idx         INTEGER NOT NULL,
            text        TEXT NOT NULL,
            PRIMARY KEY (poll_id, idx)
        );

        -- The primary key is the one-vote-per-user-per-poll invariant
        CREATE TABLE IF NOT EXISTS poll_votes (
            poll_id     TEXT NOT NULL,
            user_id     TEXT NOT NULL,
            option_idx  INTEGER NOT NULL,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (poll_id, user_id),
            FOREIGN KEY (poll_id, option_idx)
                REFERENCES poll_options(poll_id, idx) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS notifications (
            id            TEXT PRIMARY KEY,
            kind          TEXT NOT NULL,
            recipient_id  TEXT NOT NULL,
            from_user_id  TEXT NOT NULL,
            message       TEXT NOT NULL,
            action_url    TEXT,
            is_read       INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_recipient
            ON notifications(recipient_id, is_read, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
