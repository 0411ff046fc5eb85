use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE templates (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         INTEGER NOT NULL,
                name            TEXT NOT NULL,
                subject_part    TEXT NOT NULL,
                html_part       TEXT NOT NULL,
                text_part       TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                UNIQUE(user_id, name)
            );

            CREATE TABLE campaigns (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         INTEGER NOT NULL,
                name            TEXT NOT NULL,
                template_id     INTEGER NOT NULL REFERENCES templates(id),
                status          TEXT NOT NULL DEFAULT 'draft',
                started_at      TEXT,
                completed_at    TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_campaigns_status ON campaigns(status);

            CREATE TABLE segments (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         INTEGER NOT NULL,
                name            TEXT NOT NULL,
                UNIQUE(user_id, name)
            );

            CREATE TABLE subscribers (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         INTEGER NOT NULL,
                email           TEXT NOT NULL,
                name            TEXT NOT NULL,
                metadata        TEXT,
                active          INTEGER NOT NULL DEFAULT 1,
                blacklisted     INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                UNIQUE(user_id, email)
            );

            -- keyset pagination order
            CREATE INDEX idx_subscribers_keyset
                ON subscribers(user_id, created_at, id);

            CREATE TABLE subscribers_segments (
                segment_id      INTEGER NOT NULL REFERENCES segments(id) ON DELETE CASCADE,
                subscriber_id   INTEGER NOT NULL REFERENCES subscribers(id) ON DELETE CASCADE,
                PRIMARY KEY (segment_id, subscriber_id)
            );

            CREATE INDEX idx_subscribers_segments_subscriber
                ON subscribers_segments(subscriber_id);

            CREATE TABLE send_logs (
                id              TEXT PRIMARY KEY,
                user_id         INTEGER NOT NULL,
                subscriber_id   INTEGER NOT NULL,
                campaign_id     INTEGER NOT NULL,
                status          TEXT NOT NULL,
                description     TEXT NOT NULL,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_send_logs_campaign ON send_logs(campaign_id);

            CREATE TABLE send_queue (
                correlation_id  TEXT PRIMARY KEY,
                campaign_id     INTEGER NOT NULL,
                user_id         INTEGER NOT NULL,
                subscriber_id   INTEGER NOT NULL,
                payload         TEXT NOT NULL,
                enqueued_at     TEXT NOT NULL
            );

            CREATE INDEX idx_send_queue_campaign ON send_queue(campaign_id, correlation_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
