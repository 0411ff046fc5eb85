use crate::models::{
    CampaignRow, CampaignTemplateRow, NewSubscriber, QueuedMessageRow, RecipientFilter, SendLogRow,
    SubscriberRow,
};
use crate::{Database, format_timestamp};
use anyhow::{Result, anyhow};
use chrono::Utc;
use rusqlite::types::ToSql;
use rusqlite::{Connection, Row};

const CAMPAIGN_COLUMNS: &str =
    "id, user_id, name, template_id, status, started_at, completed_at, created_at";

impl Database {
    // -- Templates --

    pub fn create_template(
        &self,
        user_id: i64,
        name: &str,
        subject_part: &str,
        html_part: &str,
        text_part: &str,
    ) -> Result<i64> {
        let now = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO templates (user_id, name, subject_part, html_part, text_part, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![user_id, name, subject_part, html_part, text_part, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// The template a campaign sends, scoped to the campaign's owner.
    pub fn get_campaign_template(
        &self,
        campaign_id: i64,
        user_id: i64,
    ) -> Result<Option<CampaignTemplateRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT c.id, c.name, t.subject_part, t.html_part, t.text_part
                 FROM campaigns c
                 JOIN templates t ON t.id = c.template_id AND t.user_id = c.user_id
                 WHERE c.id = ?1 AND c.user_id = ?2",
                [campaign_id, user_id],
                |row| {
                    Ok(CampaignTemplateRow {
                        campaign_id: row.get(0)?,
                        campaign_name: row.get(1)?,
                        subject_part: row.get(2)?,
                        html_part: row.get(3)?,
                        text_part: row.get(4)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Campaigns --

    pub fn create_campaign(&self, user_id: i64, name: &str, template_id: i64) -> Result<i64> {
        let now = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO campaigns (user_id, name, template_id, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'draft', ?4, ?4)",
                rusqlite::params![user_id, name, template_id, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_campaign(&self, id: i64, user_id: i64) -> Result<Option<CampaignRow>> {
        self.with_conn(|conn| query_campaign(conn, id, user_id))
    }

    /// Persist status and timestamps. Errors if the campaign does not exist.
    pub fn update_campaign(
        &self,
        id: i64,
        user_id: i64,
        status: &str,
        started_at: Option<&str>,
        completed_at: Option<&str>,
    ) -> Result<()> {
        let now = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE campaigns
                 SET status = ?1, started_at = ?2, completed_at = ?3, updated_at = ?4
                 WHERE id = ?5 AND user_id = ?6",
                rusqlite::params![status, started_at, completed_at, now, id, user_id],
            )?;
            if changed == 0 {
                return Err(anyhow!("Campaign not found: {} (user {})", id, user_id));
            }
            Ok(())
        })
    }

    /// Claim a draft campaign for dispatch in a single statement.
    /// Returns `false` when the campaign is missing or already past draft.
    pub fn begin_sending(&self, id: i64, user_id: i64, started_at: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE campaigns
                 SET status = 'sending', started_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND user_id = ?3 AND status = 'draft'",
                rusqlite::params![started_at, id, user_id],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn list_campaigns_by_status(&self, status: &str) -> Result<Vec<CampaignRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM campaigns WHERE status = ?1 ORDER BY started_at, id",
                CAMPAIGN_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([status], campaign_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Segments & subscribers --

    pub fn create_segment(&self, user_id: i64, name: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO segments (user_id, name) VALUES (?1, ?2)",
                rusqlite::params![user_id, name],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn create_subscriber(&self, sub: &NewSubscriber<'_>) -> Result<i64> {
        let created_at = format_timestamp(sub.created_at);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO subscribers (user_id, email, name, metadata, active, blacklisted, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    sub.user_id,
                    sub.email,
                    sub.name,
                    sub.metadata,
                    sub.active,
                    sub.blacklisted,
                    created_at
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn add_subscriber_to_segment(&self, segment_id: i64, subscriber_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO subscribers_segments (segment_id, subscriber_id) VALUES (?1, ?2)",
                [segment_id, subscriber_id],
            )?;
            Ok(())
        })
    }

    /// One keyset page of distinct subscribers belonging to any of the
    /// given segments, ordered by `(created_at, id)`.
    pub fn get_recipients_page(&self, filter: &RecipientFilter<'_>) -> Result<Vec<SubscriberRow>> {
        if filter.segment_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            // ?1..?6 are fixed, segment ids follow
            let placeholders: Vec<String> =
                (7..7 + filter.segment_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT s.id, s.user_id, s.email, s.name, s.metadata, s.active, s.blacklisted, s.created_at
                 FROM subscribers s
                 WHERE s.user_id = ?1
                   AND (?2 = 0 OR s.blacklisted = 0)
                   AND (?3 = 0 OR s.active = 1)
                   AND (s.created_at > ?4 OR (s.created_at = ?4 AND s.id > ?5))
                   AND EXISTS (
                       SELECT 1 FROM subscribers_segments ss
                       JOIN segments sg ON sg.id = ss.segment_id AND sg.user_id = s.user_id
                       WHERE ss.subscriber_id = s.id AND ss.segment_id IN ({})
                   )
                 ORDER BY s.created_at, s.id
                 LIMIT ?6",
                placeholders.join(", ")
            );

            let mut params: Vec<&dyn ToSql> = vec![
                &filter.user_id,
                &filter.exclude_blacklisted,
                &filter.active_only,
                &filter.after_created_at,
                &filter.after_id,
                &filter.limit,
            ];
            params.extend(filter.segment_ids.iter().map(|id| id as &dyn ToSql));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(SubscriberRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        email: row.get(2)?,
                        name: row.get(3)?,
                        metadata: row.get(4)?,
                        active: row.get(5)?,
                        blacklisted: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Send logs --

    pub fn create_send_log(&self, log: &SendLogRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO send_logs (id, user_id, subscriber_id, campaign_id, status, description, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    log.id,
                    log.user_id,
                    log.subscriber_id,
                    log.campaign_id,
                    log.status,
                    log.description,
                    log.created_at
                ],
            )?;
            Ok(())
        })
    }

    pub fn count_send_logs_by_id(&self, id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM send_logs WHERE id = ?1", [id], |r| r.get(0))?)
        })
    }

    pub fn count_send_logs_by_status(&self, status: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM send_logs WHERE status = ?1", [status], |r| {
                r.get(0)
            })?)
        })
    }

    pub fn send_logs_for_campaign(&self, campaign_id: i64) -> Result<Vec<SendLogRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, subscriber_id, campaign_id, status, description, created_at
                 FROM send_logs WHERE campaign_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map([campaign_id], |row| {
                    Ok(SendLogRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        subscriber_id: row.get(2)?,
                        campaign_id: row.get(3)?,
                        status: row.get(4)?,
                        description: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Outbound queue --

    pub fn enqueue_message(&self, msg: &QueuedMessageRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO send_queue (correlation_id, campaign_id, user_id, subscriber_id, payload, enqueued_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    msg.correlation_id,
                    msg.campaign_id,
                    msg.user_id,
                    msg.subscriber_id,
                    msg.payload,
                    msg.enqueued_at
                ],
            )?;
            Ok(())
        })
    }

    pub fn count_queued_messages(&self, campaign_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM send_queue WHERE campaign_id = ?1",
                [campaign_id],
                |r| r.get(0),
            )?)
        })
    }

    /// Queued messages of one campaign in correlation (dispatch) order.
    pub fn queued_messages(&self, campaign_id: i64) -> Result<Vec<QueuedMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT correlation_id, campaign_id, user_id, subscriber_id, payload, enqueued_at
                 FROM send_queue WHERE campaign_id = ?1 ORDER BY correlation_id",
            )?;
            let rows = stmt
                .query_map([campaign_id], |row| {
                    Ok(QueuedMessageRow {
                        correlation_id: row.get(0)?,
                        campaign_id: row.get(1)?,
                        user_id: row.get(2)?,
                        subscriber_id: row.get(3)?,
                        payload: row.get(4)?,
                        enqueued_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_campaign(conn: &Connection, id: i64, user_id: i64) -> Result<Option<CampaignRow>> {
    let sql = format!("SELECT {} FROM campaigns WHERE id = ?1 AND user_id = ?2", CAMPAIGN_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([id, user_id], campaign_from_row).optional()
}

fn campaign_from_row(row: &Row<'_>) -> rusqlite::Result<CampaignRow> {
    Ok(CampaignRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        template_id: row.get(3)?,
        status: row.get(4)?,
        started_at: row.get(5)?,
        completed_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
