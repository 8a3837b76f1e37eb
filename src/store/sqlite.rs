use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use rusqlite_migration::{Migrations, M};

use crate::app::{DreaderError, ErrorKind, Result};
use crate::domain::{
    Attachment, Channel, Cursor, JobFailure, JobStatus, Message, ScrapeJob, Server,
    ThreadSummary,
};
use crate::store::{Store, UpsertStats};

const JOB_COLUMNS: &str = "id, channel_id, status, cursor_message_id, cursor_timestamp, attempts, \
     cycles, messages_seen, started_at, finished_at, error_message, error_kind, screenshot_path";

const MESSAGE_COLUMNS: &str = "channel_id, message_id, author_id, author_name, content, \
     timestamp, edited_timestamp, attachments, thread_id";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        // Readers of the shared database never block on an extraction batch
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    /// Delete the database file (and its WAL side files) and create a fresh schema.
    pub fn recreate<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        for suffix in ["", "-wal", "-shm"] {
            let mut file = path.as_os_str().to_owned();
            file.push(suffix);
            match std::fs::remove_file(&file) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Self::new(path)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;

        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| DreaderError::Migration(e.to_string()))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            DreaderError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        // Fixed width keeps lexical order equal to chronological order
        dt.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    fn required_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
        let raw: String = row.get(idx)?;
        Self::parse_datetime(&raw).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                Type::Text,
                format!("invalid timestamp: {}", raw).into(),
            )
        })
    }

    fn optional_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
        Ok(row
            .get::<_, Option<String>>(idx)?
            .and_then(|s| Self::parse_datetime(&s)))
    }

    fn row_to_job(row: &Row<'_>) -> rusqlite::Result<ScrapeJob> {
        let status: String = row.get(2)?;
        let status = status.parse::<JobStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into())
        })?;

        Ok(ScrapeJob {
            id: row.get(0)?,
            channel_id: row.get(1)?,
            status,
            cursor_message_id: row.get(3)?,
            cursor_timestamp: Self::optional_datetime(row, 4)?,
            attempts: row.get::<_, i64>(5)? as u32,
            cycles: row.get::<_, i64>(6)? as u32,
            messages_seen: row.get::<_, i64>(7)? as u64,
            started_at: Self::required_datetime(row, 8)?,
            finished_at: Self::optional_datetime(row, 9)?,
            error_message: row.get(10)?,
            error_kind: row
                .get::<_, Option<String>>(11)?
                .and_then(|s| ErrorKind::parse(&s)),
            screenshot_path: row.get(12)?,
        })
    }

    fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
        let attachments: String = row.get(7)?;
        let attachments: Vec<Attachment> = serde_json::from_str(&attachments).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e))
        })?;

        Ok(Message {
            channel_id: row.get(0)?,
            message_id: row.get(1)?,
            author_id: row.get(2)?,
            author_name: row.get(3)?,
            content: row.get(4)?,
            timestamp: Self::required_datetime(row, 5)?,
            edited_timestamp: Self::optional_datetime(row, 6)?,
            attachments,
            thread_id: row.get(8)?,
        })
    }

    fn row_to_channel(row: &Row<'_>) -> rusqlite::Result<Channel> {
        let kind: String = row.get(3)?;
        Ok(Channel {
            id: row.get(0)?,
            server_id: row.get(1)?,
            name: row.get(2)?,
            kind: kind.parse().unwrap_or_default(),
        })
    }

    fn job_by_id(conn: &Connection, id: i64) -> Result<Option<ScrapeJob>> {
        let job = conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM scrape_jobs WHERE id = ?1"),
                params![id],
                Self::row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    fn active_job(conn: &Connection, channel_id: &str) -> Result<Option<ScrapeJob>> {
        let job = conn
            .query_row(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM scrape_jobs
                     WHERE channel_id = ?1 AND status IN ('pending', 'running')
                     ORDER BY id DESC LIMIT 1"
                ),
                params![channel_id],
                Self::row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    fn is_constraint_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
        )
    }

    /// Turn a constraint failure on a job write into the conflict it stands for.
    fn job_conflict(conn: &Connection, channel_id: &str, err: rusqlite::Error) -> DreaderError {
        if !Self::is_constraint_violation(&err) {
            return err.into();
        }
        match Self::active_job(conn, channel_id) {
            Ok(Some(active)) => DreaderError::JobConflict {
                channel_id: channel_id.to_string(),
                job_id: active.id,
            },
            Ok(None) => DreaderError::ChannelNotFound(channel_id.to_string()),
            Err(e) => e,
        }
    }
}

impl Store for SqliteStore {
    fn upsert_server(&self, server: &Server) -> Result<()> {
        let conn = self.conn()?;
        let now = Self::format_datetime(&Utc::now());

        conn.execute(
            "INSERT INTO servers (id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, updated_at = excluded.updated_at
             WHERE servers.name != excluded.name",
            params![server.id, server.name, now],
        )?;

        Ok(())
    }

    fn upsert_channel(&self, channel: &Channel) -> Result<()> {
        let conn = self.conn()?;
        let now = Self::format_datetime(&Utc::now());

        conn.execute(
            "INSERT INTO channels (id, server_id, name, kind, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, kind = excluded.kind,
                 updated_at = excluded.updated_at
             WHERE channels.name != excluded.name OR channels.kind != excluded.kind",
            params![
                channel.id,
                channel.server_id,
                channel.name,
                channel.kind.as_str(),
                now
            ],
        )?;

        Ok(())
    }

    fn get_server(&self, id: &str) -> Result<Option<Server>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                "SELECT id, name FROM servers WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Server {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;

        Ok(result)
    }

    fn get_channel(&self, id: &str) -> Result<Option<Channel>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                "SELECT id, server_id, name, kind FROM channels WHERE id = ?1",
                params![id],
                Self::row_to_channel,
            )
            .optional()?;

        Ok(result)
    }

    fn list_servers(&self) -> Result<Vec<Server>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare("SELECT id, name FROM servers ORDER BY name, id")?;
        let servers = stmt
            .query_map([], |row| {
                Ok(Server {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(servers)
    }

    fn list_channels(&self, server_id: Option<&str>) -> Result<Vec<Channel>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, server_id, name, kind FROM channels
             WHERE ?1 IS NULL OR server_id = ?1
             ORDER BY server_id, name, id",
        )?;
        let channels = stmt
            .query_map(params![server_id], Self::row_to_channel)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(channels)
    }

    fn delete_channel(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM channels WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn upsert_messages(&self, messages: &[Message]) -> Result<UpsertStats> {
        let mut conn = self.conn()?;
        let now = Self::format_datetime(&Utc::now());

        // One transaction per batch: readers see all of it or none of it
        let tx = conn.transaction()?;
        let mut stats = UpsertStats::default();

        {
            let mut existing = tx.prepare_cached(
                "SELECT content_hash FROM messages WHERE channel_id = ?1 AND message_id = ?2",
            )?;
            let mut upsert = tx.prepare_cached(
                "INSERT INTO messages (channel_id, message_id, author_id, author_name, content,
                     timestamp, edited_timestamp, attachments, thread_id, content_hash,
                     first_seen_at, last_seen_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                 ON CONFLICT(channel_id, message_id) DO UPDATE SET
                     author_id = excluded.author_id,
                     author_name = excluded.author_name,
                     content = excluded.content,
                     timestamp = excluded.timestamp,
                     edited_timestamp = excluded.edited_timestamp,
                     attachments = excluded.attachments,
                     thread_id = excluded.thread_id,
                     content_hash = excluded.content_hash,
                     last_seen_at = excluded.last_seen_at",
            )?;

            for message in messages {
                let hash = message.content_hash();
                let previous: Option<String> = existing
                    .query_row(params![message.channel_id, message.message_id], |row| {
                        row.get(0)
                    })
                    .optional()?;

                upsert.execute(params![
                    message.channel_id,
                    message.message_id,
                    message.author_id,
                    message.author_name,
                    message.content,
                    Self::format_datetime(&message.timestamp),
                    message.edited_timestamp.as_ref().map(Self::format_datetime),
                    serde_json::to_string(&message.attachments)?,
                    message.thread_id,
                    hash,
                    now
                ])?;

                match previous {
                    None => stats.inserted += 1,
                    Some(old) if old == hash => stats.unchanged += 1,
                    Some(_) => stats.updated += 1,
                }
            }
        }

        tx.commit()?;
        Ok(stats)
    }

    fn get_message(&self, channel_id: &str, message_id: &str) -> Result<Option<Message>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE channel_id = ?1 AND message_id = ?2"
                ),
                params![channel_id, message_id],
                Self::row_to_message,
            )
            .optional()?;

        Ok(result)
    }

    fn list_messages(&self, channel_id: &str, limit: Option<usize>) -> Result<Vec<Message>> {
        let conn = self.conn()?;
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE channel_id = ?1 ORDER BY timestamp DESC, message_id DESC LIMIT ?2"
        ))?;
        let messages = stmt
            .query_map(params![channel_id, limit], Self::row_to_message)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(messages)
    }

    fn count_messages(&self, channel_id: &str) -> Result<i64> {
        let conn = self.conn()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE channel_id = ?1",
            params![channel_id],
            |row| row.get(0),
        )?;

        Ok(count)
    }

    fn list_threads(&self, channel_id: &str) -> Result<Vec<ThreadSummary>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT thread_id, channel_id, COUNT(*), MAX(timestamp) FROM messages
             WHERE channel_id = ?1 AND thread_id IS NOT NULL
             GROUP BY thread_id ORDER BY MAX(timestamp) DESC",
        )?;
        let threads = stmt
            .query_map(params![channel_id], |row| {
                Ok(ThreadSummary {
                    thread_id: row.get(0)?,
                    channel_id: row.get(1)?,
                    message_count: row.get(2)?,
                    last_activity: Self::required_datetime(row, 3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(threads)
    }

    fn create_job(&self, channel_id: &str, resume_from: Option<&Cursor>) -> Result<ScrapeJob> {
        let conn = self.conn()?;

        // The partial unique index makes check-then-create atomic
        let inserted = conn.execute(
            "INSERT INTO scrape_jobs (channel_id, status, cursor_message_id, cursor_timestamp,
                 started_at)
             VALUES (?1, 'pending', ?2, ?3, ?4)",
            params![
                channel_id,
                resume_from.map(|c| c.message_id.as_str()),
                resume_from.map(|c| Self::format_datetime(&c.timestamp)),
                Self::format_datetime(&Utc::now())
            ],
        );
        if let Err(e) = inserted {
            return Err(Self::job_conflict(&conn, channel_id, e));
        }

        let id = conn.last_insert_rowid();
        Self::job_by_id(&conn, id)?.ok_or(DreaderError::JobNotFound(id))
    }

    fn get_job(&self, id: i64) -> Result<Option<ScrapeJob>> {
        let conn = self.conn()?;
        Self::job_by_id(&conn, id)
    }

    fn list_jobs(&self, channel_id: Option<&str>) -> Result<Vec<ScrapeJob>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM scrape_jobs
             WHERE ?1 IS NULL OR channel_id = ?1 ORDER BY id DESC"
        ))?;
        let jobs = stmt
            .query_map(params![channel_id], Self::row_to_job)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(jobs)
    }

    fn find_active_job(&self, channel_id: &str) -> Result<Option<ScrapeJob>> {
        let conn = self.conn()?;
        Self::active_job(&conn, channel_id)
    }

    fn find_paused_job(&self, channel_id: &str) -> Result<Option<ScrapeJob>> {
        let conn = self.conn()?;

        let job = conn
            .query_row(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM scrape_jobs
                     WHERE channel_id = ?1 AND status = 'paused'
                     ORDER BY id DESC LIMIT 1"
                ),
                params![channel_id],
                Self::row_to_job,
            )
            .optional()?;

        Ok(job)
    }

    fn resume_cursor(&self, channel_id: &str) -> Result<Option<Cursor>> {
        let conn = self.conn()?;

        // Only an interrupted latest job leaves depth worth inheriting
        let latest = conn
            .query_row(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM scrape_jobs
                     WHERE channel_id = ?1 ORDER BY id DESC LIMIT 1"
                ),
                params![channel_id],
                Self::row_to_job,
            )
            .optional()?;

        Ok(latest
            .filter(|job| matches!(job.status, JobStatus::Failed | JobStatus::Cancelled))
            .and_then(|job| job.cursor()))
    }

    fn transition_job(&self, id: i64, from: JobStatus, to: JobStatus) -> Result<()> {
        if !from.can_transition_to(to) {
            return Err(DreaderError::InvalidTransition {
                job_id: id,
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE scrape_jobs SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![to.as_str(), id, from.as_str()],
        );

        let changed = match changed {
            Ok(n) => n,
            Err(e) => {
                let channel_id = Self::job_by_id(&conn, id)?
                    .map(|job| job.channel_id)
                    .unwrap_or_default();
                return Err(Self::job_conflict(&conn, &channel_id, e));
            }
        };

        if changed == 0 {
            let job = Self::job_by_id(&conn, id)?.ok_or(DreaderError::JobNotFound(id))?;
            return Err(DreaderError::InvalidTransition {
                job_id: id,
                from: job.status.to_string(),
                to: to.to_string(),
            });
        }

        Ok(())
    }

    fn update_job_cursor(&self, id: i64, cursor: &Cursor) -> Result<bool> {
        let conn = self.conn()?;
        let ts = Self::format_datetime(&cursor.timestamp);

        // Cursor only moves backward in time, and only on a live job
        let changed = conn.execute(
            "UPDATE scrape_jobs SET cursor_message_id = ?1, cursor_timestamp = ?2
             WHERE id = ?3 AND status = 'running'
               AND (cursor_timestamp IS NULL OR cursor_timestamp > ?2)",
            params![cursor.message_id, ts, id],
        )?;

        Ok(changed > 0)
    }

    fn record_job_progress(
        &self,
        id: i64,
        attempts: u32,
        cycles: u32,
        messages_seen: u64,
    ) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "UPDATE scrape_jobs SET attempts = ?1, cycles = ?2, messages_seen = ?3
             WHERE id = ?4 AND status IN ('pending', 'running')",
            params![attempts as i64, cycles as i64, messages_seen as i64, id],
        )?;

        Ok(())
    }

    fn finalize_job(
        &self,
        id: i64,
        status: JobStatus,
        failure: Option<&JobFailure>,
    ) -> Result<ScrapeJob> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let current = Self::job_by_id(&tx, id)?.ok_or(DreaderError::JobNotFound(id))?;
        if !current.status.can_transition_to(status) {
            return Err(DreaderError::InvalidTransition {
                job_id: id,
                from: current.status.to_string(),
                to: status.to_string(),
            });
        }

        let finished_at = status
            .is_terminal()
            .then(|| Self::format_datetime(&Utc::now()));

        tx.execute(
            "UPDATE scrape_jobs SET status = ?1, finished_at = ?2, error_message = ?3,
                 error_kind = ?4, screenshot_path = ?5
             WHERE id = ?6",
            params![
                status.as_str(),
                finished_at,
                failure.map(|f| f.message.as_str()),
                failure.map(|f| f.kind.as_str()),
                failure.and_then(|f| f.screenshot_path.as_deref()),
                id
            ],
        )?;

        let job = Self::job_by_id(&tx, id)?.ok_or(DreaderError::JobNotFound(id))?;
        tx.commit()?;
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChannelKind;
    use chrono::TimeZone;

    fn seeded_store() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_server(&Server::new("s1", "Rustaceans")).unwrap();
        store
            .upsert_channel(&Channel::new("c1", "s1", "general", ChannelKind::Text))
            .unwrap();
        store
    }

    fn message(id: &str, minute: u32) -> Message {
        let mut msg = Message::new(
            "c1",
            id,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 0).unwrap(),
        );
        msg.author_id = "u1".into();
        msg.author_name = "ferris".into();
        msg.content = format!("message {}", id);
        msg
    }

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 0).unwrap()
    }

    #[test]
    fn test_upsert_server_refreshes_name() {
        let store = seeded_store();
        store.upsert_server(&Server::new("s1", "Renamed")).unwrap();

        let server = store.get_server("s1").unwrap().unwrap();
        assert_eq!(server.name, "Renamed");
        assert_eq!(store.list_servers().unwrap().len(), 1);
    }

    #[test]
    fn test_list_channels_filters_by_server() {
        let store = seeded_store();
        store.upsert_server(&Server::new("s2", "Other")).unwrap();
        store
            .upsert_channel(&Channel::new("c2", "s2", "random", ChannelKind::Forum))
            .unwrap();

        assert_eq!(store.list_channels(None).unwrap().len(), 2);
        let only = store.list_channels(Some("s2")).unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].kind, ChannelKind::Forum);
    }

    #[test]
    fn test_channel_requires_existing_server() {
        let store = SqliteStore::in_memory().unwrap();
        let result = store.upsert_channel(&Channel::new("c1", "missing", "x", ChannelKind::Text));
        assert!(result.is_err());
    }

    #[test]
    fn test_overlapping_batches_dedup() {
        let store = seeded_store();

        let first = store
            .upsert_messages(&[message("a", 1), message("b", 2), message("c", 3)])
            .unwrap();
        assert_eq!(first.inserted, 3);

        let second = store
            .upsert_messages(&[message("b", 2), message("c", 3), message("d", 4)])
            .unwrap();
        assert_eq!(second.inserted, 1);
        assert_eq!(second.unchanged, 2);
        assert_eq!(second.updated, 0);

        let ids: Vec<String> = store
            .list_messages("c1", None)
            .unwrap()
            .into_iter()
            .map(|m| m.message_id)
            .collect();
        assert_eq!(ids, vec!["d", "c", "b", "a"]);
    }

    #[test]
    fn test_reextraction_refreshes_edited_message() {
        let store = seeded_store();
        store.upsert_messages(&[message("a", 1)]).unwrap();

        let mut edited = message("a", 1);
        edited.content = "message a (edited)".into();
        edited.edited_timestamp = Some(ts(9));
        let stats = store.upsert_messages(&[edited]).unwrap();
        assert_eq!(stats.updated, 1);

        let stored = store.get_message("c1", "a").unwrap().unwrap();
        assert_eq!(stored.content, "message a (edited)");
        assert_eq!(stored.edited_timestamp, Some(ts(9)));
        assert_eq!(store.count_messages("c1").unwrap(), 1);
    }

    #[test]
    fn test_refined_timestamp_counts_as_update() {
        let store = seeded_store();
        store.upsert_messages(&[message("a", 1)]).unwrap();

        // First seen with its group's time, later with its own
        let refined = message("a", 2);
        let stats = store.upsert_messages(&[refined]).unwrap();
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.unchanged, 0);

        let stored = store.get_message("c1", "a").unwrap().unwrap();
        assert_eq!(stored.timestamp, ts(2));
    }

    #[test]
    fn test_same_message_id_in_two_channels() {
        let store = seeded_store();
        store
            .upsert_channel(&Channel::new("c2", "s1", "off-topic", ChannelKind::Text))
            .unwrap();

        let mut other = message("a", 1);
        other.channel_id = "c2".into();
        store.upsert_messages(&[message("a", 1), other]).unwrap();

        assert_eq!(store.count_messages("c1").unwrap(), 1);
        assert_eq!(store.count_messages("c2").unwrap(), 1);
    }

    #[test]
    fn test_batch_is_atomic() {
        let store = seeded_store();
        let mut orphan = message("b", 2);
        orphan.channel_id = "no-such-channel".into();

        let result = store.upsert_messages(&[message("a", 1), orphan]);
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Persistence);
        assert_eq!(store.count_messages("c1").unwrap(), 0);
    }

    #[test]
    fn test_attachments_and_threads_round_trip() {
        let store = seeded_store();
        let mut msg = message("a", 1);
        msg.attachments = vec![Attachment::new("https://cdn.example.com/f/cat.png")];
        msg.thread_id = Some("t1".into());
        let mut reply = message("b", 5);
        reply.thread_id = Some("t1".into());
        store.upsert_messages(&[msg.clone(), reply]).unwrap();

        let stored = store.get_message("c1", "a").unwrap().unwrap();
        assert_eq!(stored, msg);

        let threads = store.list_threads("c1").unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].thread_id, "t1");
        assert_eq!(threads[0].message_count, 2);
        assert_eq!(threads[0].last_activity, ts(5));
    }

    #[test]
    fn test_list_messages_limit() {
        let store = seeded_store();
        store
            .upsert_messages(&[message("a", 1), message("b", 2), message("c", 3)])
            .unwrap();

        let latest = store.list_messages("c1", Some(2)).unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].message_id, "c");
    }

    #[test]
    fn test_delete_channel_cascades() {
        let store = seeded_store();
        store.upsert_messages(&[message("a", 1)]).unwrap();
        store.create_job("c1", None).unwrap();

        store.delete_channel("c1").unwrap();

        assert!(store.get_channel("c1").unwrap().is_none());
        assert_eq!(store.count_messages("c1").unwrap(), 0);
        assert!(store.list_jobs(Some("c1")).unwrap().is_empty());
    }

    #[test]
    fn test_second_active_job_conflicts() {
        let store = seeded_store();
        let job = store.create_job("c1", None).unwrap();
        store
            .transition_job(job.id, JobStatus::Pending, JobStatus::Running)
            .unwrap();

        match store.create_job("c1", None) {
            Err(DreaderError::JobConflict { channel_id, job_id }) => {
                assert_eq!(channel_id, "c1");
                assert_eq!(job_id, job.id);
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(store.list_jobs(Some("c1")).unwrap().len(), 1);
    }

    #[test]
    fn test_create_job_for_unknown_channel() {
        let store = seeded_store();
        assert!(matches!(
            store.create_job("nope", None),
            Err(DreaderError::ChannelNotFound(_))
        ));
    }

    #[test]
    fn test_resuming_paused_job_conflicts_with_active_one() {
        let store = seeded_store();
        let paused = store.create_job("c1", None).unwrap();
        store
            .transition_job(paused.id, JobStatus::Pending, JobStatus::Running)
            .unwrap();
        store.finalize_job(paused.id, JobStatus::Paused, None).unwrap();

        let other = store.create_job("c1", None).unwrap();
        assert!(matches!(
            store.transition_job(paused.id, JobStatus::Paused, JobStatus::Running),
            Err(DreaderError::JobConflict { job_id, .. }) if job_id == other.id
        ));
    }

    #[test]
    fn test_transition_compare_and_set() {
        let store = seeded_store();
        let job = store.create_job("c1", None).unwrap();

        // Stale expected status
        assert!(matches!(
            store.transition_job(job.id, JobStatus::Running, JobStatus::Completed),
            Err(DreaderError::InvalidTransition { .. })
        ));
        // Not in the transition table
        assert!(matches!(
            store.transition_job(job.id, JobStatus::Pending, JobStatus::Completed),
            Err(DreaderError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_cursor_only_moves_backward() {
        let store = seeded_store();
        let job = store.create_job("c1", None).unwrap();
        store
            .transition_job(job.id, JobStatus::Pending, JobStatus::Running)
            .unwrap();

        assert!(store.update_job_cursor(job.id, &Cursor::new("m5", ts(5))).unwrap());
        assert!(!store.update_job_cursor(job.id, &Cursor::new("m7", ts(7))).unwrap());
        assert!(store.update_job_cursor(job.id, &Cursor::new("m2", ts(2))).unwrap());

        let job = store.get_job(job.id).unwrap().unwrap();
        assert_eq!(job.cursor(), Some(Cursor::new("m2", ts(2))));
    }

    #[test]
    fn test_terminal_job_is_immutable() {
        let store = seeded_store();
        let job = store.create_job("c1", None).unwrap();
        store
            .transition_job(job.id, JobStatus::Pending, JobStatus::Running)
            .unwrap();
        let done = store.finalize_job(job.id, JobStatus::Completed, None).unwrap();
        assert!(done.finished_at.is_some());

        assert!(!store.update_job_cursor(job.id, &Cursor::new("m1", ts(1))).unwrap());
        assert!(store.finalize_job(job.id, JobStatus::Failed, None).is_err());
        store.record_job_progress(job.id, 9, 9, 9).unwrap();

        let job = store.get_job(job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.cursor(), None);
    }

    #[test]
    fn test_finalize_failed_records_diagnostics() {
        let store = seeded_store();
        let job = store.create_job("c1", None).unwrap();
        store
            .transition_job(job.id, JobStatus::Pending, JobStatus::Running)
            .unwrap();

        let failure = JobFailure {
            kind: ErrorKind::Structural,
            message: "selector missing".into(),
            screenshot_path: Some("/tmp/shot.png".into()),
        };
        let job = store
            .finalize_job(job.id, JobStatus::Failed, Some(&failure))
            .unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_kind, Some(ErrorKind::Structural));
        assert_eq!(job.error_message.as_deref(), Some("selector missing"));
        assert_eq!(job.screenshot_path.as_deref(), Some("/tmp/shot.png"));
    }

    #[test]
    fn test_resume_cursor_from_interrupted_job() {
        let store = seeded_store();
        assert!(store.resume_cursor("c1").unwrap().is_none());

        let job = store.create_job("c1", None).unwrap();
        store
            .transition_job(job.id, JobStatus::Pending, JobStatus::Running)
            .unwrap();
        store.update_job_cursor(job.id, &Cursor::new("m3", ts(3))).unwrap();
        store.finalize_job(job.id, JobStatus::Cancelled, None).unwrap();

        let cursor = store.resume_cursor("c1").unwrap().unwrap();
        assert_eq!(cursor, Cursor::new("m3", ts(3)));

        let next = store.create_job("c1", Some(&cursor)).unwrap();
        assert_eq!(next.cursor(), Some(cursor));
    }

    #[test]
    fn test_find_paused_job() {
        let store = seeded_store();
        let job = store.create_job("c1", None).unwrap();
        store
            .transition_job(job.id, JobStatus::Pending, JobStatus::Running)
            .unwrap();
        assert!(store.find_paused_job("c1").unwrap().is_none());

        store.finalize_job(job.id, JobStatus::Paused, None).unwrap();
        let paused = store.find_paused_job("c1").unwrap().unwrap();
        assert_eq!(paused.id, job.id);
        assert!(paused.finished_at.is_none());
        assert!(store.find_active_job("c1").unwrap().is_none());
    }

    #[test]
    fn test_file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.db");

        {
            let store = SqliteStore::new(&path).unwrap();
            store.upsert_server(&Server::new("s1", "Rustaceans")).unwrap();
        }
        let store = SqliteStore::new(&path).unwrap();
        assert!(store.get_server("s1").unwrap().is_some());

        drop(store);
        let store = SqliteStore::recreate(&path).unwrap();
        assert!(store.list_servers().unwrap().is_empty());
    }
}
