//! SQLite-backed notification store
//!
//! One `notifications` table. Rows carry an autoincrement `seq` column that
//! records insertion order; listings sort by `created_at_us DESC, seq ASC` so
//! records with equal timestamps come back in the order they were inserted.
//! Timestamps are stored as microseconds since the Unix epoch.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::migrations::run_migrations;
use super::{NotificationStore, StoreError, StoreResult};
use crate::model::{Notification, NotificationId, NotificationRecord};

const SELECT_SQL: &str = "SELECT id, title, message, recipient_id, created_at_us, is_read
FROM notifications";

const ORDER_SQL: &str = "ORDER BY created_at_us DESC, seq ASC";

/// Notification store over a single SQLite connection
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file and apply pending migrations
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "Notification store opened");
        Self::init(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn query_list(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StoreResult<Vec<Notification>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, read_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawRow::into_notification).collect()
    }
}

impl NotificationStore for SqliteStore {
    fn insert(&self, record: &NotificationRecord) -> StoreResult<NotificationId> {
        let id = NotificationId::generate();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO notifications (id, title, message, recipient_id, created_at_us, is_read)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.as_str(),
                record.title,
                record.message,
                record.recipient_id,
                record.created_at.timestamp_micros(),
                record.is_read,
            ],
        )?;
        Ok(id)
    }

    fn find_all(&self) -> StoreResult<Vec<Notification>> {
        self.query_list(&format!("{SELECT_SQL} {ORDER_SQL}"), [])
    }

    fn find_unread(&self, recipient_id: Option<&str>) -> StoreResult<Vec<Notification>> {
        self.query_list(
            &format!(
                "{SELECT_SQL} WHERE is_read = 0 AND (?1 IS NULL OR recipient_id = ?1) {ORDER_SQL}"
            ),
            params![recipient_id],
        )
    }

    fn find_by_id(&self, id: &NotificationId) -> StoreResult<Option<Notification>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!("{SELECT_SQL} WHERE id = ?1"),
                params![id.as_str()],
                read_row,
            )
            .optional()?;
        raw.map(RawRow::into_notification).transpose()
    }

    fn replace_by_id(
        &self,
        id: &NotificationId,
        record: &NotificationRecord,
    ) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE notifications
             SET title = ?2, message = ?3, recipient_id = ?4, created_at_us = ?5, is_read = ?6
             WHERE id = ?1",
            params![
                id.as_str(),
                record.title,
                record.message,
                record.recipient_id,
                record.created_at.timestamp_micros(),
                record.is_read,
            ],
        )?;
        Ok(changed > 0)
    }

    fn set_read_by_id(&self, id: &NotificationId) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1",
            params![id.as_str()],
        )?;
        Ok(changed > 0)
    }

    fn set_read_where_unread(&self, recipient_id: Option<&str>) -> StoreResult<usize> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE notifications SET is_read = 1
             WHERE is_read = 0 AND (?1 IS NULL OR recipient_id = ?1)",
            params![recipient_id],
        )?;
        Ok(changed)
    }

    fn delete_by_id(&self, id: &NotificationId) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM notifications WHERE id = ?1",
            params![id.as_str()],
        )?;
        Ok(changed > 0)
    }
}

/// Row as read from SQLite, before timestamp conversion
struct RawRow {
    id: String,
    title: String,
    message: String,
    recipient_id: Option<String>,
    created_at_us: i64,
    is_read: bool,
}

impl RawRow {
    fn into_notification(self) -> StoreResult<Notification> {
        let created_at = DateTime::<Utc>::from_timestamp_micros(self.created_at_us)
            .ok_or_else(|| {
                StoreError::InvalidData(format!(
                    "created_at_us out of range for {}: {}",
                    self.id, self.created_at_us
                ))
            })?;

        Ok(Notification {
            id: NotificationId::from(self.id),
            title: self.title,
            message: self.message,
            recipient_id: self.recipient_id,
            created_at,
            is_read: self.is_read,
        })
    }
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        title: row.get(1)?,
        message: row.get(2)?,
        recipient_id: row.get(3)?,
        created_at_us: row.get(4)?,
        is_read: row.get(5)?,
    })
}
