//! Durable outbox store — SQLite-backed message queue.
//!
//! A message is written here before any delivery is attempted, so a crash
//! between "decide to alert" and "alert delivered" loses nothing. Rows are
//! deleted only on full delivery; exhausted messages are dead-lettered with
//! status `failed` and kept for operator inspection.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Mutex;

use vigil_core::error::{Result, VigilError};

/// Delivery status of an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    /// Eligible for the next delivery cycle.
    Pending,
    /// Retry budget exhausted — absorbing state, never retried.
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Failed => "failed",
        }
    }
}

/// A notification awaiting delivery.
#[derive(Debug, Clone)]
pub struct OutboxMessage {
    pub id: i64,
    pub chat_id: String,
    pub text: String,
    pub status: MessageStatus,
    pub attempts: u32,
    pub last_attempt: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// SQLite-backed outbox. All row mutations are single statements, so an
/// enqueue racing a processing cycle cannot lose an update.
pub struct Outbox {
    conn: Mutex<Connection>,
}

impl Outbox {
    /// Open or create the outbox database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| VigilError::Store(format!("Outbox open: {e}")))?;

        // WAL mode for concurrent enqueue while a cycle runs
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();

        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open the outbox in memory (tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| VigilError::Store(format!("Outbox open: {e}")))?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn migrate(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS outbox (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id TEXT NOT NULL,
                text TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                attempts INTEGER NOT NULL DEFAULT 0,
                last_attempt TEXT,
                created_at TEXT NOT NULL
            );",
        )
        .map_err(|e| VigilError::Store(format!("Outbox migration: {e}")))
    }

    /// Durably enqueue a message. Returns the assigned message id.
    /// The row is committed before this returns — callers may assume the
    /// message will eventually be attempted even if the process dies now.
    pub fn enqueue(&self, chat_id: &str, text: &str) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO outbox (chat_id, text, status, attempts, created_at)
             VALUES (?1, ?2, 'pending', 0, ?3)",
            params![chat_id, text, Utc::now().to_rfc3339()],
        )
        .map_err(|e| VigilError::Store(format!("Outbox enqueue: {e}")))?;
        Ok(conn.last_insert_rowid())
    }

    /// Pending messages with attempts below the budget, FIFO by enqueue time.
    pub fn pending(&self, max_attempts: u32) -> Result<Vec<OutboxMessage>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, chat_id, text, status, attempts, last_attempt, created_at
                 FROM outbox
                 WHERE status = 'pending' AND attempts < ?1
                 ORDER BY created_at ASC, id ASC",
            )
            .map_err(|e| VigilError::Store(format!("Outbox select: {e}")))?;
        let rows = stmt
            .query_map(params![max_attempts], |row| {
                Ok(OutboxMessage {
                    id: row.get(0)?,
                    chat_id: row.get(1)?,
                    text: row.get(2)?,
                    status: match row.get::<_, String>(3)?.as_str() {
                        "failed" => MessageStatus::Failed,
                        _ => MessageStatus::Pending,
                    },
                    attempts: row.get(4)?,
                    last_attempt: row
                        .get::<_, Option<String>>(5)?
                        .and_then(|s| s.parse().ok()),
                    created_at: row
                        .get::<_, String>(6)?
                        .parse()
                        .unwrap_or_else(|_| Utc::now()),
                })
            })
            .map_err(|e| VigilError::Store(format!("Outbox select: {e}")))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Delete a fully delivered message (terminal success).
    pub fn delete(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM outbox WHERE id = ?1", params![id])
            .map_err(|e| VigilError::Store(format!("Outbox delete: {e}")))?;
        Ok(())
    }

    /// Record a failed delivery attempt. Increments the counter, stamps the
    /// attempt time, and dead-letters the row the moment the budget is
    /// reached — all in one statement so interleaved cycles cannot double
    /// count. Returns the resulting status.
    pub fn record_attempt(&self, id: i64, max_attempts: u32) -> Result<MessageStatus> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE outbox
             SET attempts = attempts + 1,
                 last_attempt = ?1,
                 status = CASE WHEN attempts + 1 >= ?2 THEN 'failed' ELSE status END
             WHERE id = ?3",
            params![Utc::now().to_rfc3339(), max_attempts, id],
        )
        .map_err(|e| VigilError::Store(format!("Outbox update: {e}")))?;
        let status: String = conn
            .query_row(
                "SELECT status FROM outbox WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .map_err(|e| VigilError::Store(format!("Outbox read: {e}")))?;
        Ok(if status == "failed" {
            MessageStatus::Failed
        } else {
            MessageStatus::Pending
        })
    }

    /// (pending, failed) row counts — surfaced by `vigil status`.
    pub fn counts(&self) -> Result<(u64, u64)> {
        let conn = self.lock()?;
        let count = |status: MessageStatus| -> Result<u64> {
            conn.query_row(
                "SELECT COUNT(*) FROM outbox WHERE status = ?1",
                params![status.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as u64)
            .map_err(|e| VigilError::Store(format!("Outbox count: {e}")))
        };
        Ok((count(MessageStatus::Pending)?, count(MessageStatus::Failed)?))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| VigilError::Store(format!("Outbox lock: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_assigns_monotonic_ids() {
        let outbox = Outbox::open_in_memory().unwrap();
        let a = outbox.enqueue("42", "first").unwrap();
        let b = outbox.enqueue("42", "second").unwrap();
        assert!(b > a);

        let pending = outbox.pending(10).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].text, "first");
        assert_eq!(pending[1].text, "second");
        assert_eq!(pending[0].attempts, 0);
    }

    #[test]
    fn test_delete_on_delivery() {
        let outbox = Outbox::open_in_memory().unwrap();
        let id = outbox.enqueue("42", "bye").unwrap();
        outbox.delete(id).unwrap();
        assert!(outbox.pending(10).unwrap().is_empty());
    }

    #[test]
    fn test_dead_letter_at_budget() {
        let outbox = Outbox::open_in_memory().unwrap();
        let id = outbox.enqueue("42", "doomed").unwrap();

        for n in 1..3 {
            let status = outbox.record_attempt(id, 3).unwrap();
            assert_eq!(status, MessageStatus::Pending);
            assert_eq!(outbox.pending(3).unwrap()[0].attempts, n);
        }

        // third attempt hits the budget exactly — dead-lettered
        let status = outbox.record_attempt(id, 3).unwrap();
        assert_eq!(status, MessageStatus::Failed);
        assert!(outbox.pending(3).unwrap().is_empty());

        let (pending, failed) = outbox.counts().unwrap();
        assert_eq!((pending, failed), (0, 1));
    }

    #[test]
    fn test_failed_is_never_reselected() {
        let outbox = Outbox::open_in_memory().unwrap();
        let id = outbox.enqueue("42", "x").unwrap();
        outbox.record_attempt(id, 1).unwrap();
        // even with a raised budget, failed rows stay excluded
        assert!(outbox.pending(100).unwrap().is_empty());
    }

    #[test]
    fn test_open_on_disk() {
        let dir = std::env::temp_dir().join("vigil-outbox-test");
        std::fs::remove_dir_all(&dir).ok();
        let outbox = Outbox::open(&dir.join("outbox.db")).unwrap();
        outbox.enqueue("1", "persisted").unwrap();
        assert_eq!(outbox.pending(10).unwrap().len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }
}
