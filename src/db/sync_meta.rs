//! Persisted sync bookkeeping: per-URL content checksums and the
//! `sync_state` key/value table (version counter, timestamps, last error).
//!
//! Only the sync orchestrator writes here, and it runs on a single worker
//! thread, so none of these need their own transaction.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};

use super::*;

const KEY_LOCAL_VERSION: &str = "local_version";
const KEY_LAST_REMOTE_SYNC: &str = "last_remote_sync";
const KEY_LAST_SYNC_ATTEMPT: &str = "last_sync_attempt";
const KEY_LAST_SYNC_ERROR: &str = "last_sync_error";

/// Stable row key for a tracked URL.
pub fn url_id(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

impl ScheduleDb {
    // =========================================================================
    // Per-URL checksums
    // =========================================================================

    /// Last persisted checksum for `url`, if any.
    pub fn checksum(&self, url: &str) -> Result<Option<String>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT checksum FROM sync WHERE url_id = ?1",
                params![url_id(url)],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn update_checksum(&self, url: &str, checksum: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO sync (url_id, url, checksum) VALUES (?1, ?2, ?3)",
            params![url_id(url), url, checksum],
        )?;
        Ok(())
    }

    // =========================================================================
    // Key/value sync state
    // =========================================================================

    fn sync_state(&self, key: &str) -> Result<Option<String>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM sync_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn set_sync_state(&self, key: &str, value: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO sync_state (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value],
        )?;
        Ok(())
    }

    fn clear_sync_state(&self, key: &str) -> Result<(), DbError> {
        self.conn
            .execute("DELETE FROM sync_state WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn sync_state_time(&self, key: &str) -> Result<Option<DateTime<Utc>>, DbError> {
        Ok(self.sync_state(key)?.and_then(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| log::warn!("Ignoring unparseable {} '{}': {}", key, raw, e))
                .ok()
        }))
    }

    /// Progress counter: `< 1` needs bootstrap, `< 4` needs a forced remote sync.
    pub fn local_version(&self) -> Result<i32, DbError> {
        Ok(self
            .sync_state(KEY_LOCAL_VERSION)?
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0))
    }

    pub fn set_local_version(&self, version: i32) -> Result<(), DbError> {
        self.set_sync_state(KEY_LOCAL_VERSION, &version.to_string())
    }

    pub fn last_remote_sync(&self) -> Result<Option<DateTime<Utc>>, DbError> {
        self.sync_state_time(KEY_LAST_REMOTE_SYNC)
    }

    pub fn set_last_remote_sync(&self, at: DateTime<Utc>) -> Result<(), DbError> {
        self.set_sync_state(KEY_LAST_REMOTE_SYNC, &at.to_rfc3339())
    }

    pub fn last_sync_attempt(&self) -> Result<Option<DateTime<Utc>>, DbError> {
        self.sync_state_time(KEY_LAST_SYNC_ATTEMPT)
    }

    pub fn last_sync_error(&self) -> Result<Option<String>, DbError> {
        self.sync_state(KEY_LAST_SYNC_ERROR)
    }

    /// Record the outcome of a run. A successful run clears any previous error.
    pub fn record_sync_attempt(
        &self,
        at: DateTime<Utc>,
        error: Option<&str>,
    ) -> Result<(), DbError> {
        self.set_sync_state(KEY_LAST_SYNC_ATTEMPT, &at.to_rfc3339())?;
        match error {
            Some(message) => self.set_sync_state(KEY_LAST_SYNC_ERROR, message),
            None => self.clear_sync_state(KEY_LAST_SYNC_ERROR),
        }
    }
}
