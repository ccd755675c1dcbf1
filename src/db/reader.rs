//! `StoreReader` over SQLite: the read side reconcilers plan against.

use std::collections::HashSet;

use rusqlite::{params, OptionalExtension};

use super::{DbError, ScheduleDb};
use crate::sync::ops::Table;
use crate::sync::store::{SessionSnapshot, SpeakerSnapshot, StoreReader};

impl StoreReader for ScheduleDb {
    fn exists(&self, table: Table, id: &str) -> Result<bool, DbError> {
        let Some(column) = table.id_column() else {
            return Ok(false);
        };
        let found: Option<i64> = self
            .conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE {} = ?1 LIMIT 1", table.name(), column),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn ids(&self, table: Table) -> Result<HashSet<String>, DbError> {
        let Some(column) = table.id_column() else {
            return Ok(HashSet::new());
        };
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM {}", column, table.name()))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = HashSet::new();
        for row in rows {
            ids.insert(row?);
        }
        Ok(ids)
    }

    fn session(&self, session_id: &str) -> Result<Option<SessionSnapshot>, DbError> {
        let snapshot = self
            .conn
            .query_row(
                "SELECT title, summary, experience, type, note, starred
                 FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| {
                    Ok(SessionSnapshot {
                        title: row.get(0)?,
                        summary: row.get(1)?,
                        experience: row.get(2)?,
                        session_type: row.get(3)?,
                        note: row.get(4)?,
                        starred: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(snapshot)
    }

    fn speaker(&self, speaker_id: &str) -> Result<Option<SpeakerSnapshot>, DbError> {
        let snapshot = self
            .conn
            .query_row(
                "SELECT first_name, last_name, bio, company
                 FROM speakers WHERE speaker_id = ?1",
                params![speaker_id],
                |row| {
                    Ok(SpeakerSnapshot {
                        first_name: row.get(0)?,
                        last_name: row.get(1)?,
                        bio: row.get(2)?,
                        company: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(snapshot)
    }

    fn session_speaker_ids(&self, session_id: &str) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT speaker_id FROM sessions_speakers WHERE session_id = ?1 ORDER BY _id",
        )?;
        let rows = stmt.query_map(params![session_id], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    fn room_id_by_name(&self, name: &str) -> Result<Option<String>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT room_id FROM rooms WHERE name = ?1 ORDER BY _id LIMIT 1",
                params![name],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn session_ids_by_track(&self, track_id: &str) -> Result<Vec<String>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT session_id FROM sessions WHERE track_id = ?1 ORDER BY _id")?;
        let rows = stmt.query_map(params![track_id], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }
}
