use rusqlite::{params, OptionalExtension, Row};

use super::*;

const SESSION_COLUMNS: &str = "session_id, block_id, room_id, track_id, title, summary,
     experience, type, note, starred, new, updated";

fn map_session(row: &Row<'_>) -> rusqlite::Result<DbSession> {
    Ok(DbSession {
        session_id: row.get(0)?,
        block_id: row.get(1)?,
        room_id: row.get(2)?,
        track_id: row.get(3)?,
        title: row.get(4)?,
        summary: row.get(5)?,
        experience: row.get(6)?,
        session_type: row.get(7)?,
        note: row.get(8)?,
        starred: row.get(9)?,
        is_new: row.get(10)?,
        is_updated: row.get(11)?,
    })
}

impl ScheduleDb {
    // =========================================================================
    // Entity lookups
    // =========================================================================

    pub fn get_session(&self, session_id: &str) -> Result<Option<DbSession>, DbError> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = ?1"),
                params![session_id],
                map_session,
            )
            .optional()?)
    }

    /// Sessions ordered by block start, then title. Unscheduled sessions sort last.
    pub fn list_sessions(&self) -> Result<Vec<DbSession>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM sessions s
             LEFT JOIN blocks b ON b.block_id = s.block_id
             ORDER BY b.block_start IS NULL, b.block_start, s.title",
            SESSION_COLUMNS
                .split(',')
                .map(|c| format!("s.{}", c.trim()))
                .collect::<Vec<_>>()
                .join(", ")
        ))?;
        let rows = stmt.query_map([], map_session)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }

    pub fn get_room(&self, room_id: &str) -> Result<Option<DbRoom>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT room_id, name, capacity FROM rooms WHERE room_id = ?1",
                params![room_id],
                |row| {
                    Ok(DbRoom {
                        room_id: row.get(0)?,
                        name: row.get(1)?,
                        capacity: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn get_speaker(&self, speaker_id: &str) -> Result<Option<DbSpeaker>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT speaker_id, first_name, last_name, bio, company, image_url
                 FROM speakers WHERE speaker_id = ?1",
                params![speaker_id],
                |row| {
                    Ok(DbSpeaker {
                        speaker_id: row.get(0)?,
                        first_name: row.get(1)?,
                        last_name: row.get(2)?,
                        bio: row.get(3)?,
                        company: row.get(4)?,
                        image_url: row.get(5)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn get_track(&self, track_id: &str) -> Result<Option<DbTrack>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT track_id, track_name, track_color FROM tracks WHERE track_id = ?1",
                params![track_id],
                |row| {
                    Ok(DbTrack {
                        track_id: row.get(0)?,
                        track_name: row.get(1)?,
                        track_color: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn get_block(&self, block_id: &str) -> Result<Option<DbBlock>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT block_id, block_title, block_start, block_end, block_type
                 FROM blocks WHERE block_id = ?1",
                params![block_id],
                |row| {
                    Ok(DbBlock {
                        block_id: row.get(0)?,
                        title: row.get(1)?,
                        start: row.get(2)?,
                        end: row.get(3)?,
                        block_type: row.get(4)?,
                    })
                },
            )
            .optional()?)
    }

    /// Speakers linked to a session, in link order.
    pub fn speakers_for_session(&self, session_id: &str) -> Result<Vec<DbSpeaker>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT sp.speaker_id, sp.first_name, sp.last_name, sp.bio, sp.company, sp.image_url
             FROM sessions_speakers ss
             INNER JOIN speakers sp ON sp.speaker_id = ss.speaker_id
             WHERE ss.session_id = ?1
             ORDER BY ss._id",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok(DbSpeaker {
                speaker_id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
                bio: row.get(3)?,
                company: row.get(4)?,
                image_url: row.get(5)?,
            })
        })?;
        let mut speakers = Vec::new();
        for row in rows {
            speakers.push(row?);
        }
        Ok(speakers)
    }

    // =========================================================================
    // User-owned state
    // =========================================================================

    /// Star or unstar a session. Returns `false` when the session doesn't exist.
    pub fn set_starred(&self, session_id: &str, starred: bool) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "UPDATE sessions SET starred = ?1 WHERE session_id = ?2",
            params![starred, session_id],
        )?;
        Ok(changed > 0)
    }

    /// Replace a session's note. Returns `false` when the session doesn't exist.
    pub fn set_note(&self, session_id: &str, note: &str) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "UPDATE sessions SET note = ?1 WHERE session_id = ?2",
            params![note, session_id],
        )?;
        Ok(changed > 0)
    }

    // =========================================================================
    // Notification queries
    // =========================================================================

    /// Sessions flagged `new` by the last remote sync.
    pub fn new_sessions(&self) -> Result<Vec<SessionSummary>, DbError> {
        self.session_summaries("SELECT session_id, title FROM sessions WHERE new = 1 ORDER BY title")
    }

    /// Starred sessions whose content changed in the last remote sync.
    pub fn updated_starred_sessions(&self) -> Result<Vec<SessionSummary>, DbError> {
        self.session_summaries(
            "SELECT session_id, title FROM sessions
             WHERE starred = 1 AND updated = 1 ORDER BY title",
        )
    }

    fn session_summaries(&self, sql: &str) -> Result<Vec<SessionSummary>, DbError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(SessionSummary {
                session_id: row.get(0)?,
                title: row.get(1)?,
            })
        })?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }
}
