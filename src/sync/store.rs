//! Read-only view of the local store consumed by reconcilers.
//!
//! `ScheduleDb` implements this over SQLite; tests use the in-memory
//! `MemoryStore` so reconciliation can be exercised without a database.

use std::collections::HashSet;

use crate::db::DbError;
use crate::sync::ops::Table;

/// Content columns of an existing session plus its user-owned state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSnapshot {
    pub title: String,
    pub summary: String,
    pub experience: String,
    pub session_type: Option<String>,
    pub note: String,
    pub starred: bool,
}

/// Content columns of an existing speaker.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpeakerSnapshot {
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub company: String,
}

pub trait StoreReader {
    /// Does a row with this derived id exist?
    fn exists(&self, table: Table, id: &str) -> Result<bool, DbError>;

    /// All current derived ids of a table.
    fn ids(&self, table: Table) -> Result<HashSet<String>, DbError>;

    fn session(&self, session_id: &str) -> Result<Option<SessionSnapshot>, DbError>;

    fn speaker(&self, speaker_id: &str) -> Result<Option<SpeakerSnapshot>, DbError>;

    /// Speaker ids currently linked to a session.
    fn session_speaker_ids(&self, session_id: &str) -> Result<Vec<String>, DbError>;

    fn room_id_by_name(&self, name: &str) -> Result<Option<String>, DbError>;

    /// Sessions currently pointing at a track.
    fn session_ids_by_track(&self, track_id: &str) -> Result<Vec<String>, DbError>;
}

#[cfg(test)]
pub(crate) use memory::MemoryStore;
