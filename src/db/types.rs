//! Shared type definitions for the database layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

/// A row from the `rooms` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbRoom {
    pub room_id: String,
    pub name: String,
    pub capacity: String,
}

/// A row from the `speakers` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbSpeaker {
    pub speaker_id: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub company: String,
    pub image_url: String,
}

/// A row from the `tracks` table. Color is an `#RRGGBB`-style string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbTrack {
    pub track_id: String,
    pub track_name: Option<String>,
    pub track_color: Option<String>,
}

/// A row from the `blocks` table. Start and end are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbBlock {
    pub block_id: String,
    pub title: String,
    pub start: i64,
    pub end: i64,
    pub block_type: String,
}

/// A row from the `sessions` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbSession {
    pub session_id: String,
    pub block_id: Option<String>,
    pub room_id: Option<String>,
    pub track_id: Option<String>,
    pub title: String,
    pub summary: String,
    pub experience: String,
    pub session_type: Option<String>,
    /// User-owned. Never overwritten by sync.
    pub note: String,
    /// User-owned. Carried forward on every sync update.
    pub starred: bool,
    pub is_new: bool,
    pub is_updated: bool,
}

/// Minimal session view used for post-sync notifications.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub title: String,
}
