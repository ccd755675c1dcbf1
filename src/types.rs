//! Configuration and sync status types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncFailure;
use crate::sync::reconcile::EntityKind;

pub const DEFAULT_REST_BASE: &str = "http://cfp.devoxx.com/rest/v1/";
pub const DEFAULT_LABS_BASE: &str = "http://devoxx2010.appspot.com/labs/";

/// Sync engine configuration, read from `~/.confsched/config.json`.
///
/// Every field has a default, so an empty `{}` file is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Directory holding the bundled `cache-*.json` snapshots.
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,
    /// Database path override. Defaults to `~/.confsched/confsched.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
    /// Skip remote syncs unless the connection is Wi-Fi.
    #[serde(default)]
    pub wifi_only: bool,
    /// Assume a Wi-Fi connection when `wifiOnly` is set. Hosts with a real
    /// connectivity probe plug in their own `Connectivity` instead.
    #[serde(default = "default_true")]
    pub on_wifi: bool,
    #[serde(default)]
    pub endpoints: RemoteEndpoints,
    /// Checksum service (`GET <url>?requestUri=...`). When unset, digests
    /// are computed locally from the fetched payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_service: Option<String>,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Fixed UTC offset of schedule times, in minutes.
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_true")]
    pub notifications: bool,
}

fn default_assets_dir() -> String {
    "assets".to_string()
}

fn default_true() -> bool {
    true
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_utc_offset_minutes() -> i32 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            assets_dir: default_assets_dir(),
            db_path: None,
            wifi_only: false,
            on_wifi: true,
            endpoints: RemoteEndpoints::default(),
            checksum_service: None,
            http_timeout_secs: default_http_timeout_secs(),
            utc_offset_minutes: default_utc_offset_minutes(),
            notifications: true,
        }
    }
}

/// Remote endpoints per entity group. Lab URLs are merged into the group of
/// the matching main endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteEndpoints {
    pub rooms: String,
    pub speakers: String,
    pub presentations: String,
    pub schedule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab_speakers: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab_presentations: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab_schedule: Option<String>,
}

impl Default for RemoteEndpoints {
    fn default() -> Self {
        Self {
            rooms: format!("{DEFAULT_REST_BASE}events/1/schedule/rooms"),
            speakers: format!("{DEFAULT_REST_BASE}events/1/speakers"),
            presentations: format!("{DEFAULT_REST_BASE}events/1/presentations"),
            schedule: format!("{DEFAULT_REST_BASE}events/1/schedule"),
            lab_speakers: Some(format!("{DEFAULT_LABS_BASE}cache-labs-speakers.json")),
            lab_presentations: Some(format!("{DEFAULT_LABS_BASE}cache-labs-presentations.json")),
            lab_schedule: Some(format!("{DEFAULT_LABS_BASE}cache-labs-schedule.json")),
        }
    }
}

impl RemoteEndpoints {
    /// URLs fetched and merged into one batch for `kind`, main endpoint first.
    pub fn urls_for(&self, kind: EntityKind) -> Vec<&str> {
        let (main, lab) = match kind {
            EntityKind::Rooms => (&self.rooms, None),
            EntityKind::Speakers => (&self.speakers, self.lab_speakers.as_ref()),
            EntityKind::Sessions => (&self.presentations, self.lab_presentations.as_ref()),
            EntityKind::Schedule => (&self.schedule, self.lab_schedule.as_ref()),
        };
        std::iter::once(main.as_str())
            .chain(lab.map(String::as_str))
            .collect()
    }

    /// Every URL whose content checksum is tracked, in sync order.
    pub fn tracked_urls(&self) -> Vec<&str> {
        EntityKind::SYNC_ORDER
            .iter()
            .flat_map(|kind| self.urls_for(*kind))
            .collect()
    }
}

/// Bundled snapshot file for an entity group.
pub fn local_asset(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Rooms => "cache-rooms.json",
        EntityKind::Speakers => "cache-speakers.json",
        EntityKind::Sessions => "cache-presentations.json",
        EntityKind::Schedule => "cache-schedule.json",
    }
}

/// Optional bundled lab snapshot for an entity group.
pub fn local_lab_asset(kind: EntityKind) -> Option<&'static str> {
    match kind {
        EntityKind::Rooms => None,
        EntityKind::Speakers => Some("cache-labs-speakers.json"),
        EntityKind::Sessions => Some("cache-labs-presentations.json"),
        EntityKind::Schedule => Some("cache-labs-schedule.json"),
    }
}

/// A request for one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncRequest {
    /// Sync remotely even if no checksum changed.
    pub force: bool,
}

impl SyncRequest {
    pub fn forced() -> Self {
        Self { force: true }
    }
}

/// Status reported to listeners. A run emits `Running`, then exactly one
/// of `Finished` or `Error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SyncStatus {
    Running {
        #[serde(rename = "startedAt")]
        started_at: DateTime<Utc>,
    },
    Finished {
        #[serde(rename = "finishedAt")]
        finished_at: DateTime<Utc>,
        #[serde(rename = "remoteSynced")]
        remote_synced: bool,
    },
    Error {
        error: SyncFailure,
    },
}

impl SyncStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SyncStatus::Running { .. })
    }
}
