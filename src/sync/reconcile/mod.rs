//! Entity reconcilers.
//!
//! A reconciler turns one logical fetch (possibly several merged JSON
//! batches, e.g. main + lab data) into an ordered operation plan against a
//! read-only view of the store. It never writes. The sync mode is passed
//! in explicitly on every call, so reconcilers hold no state between runs.
//!
//! Plan ordering: inserts/updates first, then lost-id deletes, with child
//! rows (speaker links, sessions of a track) deleted before their parent.

mod rooms;
mod schedule;
mod sessions;
mod speakers;

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use thiserror::Error;

use crate::db::DbError;
use crate::sync::ids;
use crate::sync::ops::{Operation, Table};
use crate::sync::store::StoreReader;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Invalid {entity} record at index {index}: {source}")]
    Record {
        entity: &'static str,
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid schedule time: {0}")]
    InvalidTime(String),

    #[error("Store read failed: {0}")]
    Store(#[from] DbError),
}

/// Where a batch came from. Decides whether change flags are written and
/// whether the lost-id sweep runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// First-launch bootstrap from bundled assets.
    Local,
    /// Bundled lab assets, reconciled after the main bootstrap.
    LocalLab,
    /// REST backend.
    Remote,
}

impl SyncMode {
    /// `new`/`updated` badges are only meaningful relative to a previous
    /// remote state; bootstrap data was always there.
    pub fn writes_change_flags(self) -> bool {
        self == SyncMode::Remote
    }

    /// Only a complete remote listing can prove that an entity is gone.
    pub fn sweeps_lost_ids(self) -> bool {
        self == SyncMode::Remote
    }
}

/// Per-call reconciliation parameters.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileContext {
    pub mode: SyncMode,
    /// Fixed UTC offset the schedule times are expressed in.
    pub utc_offset_minutes: i32,
}

impl ReconcileContext {
    pub fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            utc_offset_minutes: 60,
        }
    }

    pub fn with_utc_offset(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }

    /// Should lost ids be swept for a listing of `entries` records?
    /// An empty listing means "source unavailable", never "everything gone".
    fn sweep_enabled(&self, entries: usize) -> bool {
        self.mode.sweeps_lost_ids() && entries > 0
    }
}

/// Entity groups, in the order a sync must process them: schedule links
/// sessions to blocks and rooms, so it runs last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Rooms,
    Speakers,
    Sessions,
    Schedule,
}

impl EntityKind {
    pub const SYNC_ORDER: [EntityKind; 4] = [
        EntityKind::Rooms,
        EntityKind::Speakers,
        EntityKind::Sessions,
        EntityKind::Schedule,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Rooms => "rooms",
            EntityKind::Speakers => "speakers",
            EntityKind::Sessions => "sessions",
            EntityKind::Schedule => "schedule",
        }
    }

    /// Compute the operation plan for `batches` against `store`.
    pub fn reconcile(
        self,
        batches: &[Vec<Value>],
        store: &dyn StoreReader,
        ctx: &ReconcileContext,
    ) -> Result<Vec<Operation>, ReconcileError> {
        let ops = match self {
            EntityKind::Rooms => rooms::reconcile(batches, store, ctx)?,
            EntityKind::Speakers => speakers::reconcile(batches, store, ctx)?,
            EntityKind::Sessions => sessions::reconcile(batches, store, ctx)?,
            EntityKind::Schedule => schedule::reconcile(batches, store, ctx)?,
        };
        log::debug!(
            "{} reconcile ({:?}): planned {} operations",
            self.name(),
            ctx.mode,
            ops.len()
        );
        Ok(ops)
    }
}

/// Collapse records sharing a derived id: the last occurrence wins but
/// keeps the position of the first.
fn dedupe_last_wins<T>(records: Vec<T>, id_of: impl Fn(&T) -> String) -> Vec<(String, T)> {
    let mut order: Vec<(String, T)> = Vec::with_capacity(records.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    for record in records {
        let id = id_of(&record);
        match index.get(&id) {
            Some(&pos) => order[pos].1 = record,
            None => {
                index.insert(id.clone(), order.len());
                order.push((id, record));
            }
        }
    }
    order
}

/// Ids present in the store but not seen in this listing, minus bundled lab
/// rows. Sorted for a stable plan.
fn lost_ids(
    store: &dyn StoreReader,
    table: Table,
    seen: &HashSet<String>,
) -> Result<Vec<String>, DbError> {
    let mut lost: Vec<String> = store
        .ids(table)?
        .into_iter()
        .filter(|id| !seen.contains(id) && !ids::is_lab_id(id))
        .collect();
    lost.sort();
    Ok(lost)
}

/// Case-insensitive, whitespace-trimmed equality.
fn same_text(current: &str, incoming: &str) -> bool {
    current.trim().to_lowercase() == incoming.trim().to_lowercase()
}
