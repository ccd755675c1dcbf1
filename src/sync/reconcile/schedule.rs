//! Schedule entries: blocks plus the session → block/room attachment.
//!
//! Entries sharing `(kind, start, end)` coalesce into one block; the first
//! entry defines the block row and later ones only attach their session.
//! When several entries reference the same session, the last one wins.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use super::{lost_ids, ReconcileContext, ReconcileError};
use crate::sync::ids::{
    block_title, generate_block_id, last_path_segment, parse_schedule_time, sanitize_id,
};
use crate::sync::ops::{Operation, Selection, Table};
use crate::sync::record::{decode_batches, ScheduleRecord};
use crate::sync::store::StoreReader;

pub(super) fn reconcile(
    batches: &[Vec<Value>],
    store: &dyn StoreReader,
    ctx: &ReconcileContext,
) -> Result<Vec<Operation>, ReconcileError> {
    let records: Vec<ScheduleRecord> = decode_batches("schedule", batches)?;
    let entries = records.len();
    log::debug!("Retrieved {} schedule entries.", entries);

    let mut block_ops: Vec<Operation> = Vec::new();
    let mut block_ids: HashSet<String> = HashSet::new();
    let mut session_ops: Vec<Operation> = Vec::new();
    let mut session_index: HashMap<String, usize> = HashMap::new();

    for entry in &records {
        let start = parse_schedule_time(&entry.from_time, ctx.utc_offset_minutes)
            .ok_or_else(|| ReconcileError::InvalidTime(entry.from_time.clone()))?;
        let end = parse_schedule_time(&entry.to_time, ctx.utc_offset_minutes)
            .ok_or_else(|| ReconcileError::InvalidTime(entry.to_time.clone()))?;
        let block_id = generate_block_id(&entry.kind, start, end);

        if block_ids.insert(block_id.clone()) {
            let op = if store.exists(Table::Blocks, &block_id)? {
                Operation::update_by_id(Table::Blocks, block_id.as_str())
            } else {
                Operation::insert(Table::Blocks).with_value("block_id", block_id.as_str())
            };
            block_ops.push(
                op.with_value("block_start", start)
                    .with_value("block_end", end)
                    .with_value("block_title", block_title(&entry.code, &entry.entry_type))
                    .with_value("block_type", entry.kind.as_str()),
            );
        }

        let Some(session_id) = entry
            .presentation_uri
            .as_deref()
            .and_then(last_path_segment)
            .map(|segment| sanitize_id(&segment))
        else {
            continue;
        };

        let Some(current) = store.session(&session_id)? else {
            continue;
        };

        let room_id = match entry.room.as_deref() {
            Some(name) => store.room_id_by_name(name)?,
            None => None,
        };

        let mut op = Operation::update_by_id(Table::Sessions, session_id.as_str())
            .with_value("block_id", block_id.as_str())
            .with_value("room_id", room_id);

        // A schedule note only seeds an empty note; user notes always win.
        if let Some(note) = entry.note.as_deref().map(str::trim) {
            if !note.is_empty() && current.note.trim().is_empty() {
                op.set_value("note", note);
            }
        }

        match session_index.get(&session_id) {
            Some(&pos) => session_ops[pos] = op,
            None => {
                session_index.insert(session_id, session_ops.len());
                session_ops.push(op);
            }
        }
    }

    let mut batch = block_ops;
    batch.append(&mut session_ops);

    if ctx.sweep_enabled(entries) {
        for lost_id in lost_ids(store, Table::Blocks, &block_ids)? {
            batch.push(
                Operation::update_where(
                    Table::Sessions,
                    Selection::new().and("block_id", lost_id.as_str()),
                )
                .with_value("block_id", None::<String>),
            );
            batch.push(Operation::delete_by_id(Table::Blocks, lost_id));
        }

        // Sessions no schedule entry references anymore are gone remotely.
        let scheduled: HashSet<String> = session_index.into_keys().collect();
        for lost_id in lost_ids(store, Table::Sessions, &scheduled)? {
            batch.push(Operation::delete_where(
                Table::SessionsSpeakers,
                Selection::new().and("session_id", lost_id.as_str()),
            ));
            batch.push(Operation::delete_by_id(Table::Sessions, lost_id));
        }
    }

    Ok(batch)
}
