//! Rooms: replace name and capacity in place; sweep rooms gone remotely.

use std::collections::HashSet;

use serde_json::Value;

use super::{dedupe_last_wins, lost_ids, ReconcileContext, ReconcileError};
use crate::sync::ids::sanitize_id;
use crate::sync::ops::{Operation, Selection, Table, Value as Col};
use crate::sync::record::{decode_batches, RoomRecord};
use crate::sync::store::StoreReader;

pub(super) fn reconcile(
    batches: &[Vec<Value>],
    store: &dyn StoreReader,
    ctx: &ReconcileContext,
) -> Result<Vec<Operation>, ReconcileError> {
    let records: Vec<RoomRecord> = decode_batches("room", batches)?;
    let entries = records.len();
    log::debug!("Retrieved {} room entries.", entries);

    let mut batch = Vec::new();
    let mut room_ids = HashSet::new();

    for (room_id, room) in dedupe_last_wins(records, |r| sanitize_id(&r.id)) {
        let op = if store.exists(Table::Rooms, &room_id)? {
            Operation::update_by_id(Table::Rooms, room_id.as_str())
        } else {
            Operation::insert(Table::Rooms).with_value("room_id", room_id.as_str())
        };
        batch.push(
            op.with_value("name", room.name)
                .with_value("capacity", room.capacity),
        );
        room_ids.insert(room_id);
    }

    if ctx.sweep_enabled(entries) {
        for lost_id in lost_ids(store, Table::Rooms, &room_ids)? {
            // Detach sessions first so no session points at a missing room.
            batch.push(
                Operation::update_where(
                    Table::Sessions,
                    Selection::new().and("room_id", lost_id.as_str()),
                )
                .with_value("room_id", Col::Null),
            );
            batch.push(Operation::delete_by_id(Table::Rooms, lost_id));
        }
    }

    Ok(batch)
}
