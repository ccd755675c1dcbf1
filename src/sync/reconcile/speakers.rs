//! Speakers: insert new ones, rewrite existing ones only when their content
//! actually differs, sweep speakers (and their session links) gone remotely.

use std::collections::HashSet;

use serde_json::Value;

use super::{dedupe_last_wins, lost_ids, same_text, ReconcileContext, ReconcileError};
use crate::sync::ids::sanitize_id;
use crate::sync::ops::{Operation, Selection, Table};
use crate::sync::record::{decode_batches, SpeakerRecord};
use crate::sync::store::{SpeakerSnapshot, StoreReader};

pub(super) fn reconcile(
    batches: &[Vec<Value>],
    store: &dyn StoreReader,
    ctx: &ReconcileContext,
) -> Result<Vec<Operation>, ReconcileError> {
    let records: Vec<SpeakerRecord> = decode_batches("speaker", batches)?;
    let entries = records.len();
    log::debug!("Retrieved {} speaker entries.", entries);

    let mut batch = Vec::new();
    let mut speaker_ids = HashSet::new();

    for (speaker_id, speaker) in dedupe_last_wins(records, |s| sanitize_id(&s.id)) {
        let op = match store.speaker(&speaker_id)? {
            Some(current) if is_speaker_updated(&current, &speaker) => {
                Some(Operation::update_by_id(Table::Speakers, speaker_id.as_str()))
            }
            Some(_) => None,
            None => Some(
                Operation::insert(Table::Speakers).with_value("speaker_id", speaker_id.as_str()),
            ),
        };

        if let Some(op) = op {
            batch.push(
                op.with_value("first_name", speaker.first_name)
                    .with_value("last_name", speaker.last_name)
                    .with_value("bio", speaker.bio)
                    .with_value("company", speaker.company)
                    .with_value("image_url", speaker.image_uri),
            );
        }
        speaker_ids.insert(speaker_id);
    }

    if ctx.sweep_enabled(entries) {
        for lost_id in lost_ids(store, Table::Speakers, &speaker_ids)? {
            batch.push(Operation::delete_where(
                Table::SessionsSpeakers,
                Selection::new().and("speaker_id", lost_id.as_str()),
            ));
            batch.push(Operation::delete_by_id(Table::Speakers, lost_id));
        }
    }

    Ok(batch)
}

/// Compares names, bio and company; the image URL is not part of the check.
fn is_speaker_updated(current: &SpeakerSnapshot, incoming: &SpeakerRecord) -> bool {
    !same_text(&current.first_name, &incoming.first_name)
        || !same_text(&current.last_name, &incoming.last_name)
        || !same_text(&current.bio, &incoming.bio)
        || !same_text(&current.company, &incoming.company)
}
