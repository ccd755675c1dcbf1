//! Sessions, their tracks and their speaker links.
//!
//! `starred` and `note` belong to the user: updates copy `starred` forward
//! and never touch `note`. Content columns are only rewritten when the
//! trimmed, case-insensitive comparison finds a difference.

use std::collections::HashSet;

use serde_json::Value;

use super::{dedupe_last_wins, lost_ids, same_text, ReconcileContext, ReconcileError};
use crate::sync::ids::{generate_track_id, last_path_segment, sanitize_id, track_color};
use crate::sync::ops::{Operation, Selection, Table};
use crate::sync::record::{decode_batches, SessionRecord};
use crate::sync::store::{SessionSnapshot, StoreReader};

pub(super) fn reconcile(
    batches: &[Vec<Value>],
    store: &dyn StoreReader,
    ctx: &ReconcileContext,
) -> Result<Vec<Operation>, ReconcileError> {
    let records: Vec<SessionRecord> = decode_batches("session", batches)?;
    let entries = records.len();
    log::debug!("Retrieved {} presentation entries.", entries);

    let flags = ctx.mode.writes_change_flags();
    let mut batch = Vec::new();
    let mut session_ids = HashSet::new();
    let mut track_ids = HashSet::new();

    for (session_id, session) in dedupe_last_wins(records, |s| sanitize_id(&s.id)) {
        let (mut op, is_new, is_updated) = match store.session(&session_id)? {
            Some(current) => {
                let updated = is_session_updated(&current, &session);
                let mut op = Operation::update_by_id(Table::Sessions, session_id.as_str())
                    .with_value("new", false)
                    .with_value("starred", current.starred);
                if flags {
                    op.set_value("updated", updated);
                }
                (op, false, updated)
            }
            None => {
                let mut op = Operation::insert(Table::Sessions)
                    .with_value("session_id", session_id.as_str());
                if flags {
                    op.set_value("new", true);
                }
                (op, true, false)
            }
        };

        if is_new || is_updated {
            op.set_value("title", session.title.as_str());
            op.set_value("experience", session.experience.as_str());
            op.set_value("type", session.session_type.as_str());
            op.set_value("summary", session.summary.as_str());
        }

        let track_id = session.track.as_deref().map(generate_track_id);
        if let (Some(name), Some(track_id)) = (session.track.as_deref(), track_id.as_deref()) {
            // First occurrence of a track in the batch defines its row.
            if track_ids.insert(track_id.to_string()) {
                let track_op = if store.exists(Table::Tracks, track_id)? {
                    Operation::update_by_id(Table::Tracks, track_id)
                } else {
                    Operation::insert(Table::Tracks).with_value("track_id", track_id)
                };
                batch.push(
                    track_op
                        .with_value("track_name", name)
                        .with_value("track_color", track_color(track_id)),
                );
            }
        }
        op.set_value("track_id", track_id);
        batch.push(op);

        if let Some(uris) = &session.speakers {
            plan_speaker_links(&session_id, uris, store, flags, &mut batch)?;
        }

        session_ids.insert(session_id);
    }

    if ctx.sweep_enabled(entries) {
        let swept = lost_ids(store, Table::Sessions, &session_ids)?;
        for lost_id in &swept {
            batch.push(Operation::delete_where(
                Table::SessionsSpeakers,
                Selection::new().and("session_id", lost_id.as_str()),
            ));
            batch.push(Operation::delete_by_id(Table::Sessions, lost_id.as_str()));
        }
        for lost_id in lost_ids(store, Table::Tracks, &track_ids)? {
            // Listed sessions were re-pointed above and unlisted ones swept
            // with their links; only lab sessions remain, and they keep
            // their row without the track.
            for session_id in store.session_ids_by_track(&lost_id)? {
                if session_ids.contains(&session_id) || swept.contains(&session_id) {
                    continue;
                }
                batch.push(
                    Operation::update_by_id(Table::Sessions, session_id)
                        .with_value("track_id", None::<String>),
                );
            }
            batch.push(Operation::delete_by_id(Table::Tracks, lost_id));
        }
    }

    Ok(batch)
}

/// Replace a session's speaker links with the incoming set: add missing
/// links, drop extra ones. On remote syncs a change in the number of linked
/// speakers also marks the session updated (speaker identity swaps with an
/// unchanged count are not detected).
fn plan_speaker_links(
    session_id: &str,
    uris: &[String],
    store: &dyn StoreReader,
    flags: bool,
    batch: &mut Vec<Operation>,
) -> Result<(), ReconcileError> {
    let mut incoming: Vec<String> = Vec::with_capacity(uris.len());
    for speaker_id in uris
        .iter()
        .filter_map(|uri| last_path_segment(uri))
        .map(|segment| sanitize_id(&segment))
        .filter(|id| !id.is_empty())
    {
        if !incoming.contains(&speaker_id) {
            incoming.push(speaker_id);
        }
    }

    let existing = store.session_speaker_ids(session_id)?;

    if flags && !existing.is_empty() && existing.len() != incoming.len() {
        log::debug!("Speakers of session with id {} were updated.", session_id);
        batch.push(
            Operation::update_by_id(Table::Sessions, session_id).with_value("updated", true),
        );
    }

    for speaker_id in incoming.iter().filter(|id| !existing.contains(id)) {
        batch.push(
            Operation::insert(Table::SessionsSpeakers)
                .with_value("session_id", session_id)
                .with_value("speaker_id", speaker_id.as_str()),
        );
    }

    for speaker_id in existing.iter().filter(|id| !incoming.contains(id)) {
        batch.push(Operation::delete_where(
            Table::SessionsSpeakers,
            Selection::new()
                .and("session_id", session_id)
                .and("speaker_id", speaker_id.as_str()),
        ));
    }

    Ok(())
}

fn is_session_updated(current: &SessionSnapshot, incoming: &SessionRecord) -> bool {
    !same_text(&current.title, &incoming.title)
        || !same_text(&current.summary, &incoming.summary)
        || !same_text(&current.experience, &incoming.experience)
        || !same_text(
            current.session_type.as_deref().unwrap_or_default(),
            &incoming.session_type,
        )
}
