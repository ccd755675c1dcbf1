//! Deterministic id derivation and small parsing helpers shared by the
//! reconcilers.
//!
//! Every entity id is a pure function of stable remote attributes, which is
//! what makes upsert-by-id idempotent across repeated fetches.

use std::sync::OnceLock;

use chrono::{FixedOffset, NaiveDateTime, TimeZone};
use regex::Regex;

/// Ids starting with this prefix belong to bundled lab data and are never
/// swept as "lost" by a remote sync.
pub const LAB_ID_PREFIX: &str = "lab";

pub const COLOR_DEFAULT: &str = "#F272526";

/// Known track ids and their display colors.
const TRACK_COLORS: &[(&str, &str)] = &[
    ("javacoreseee", "#2A5699"),
    ("webframeworks", "#FFCC00"),
    ("desktopriamobile", "#FF2222"),
    ("newlanguagesonthejvm", "#0FABFF"),
    ("methodology", "#A0CE67"),
    ("architecturesecurity", "#EEB211"),
    ("cloudnosql", "#0066CC"),
    ("other", "#BF0000"),
];

fn unsafe_chars_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9\-_]").expect("valid regex"))
}

fn parenthetical_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(.*?\)").expect("valid regex"))
}

fn trailing_annotation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" \(.*\)").expect("valid regex"))
}

/// Lower-case and strip everything outside `[a-z0-9-_]`.
pub fn sanitize_id(input: &str) -> String {
    unsafe_chars_re()
        .replace_all(&input.to_lowercase(), "")
        .into_owned()
}

/// Like [`sanitize_id`], but drops parenthetical statements first.
pub fn sanitize_id_strip_parens(input: &str) -> String {
    sanitize_id(&parenthetical_re().replace_all(input, ""))
}

pub fn generate_track_id(track_name: &str) -> String {
    sanitize_id(track_name)
}

/// Block ids are derived from kind and timeslot at second resolution, so
/// schedule entries sharing a slot and kind coalesce into one block.
pub fn generate_block_id(kind: &str, start_millis: i64, end_millis: i64) -> String {
    sanitize_id(&format!(
        "{}-{}-{}",
        kind,
        start_millis.div_euclid(1000),
        end_millis.div_euclid(1000)
    ))
}

pub fn track_color(track_id: &str) -> &'static str {
    TRACK_COLORS
        .iter()
        .find(|(id, _)| id.eq_ignore_ascii_case(track_id))
        .map(|(_, color)| *color)
        .unwrap_or(COLOR_DEFAULT)
}

/// Block title for a schedule entry. Lab codes (`D10…`) carry a useless
/// code, so their title comes from the type with trailing ` (…)`
/// annotations removed.
pub fn block_title(code: &str, entry_type: &str) -> String {
    if code.starts_with("D10") {
        trailing_annotation_re()
            .replace_all(entry_type, "")
            .into_owned()
    } else {
        code.to_string()
    }
}

pub fn is_lab_id(id: &str) -> bool {
    id.starts_with(LAB_ID_PREFIX)
}

/// Parse a schedule timestamp (`2010-11-15 09:30`, optionally with seconds,
/// fractional seconds, or a `T` separator) given in the conference's fixed
/// UTC offset. Returns epoch milliseconds.
pub fn parse_schedule_time(value: &str, utc_offset_minutes: i32) -> Option<i64> {
    let normalized = value.trim().replacen('T', " ", 1);
    let naive = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())?;
    let offset = FixedOffset::east_opt(utc_offset_minutes * 60)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.timestamp_millis())
}

/// Last non-empty path segment of a resource reference such as
/// `http://host/rest/v1/events/speakers/123`. Plain strings are split on `/`.
pub fn last_path_segment(reference: &str) -> Option<String> {
    let reference = reference.trim();
    if let Ok(url) = url::Url::parse(reference) {
        if let Some(segment) = url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        {
            return Some(segment.to_string());
        }
    }
    reference
        .split('/')
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
}
