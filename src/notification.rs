//! Post-sync notifications
//!
//! The orchestrator decides *when* to notify (after a remote sync that was
//! not part of a first-launch bootstrap); a `NotificationSink` decides how
//! the user sees it.

use crate::db::SessionSummary;

pub trait NotificationSink: Send {
    /// Withdraw notifications from a previous sync.
    fn cancel_all(&self);

    /// Sessions added by the remote sync. Not called with an empty slice.
    fn notify_new_sessions(&self, sessions: &[SessionSummary]);

    /// Starred sessions whose content changed. Not called with an empty slice.
    fn notify_changed_starred_sessions(&self, sessions: &[SessionSummary]);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn cancel_all(&self) {
        log::debug!("Cleared previous sync notifications");
    }

    fn notify_new_sessions(&self, sessions: &[SessionSummary]) {
        log::info!("{}", new_sessions_message(sessions.len()));
    }

    fn notify_changed_starred_sessions(&self, sessions: &[SessionSummary]) {
        log::info!(
            "{}: {}",
            changed_starred_title(sessions.len()),
            summarize_titles(sessions, 100)
        );
    }
}

pub fn new_sessions_message(count: usize) -> String {
    match count {
        1 => "1 new session was added to the schedule".to_string(),
        n => format!("{n} new sessions were added to the schedule"),
    }
}

pub fn changed_starred_title(count: usize) -> String {
    match count {
        1 => "A starred session changed".to_string(),
        n => format!("{n} starred sessions changed"),
    }
}

/// Comma-joined titles, cut at `max_chars` characters.
pub fn summarize_titles(sessions: &[SessionSummary], max_chars: usize) -> String {
    let joined = sessions
        .iter()
        .map(|s| s.title.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    if joined.chars().count() > max_chars {
        let cut: String = joined.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        joined
    }
}
