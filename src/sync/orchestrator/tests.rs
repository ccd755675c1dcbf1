use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use super::*;
use crate::db::{DbSession, SessionSummary};
use crate::sync::checksum::ChecksumError;
use crate::sync::ops::Table;
use crate::sync::store::StoreReader;

// =============================================================================
// Fakes
// =============================================================================

/// Serves canned payloads by URL; unknown URLs answer 404.
struct MapFetcher {
    payloads: HashMap<String, Vec<Value>>,
    failing: HashSet<String>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl Fetcher for MapFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<Value>, FetchError> {
        self.calls.lock().push(url.to_string());
        if self.failing.contains(url) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: 500,
            });
        }
        self.payloads
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

struct MapChecksums(HashMap<String, String>);

impl ChecksumService for MapChecksums {
    fn checksum(&self, url: &str) -> Result<Option<String>, ChecksumError> {
        Ok(self.0.get(url).cloned())
    }
}

struct RecordingNotifier(Arc<Mutex<Vec<String>>>);

impl NotificationSink for RecordingNotifier {
    fn cancel_all(&self) {
        self.0.lock().push("cancel".to_string());
    }

    fn notify_new_sessions(&self, sessions: &[SessionSummary]) {
        self.0.lock().push(format!("new:{}", ids(sessions)));
    }

    fn notify_changed_starred_sessions(&self, sessions: &[SessionSummary]) {
        self.0.lock().push(format!("starred:{}", ids(sessions)));
    }
}

fn ids(sessions: &[SessionSummary]) -> String {
    sessions
        .iter()
        .map(|s| s.session_id.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

// =============================================================================
// Fixtures
// =============================================================================

const ROOMS_URL: &str = "http://cfp.test/rest/v1/events/1/schedule/rooms";
const SPEAKERS_URL: &str = "http://cfp.test/rest/v1/events/1/speakers";
const PRESENTATIONS_URL: &str = "http://cfp.test/rest/v1/events/1/presentations";
const SCHEDULE_URL: &str = "http://cfp.test/rest/v1/events/1/schedule";

fn test_endpoints() -> RemoteEndpoints {
    RemoteEndpoints {
        rooms: ROOMS_URL.to_string(),
        speakers: SPEAKERS_URL.to_string(),
        presentations: PRESENTATIONS_URL.to_string(),
        schedule: SCHEDULE_URL.to_string(),
        lab_speakers: None,
        lab_presentations: None,
        lab_schedule: None,
    }
}

fn rooms() -> Vec<Value> {
    vec![
        json!({"id": "room8", "name": "Room 8", "capacity": "340"}),
        json!({"id": "room9", "name": "Room 9", "capacity": "120"}),
    ]
}

fn speakers() -> Vec<Value> {
    [("1", "Ada", "Lovelace"), ("2", "Alan", "Turing"), ("3", "Grace", "Hopper")]
        .iter()
        .map(|(id, first, last)| {
            json!({
                "id": id, "firstName": first, "lastName": last,
                "bio": "", "company": "", "imageURI": ""
            })
        })
        .collect()
}

fn speaker_uri(id: &str) -> Value {
    json!({ "speakerUri": format!("http://cfp.test/rest/v1/events/speakers/{id}") })
}

fn session(id: &str, title: &str, speaker_ids: &[&str]) -> Value {
    json!({
        "id": id,
        "title": title,
        "summary": "About things",
        "experience": "Intermediate",
        "type": "Conference",
        "speakers": speaker_ids.iter().map(|s| speaker_uri(s)).collect::<Vec<_>>()
    })
}

fn schedule_entry(session_id: &str, from: &str, to: &str) -> Value {
    json!({
        "fromTime": from,
        "toTime": to,
        "kind": "Talk",
        "type": "Conference",
        "code": "C01",
        "room": "Room 8",
        "presentationUri": format!("http://cfp.test/rest/v1/events/presentations/{session_id}")
    })
}

/// Schedule placing every session in its own slot.
fn schedule_for(session_ids: &[&str]) -> Vec<Value> {
    session_ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            schedule_entry(
                id,
                &format!("2010-11-15 {:02}:00", 9 + i),
                &format!("2010-11-15 {:02}:00", 10 + i),
            )
        })
        .collect()
}

struct Harness {
    _dir: tempfile::TempDir,
    db_path: PathBuf,
    assets: PathBuf,
    remote: HashMap<String, Vec<Value>>,
    failing: HashSet<String>,
    digests: HashMap<String, String>,
    remote_calls: Arc<Mutex<Vec<String>>>,
    events: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    /// Bundled assets: 2 rooms, 3 speakers, 2 sessions (one with both of
    /// the first two speakers, one with none), 1 schedule entry.
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let assets = dir.path().join("assets");
        std::fs::create_dir_all(&assets).expect("assets dir");

        let harness = Self {
            db_path: dir.path().join("confsched.db"),
            assets,
            remote: HashMap::new(),
            failing: HashSet::new(),
            digests: HashMap::new(),
            remote_calls: Arc::new(Mutex::new(Vec::new())),
            events: Arc::new(Mutex::new(Vec::new())),
            _dir: dir,
        };
        harness.write_asset("cache-rooms.json", rooms());
        harness.write_asset("cache-speakers.json", speakers());
        harness.write_asset(
            "cache-presentations.json",
            vec![
                session("s1", "Rust in Production", &["1", "2"]),
                session("s2", "Lunch Talk", &[]),
            ],
        );
        harness.write_asset(
            "cache-schedule.json",
            vec![schedule_entry("s1", "2010-11-15 09:30", "2010-11-15 10:30")],
        );
        harness
    }

    fn write_asset(&self, name: &str, items: Vec<Value>) {
        std::fs::write(
            self.assets.join(name),
            serde_json::to_vec(&Value::Array(items)).expect("serialize"),
        )
        .expect("write asset");
    }

    /// Remote payloads mirroring `sessions`, with a schedule covering all of them.
    fn serve(&mut self, sessions: Vec<Value>) {
        let session_ids: Vec<String> = sessions
            .iter()
            .filter_map(|s| s["id"].as_str().map(str::to_string))
            .collect();
        let id_refs: Vec<&str> = session_ids.iter().map(String::as_str).collect();
        self.remote.insert(ROOMS_URL.to_string(), rooms());
        self.remote.insert(SPEAKERS_URL.to_string(), speakers());
        self.remote.insert(PRESENTATIONS_URL.to_string(), sessions);
        self.remote.insert(SCHEDULE_URL.to_string(), schedule_for(&id_refs));
    }

    fn digest_all(&mut self, digest: &str) {
        for url in test_endpoints().tracked_urls() {
            self.digests.insert(url.to_string(), digest.to_string());
        }
    }

    fn orchestrator(&self, wifi: bool, wifi_only: bool) -> SyncOrchestrator {
        let config = Config {
            wifi_only,
            endpoints: test_endpoints(),
            ..Config::default()
        };
        let db = ScheduleDb::open_at(self.db_path.clone()).expect("open db");
        SyncOrchestrator::new(
            db,
            &config,
            Box::new(LocalFetcher::new(&self.assets)),
            Box::new(MapFetcher {
                payloads: self.remote.clone(),
                failing: self.failing.clone(),
                calls: self.remote_calls.clone(),
            }),
            Box::new(MapChecksums(self.digests.clone())),
        )
        .with_connectivity(Box::new(StaticConnectivity { wifi }))
        .with_notifier(Box::new(RecordingNotifier(self.events.clone())))
    }

    /// Run with remote sync suppressed (Wi-Fi only, not on Wi-Fi).
    fn run_offline(&self) -> Result<SyncReport, SyncError> {
        self.orchestrator(false, true)
            .run(&SyncRequest::default(), &AtomicBool::new(false))
    }

    fn run_online(&self, request: SyncRequest) -> Result<SyncReport, SyncError> {
        self.orchestrator(true, true)
            .run(&request, &AtomicBool::new(false))
    }

    fn db(&self) -> ScheduleDb {
        ScheduleDb::open_at(self.db_path.clone()).expect("open db")
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

fn session_row(db: &ScheduleDb, id: &str) -> DbSession {
    db.get_session(id).expect("query").expect("session present")
}

// =============================================================================
// Bootstrap
// =============================================================================

#[test]
fn test_bootstrap_scenario_counts() {
    let harness = Harness::new();
    let report = harness.run_offline().expect("bootstrap");

    assert!(report.bootstrapped);
    assert!(!report.remote_synced);
    assert!(!report.notified);

    let rooms = report.group(EntityKind::Rooms, SyncMode::Local).expect("rooms");
    assert_eq!((rooms.inserted, rooms.updated, rooms.deleted), (2, 0, 0));

    let speakers = report.group(EntityKind::Speakers, SyncMode::Local).expect("speakers");
    assert_eq!((speakers.inserted, speakers.updated, speakers.deleted), (3, 0, 0));

    // 2 session rows + 2 speaker links.
    let sessions = report.group(EntityKind::Sessions, SyncMode::Local).expect("sessions");
    assert_eq!((sessions.inserted, sessions.updated, sessions.deleted), (4, 0, 0));

    // 1 block insert, 1 session update attaching block and room.
    let schedule = report.group(EntityKind::Schedule, SyncMode::Local).expect("schedule");
    assert_eq!((schedule.inserted, schedule.updated, schedule.deleted), (1, 1, 0));

    let db = harness.db();
    assert_eq!(db.count_rows(Table::Blocks).expect("count"), 1);
    assert_eq!(db.count_rows(Table::SessionsSpeakers).expect("count"), 2);
    for id in ["s1", "s2"] {
        let row = session_row(&db, id);
        assert!(!row.is_new, "bootstrap must not flag {id} as new");
        assert!(!row.is_updated);
    }
    let s1 = session_row(&db, "s1");
    assert_eq!(s1.room_id.as_deref(), Some("room8"));
    assert_eq!(s1.block_id.as_deref(), Some("talk-1289809800-1289813400"));
    assert_eq!(db.local_version().expect("version"), VERSION_LOCAL);
    assert!(harness.remote_calls.lock().is_empty());
    assert!(harness.events().is_empty());
}

#[test]
fn test_bootstrap_twice_is_noop() {
    let harness = Harness::new();
    harness.run_offline().expect("bootstrap");

    // A second run no longer bootstraps; reset the counter to force it.
    let db = harness.db();
    db.set_local_version(VERSION_NONE).expect("reset");
    let before = db.list_sessions().expect("list");
    drop(db);

    let report = harness.run_offline().expect("bootstrap again");
    assert!(report.bootstrapped);
    let db = harness.db();
    assert_eq!(db.list_sessions().expect("list"), before);
    assert_eq!(db.count_rows(Table::SessionsSpeakers).expect("count"), 2);
    assert_eq!(db.count_rows(Table::Rooms).expect("count"), 2);
    let links = report.group(EntityKind::Sessions, SyncMode::Local).expect("sessions");
    assert_eq!(links.inserted, 0, "existing links are not re-inserted");
}

#[test]
fn test_bundled_lab_assets_are_loaded_when_present() {
    let harness = Harness::new();
    harness.write_asset(
        "cache-labs-presentations.json",
        vec![session("lab-hands-on", "Hands-on Lab", &["3"])],
    );
    let report = harness.run_offline().expect("bootstrap");

    assert!(report.group(EntityKind::Sessions, SyncMode::LocalLab).is_some());
    assert!(report.group(EntityKind::Speakers, SyncMode::LocalLab).is_none());
    let db = harness.db();
    assert!(db.exists(Table::Sessions, "lab-hands-on").expect("exists"));
}

#[test]
fn test_missing_bundled_asset_fails_bootstrap() {
    let harness = Harness::new();
    std::fs::remove_file(harness.assets.join("cache-speakers.json")).expect("remove");

    let err = harness.run_offline().expect_err("bootstrap must fail");
    assert!(matches!(
        err,
        SyncError::Fetch {
            group: "speakers",
            source: FetchError::AssetMissing(_)
        }
    ));

    let db = harness.db();
    // Rooms committed before the failure stay; the version does not advance.
    assert_eq!(db.count_rows(Table::Rooms).expect("count"), 2);
    assert_eq!(db.local_version().expect("version"), VERSION_NONE);
    assert!(db.last_sync_error().expect("error").is_some());
}

// =============================================================================
// Remote sync
// =============================================================================

#[test]
fn test_first_remote_sync_is_forced_and_persists_checksums() {
    let mut harness = Harness::new();
    harness.serve(vec![
        session("s1", "Rust in Production", &["1", "2"]),
        session("s2", "Lunch Talk", &[]),
    ]);
    harness.digest_all("d1");
    harness.run_offline().expect("bootstrap");

    let report = harness.run_online(SyncRequest::default()).expect("remote");
    assert!(report.remote_synced);
    assert!(report.notified);

    let db = harness.db();
    assert_eq!(db.local_version().expect("version"), VERSION_REMOTE);
    assert!(db.last_remote_sync().expect("last sync").is_some());
    for url in test_endpoints().tracked_urls() {
        assert_eq!(db.checksum(url).expect("checksum"), Some("d1".to_string()));
    }
    // Nothing new, nothing starred: only the cancel call.
    assert_eq!(harness.events(), vec!["cancel".to_string()]);
}

#[test]
fn test_remote_sync_is_idempotent() {
    let mut harness = Harness::new();
    harness.serve(vec![
        session("s1", "Rust in Production", &["1", "2"]),
        session("s2", "Lunch Talk", &[]),
    ]);
    harness.run_offline().expect("bootstrap");

    harness.run_online(SyncRequest::forced()).expect("first remote");
    let db = harness.db();
    let sessions = db.list_sessions().expect("list");
    let links = db.count_rows(Table::SessionsSpeakers).expect("count");
    let blocks = db.count_rows(Table::Blocks).expect("count");
    drop(db);

    let report = harness.run_online(SyncRequest::forced()).expect("second remote");
    let db = harness.db();
    assert_eq!(db.list_sessions().expect("list"), sessions);
    assert_eq!(db.count_rows(Table::SessionsSpeakers).expect("count"), links);
    assert_eq!(db.count_rows(Table::Blocks).expect("count"), blocks);
    for group in &report.groups {
        assert_eq!(group.outcome.inserted, 0, "{:?} re-inserted rows", group.kind);
        assert_eq!(group.outcome.deleted, 0, "{:?} deleted rows", group.kind);
    }
}

#[test]
fn test_user_state_survives_remote_title_change() {
    let mut harness = Harness::new();
    harness.run_offline().expect("bootstrap");

    let db = harness.db();
    db.set_starred("s1", true).expect("star");
    db.set_note("s1", "front row").expect("note");
    drop(db);

    harness.serve(vec![
        session("s1", "Rust in Production, Revisited", &["1", "2"]),
        session("s2", "Lunch Talk", &[]),
    ]);
    harness.run_online(SyncRequest::default()).expect("remote");

    let db = harness.db();
    let s1 = session_row(&db, "s1");
    assert_eq!(s1.title, "Rust in Production, Revisited");
    assert!(s1.starred);
    assert_eq!(s1.note, "front row");
    assert!(s1.is_updated);
    assert!(!session_row(&db, "s2").is_updated);

    assert_eq!(
        harness.events(),
        vec!["cancel".to_string(), "starred:s1".to_string()]
    );
}

#[test]
fn test_lost_session_deleted_with_links() {
    let mut harness = Harness::new();
    harness.serve(vec![
        session("a", "A", &["1"]),
        session("b", "B", &["2"]),
        session("c", "C", &["3"]),
    ]);
    harness.run_offline().expect("bootstrap");
    harness.run_online(SyncRequest::forced()).expect("remote with c");
    assert!(harness.db().exists(Table::Sessions, "c").expect("exists"));

    harness.serve(vec![session("a", "A", &["1"]), session("b", "B", &["2"])]);
    harness.run_online(SyncRequest::forced()).expect("remote without c");

    let db = harness.db();
    assert!(!db.exists(Table::Sessions, "c").expect("exists"));
    assert!(db.session_speaker_ids("c").expect("links").is_empty());
    assert_eq!(db.session_speaker_ids("a").expect("links"), vec!["1".to_string()]);
    // Bundled sessions missing from the remote listing are gone too.
    assert!(!db.exists(Table::Sessions, "s1").expect("exists"));
}

#[test]
fn test_new_sessions_notified_after_remote_sync() {
    let mut harness = Harness::new();
    harness.run_offline().expect("bootstrap");
    harness.serve(vec![
        session("s1", "Rust in Production", &["1", "2"]),
        session("s2", "Lunch Talk", &[]),
        session("s3", "Late Addition", &["3"]),
    ]);
    harness.run_online(SyncRequest::default()).expect("remote");

    let db = harness.db();
    assert!(session_row(&db, "s3").is_new);
    assert!(!session_row(&db, "s1").is_new);
    assert_eq!(
        harness.events(),
        vec!["cancel".to_string(), "new:s3".to_string()]
    );
}

#[test]
fn test_no_notifications_when_bootstrap_and_remote_share_a_run() {
    let mut harness = Harness::new();
    harness.serve(vec![session("s9", "Remote Only", &[])]);
    let report = harness.run_online(SyncRequest::default()).expect("run");
    assert!(report.bootstrapped);
    assert!(report.remote_synced);
    assert!(!report.notified);
    assert!(harness.events().is_empty());
}

// =============================================================================
// Remote-sync decision
// =============================================================================

#[test]
fn test_unchanged_checksums_skip_remote_sync() {
    let mut harness = Harness::new();
    harness.serve(vec![session("s1", "Rust in Production", &["1", "2"])]);
    harness.digest_all("d1");
    harness.run_offline().expect("bootstrap");
    harness.run_online(SyncRequest::default()).expect("first remote");
    harness.remote_calls.lock().clear();

    let report = harness.run_online(SyncRequest::default()).expect("second run");
    assert!(!report.remote_synced);
    assert!(harness.remote_calls.lock().is_empty());

    harness.digests.insert(SCHEDULE_URL.to_string(), "d2".to_string());
    let report = harness.run_online(SyncRequest::default()).expect("third run");
    assert!(report.remote_synced);
    assert_eq!(
        harness.db().checksum(SCHEDULE_URL).expect("checksum"),
        Some("d2".to_string())
    );
}

#[test]
fn test_unknown_checksum_is_not_a_change() {
    let mut harness = Harness::new();
    harness.serve(vec![session("s1", "Rust in Production", &["1", "2"])]);
    harness.run_offline().expect("bootstrap");
    harness.run_online(SyncRequest::default()).expect("first remote");

    // No digests at all: nothing can be proven changed.
    let report = harness.run_online(SyncRequest::default()).expect("second run");
    assert!(!report.remote_synced);

    let report = harness.run_online(SyncRequest::forced()).expect("forced run");
    assert!(report.remote_synced);
}

#[test]
fn test_wifi_only_skips_remote_sync() {
    let mut harness = Harness::new();
    harness.serve(vec![session("s1", "Rust in Production", &["1", "2"])]);
    harness.run_offline().expect("bootstrap");

    let report = harness
        .orchestrator(false, true)
        .run(&SyncRequest::forced(), &AtomicBool::new(false))
        .expect("run");
    assert!(!report.remote_synced);
    assert!(harness.remote_calls.lock().is_empty());

    // Without the Wi-Fi preference the cellular connection is fine.
    let report = harness
        .orchestrator(false, false)
        .run(&SyncRequest::default(), &AtomicBool::new(false))
        .expect("run");
    assert!(report.remote_synced);
}

// =============================================================================
// Failures and cancellation
// =============================================================================

#[test]
fn test_failed_group_keeps_earlier_groups_committed() {
    let mut harness = Harness::new();
    harness.serve(vec![session("s1", "Rust in Production", &["1", "2"])]);
    harness.digest_all("d1");
    harness.failing.insert(SCHEDULE_URL.to_string());
    harness.run_offline().expect("bootstrap");

    let err = harness
        .run_online(SyncRequest::default())
        .expect_err("schedule fetch fails");
    assert!(matches!(err, SyncError::Fetch { group: "schedule", .. }));
    assert!(err.is_retryable());

    let db = harness.db();
    // Sessions group committed: s2 is gone from the remote listing.
    assert!(!db.exists(Table::Sessions, "s2").expect("exists"));
    assert_eq!(db.checksum(PRESENTATIONS_URL).expect("checksum"), Some("d1".into()));
    assert_eq!(db.checksum(SCHEDULE_URL).expect("checksum"), None);
    assert_eq!(db.local_version().expect("version"), VERSION_LOCAL);
    assert_eq!(db.last_remote_sync().expect("last"), None);
    let recorded = db.last_sync_error().expect("error").expect("recorded");
    assert!(recorded.contains("schedule"));
    assert!(harness.events().is_empty());
}

#[test]
fn test_cancel_stops_before_next_group() {
    let harness = Harness::new();
    let cancel = AtomicBool::new(true);
    let err = harness
        .orchestrator(false, true)
        .run(&SyncRequest::default(), &cancel)
        .expect_err("cancelled");
    assert!(matches!(err, SyncError::Cancelled));

    let db = harness.db();
    assert_eq!(db.count_rows(Table::Rooms).expect("count"), 0);
    assert_eq!(db.local_version().expect("version"), VERSION_NONE);
    assert!(db.last_sync_attempt().expect("attempt").is_some());
}

#[test]
fn test_successful_run_clears_previous_error() {
    let harness = Harness::new();
    let db = harness.db();
    db.record_sync_attempt(Utc::now(), Some("earlier failure"))
        .expect("seed error");
    drop(db);

    harness.run_offline().expect("bootstrap");
    assert_eq!(harness.db().last_sync_error().expect("error"), None);
}
