//! Sync orchestrator: one-time local bootstrap, then a conditional remote sync.
//!
//! Progress is a single persisted counter: below `VERSION_LOCAL` the bundled
//! snapshots still need to be loaded, below `VERSION_REMOTE` a remote sync is
//! forced regardless of checksums. Each entity group commits on its own, so
//! a failure in a later group leaves earlier groups applied.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;

use crate::db::ScheduleDb;
use crate::error::SyncError;
use crate::notification::{LogNotifier, NotificationSink};
use crate::sync::apply::{apply_batch, ApplyOutcome};
use crate::sync::checksum::{
    is_changed, ChecksumService, DigestChecksumService, RemoteChecksumService,
};
use crate::sync::fetch::{FetchError, Fetcher, LocalFetcher, RemoteFetcher};
use crate::sync::reconcile::{EntityKind, ReconcileContext, SyncMode};
use crate::types::{local_asset, local_lab_asset, Config, RemoteEndpoints, SyncRequest};

pub const VERSION_NONE: i32 = 0;
pub const VERSION_LOCAL: i32 = 1;
pub const VERSION_REMOTE: i32 = 4;

/// Network policy input for the remote-sync decision.
pub trait Connectivity: Send {
    fn is_wifi(&self) -> bool;
}

/// Connectivity fixed at construction time.
#[derive(Debug, Clone, Copy)]
pub struct StaticConnectivity {
    pub wifi: bool,
}

impl Connectivity for StaticConnectivity {
    fn is_wifi(&self) -> bool {
        self.wifi
    }
}

/// One committed entity-group batch.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupReport {
    pub kind: EntityKind,
    pub mode: SyncMode,
    pub outcome: ApplyOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub bootstrapped: bool,
    pub remote_synced: bool,
    pub notified: bool,
    pub groups: Vec<GroupReport>,
}

impl SyncReport {
    pub fn group(&self, kind: EntityKind, mode: SyncMode) -> Option<&ApplyOutcome> {
        self.groups
            .iter()
            .find(|g| g.kind == kind && g.mode == mode)
            .map(|g| &g.outcome)
    }
}

pub struct SyncOrchestrator {
    db: ScheduleDb,
    local: Box<dyn Fetcher>,
    remote: Box<dyn Fetcher>,
    checksums: Box<dyn ChecksumService>,
    connectivity: Box<dyn Connectivity>,
    notifier: Box<dyn NotificationSink>,
    endpoints: RemoteEndpoints,
    wifi_only: bool,
    notifications: bool,
    utc_offset_minutes: i32,
}

impl SyncOrchestrator {
    pub fn new(
        db: ScheduleDb,
        config: &Config,
        local: Box<dyn Fetcher>,
        remote: Box<dyn Fetcher>,
        checksums: Box<dyn ChecksumService>,
    ) -> Self {
        Self {
            db,
            local,
            remote,
            checksums,
            connectivity: Box::new(StaticConnectivity {
                wifi: config.on_wifi,
            }),
            notifier: Box::new(LogNotifier),
            endpoints: config.endpoints.clone(),
            wifi_only: config.wifi_only,
            notifications: config.notifications,
            utc_offset_minutes: config.utc_offset_minutes,
        }
    }

    /// Wire up the production collaborators described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, SyncError> {
        let db_path = match &config.db_path {
            Some(path) => PathBuf::from(path),
            None => ScheduleDb::db_path()?,
        };
        let db = ScheduleDb::open_at(db_path)?;

        let timeout = Duration::from_secs(config.http_timeout_secs);
        let remote_fetcher = || {
            RemoteFetcher::new(timeout).map_err(|e| SyncError::Configuration(e.to_string()))
        };
        let checksums: Box<dyn ChecksumService> = match &config.checksum_service {
            Some(url) => Box::new(
                RemoteChecksumService::new(url, timeout)
                    .map_err(|e| SyncError::Configuration(e.to_string()))?,
            ),
            None => Box::new(DigestChecksumService::new(Box::new(remote_fetcher()?))),
        };

        Ok(Self::new(
            db,
            config,
            Box::new(LocalFetcher::new(&config.assets_dir)),
            Box::new(remote_fetcher()?),
            checksums,
        ))
    }

    pub fn with_connectivity(mut self, connectivity: Box<dyn Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn db(&self) -> &ScheduleDb {
        &self.db
    }

    /// Run one sync. The attempt (and its error, if any) is recorded
    /// whatever the outcome.
    pub fn run(&self, request: &SyncRequest, cancel: &AtomicBool) -> Result<SyncReport, SyncError> {
        let started = Utc::now();
        let result = self.run_phases(request, cancel);

        let error = result.as_ref().err().map(ToString::to_string);
        if let Err(e) = self.db.record_sync_attempt(started, error.as_deref()) {
            log::warn!("Failed to record sync attempt: {}", e);
        }
        match &result {
            Ok(report) => log::info!(
                "Sync finished (bootstrap: {}, remote: {})",
                report.bootstrapped,
                report.remote_synced
            ),
            Err(e) => log::error!("Problem while syncing: {}", e),
        }
        result
    }

    fn run_phases(&self, request: &SyncRequest, cancel: &AtomicBool) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();

        let local_version = self.db.local_version()?;
        log::debug!(
            "Found local_version={} (VERSION_LOCAL={})",
            local_version,
            VERSION_LOCAL
        );

        let bootstrap = local_version < VERSION_LOCAL;
        if bootstrap {
            let start = Instant::now();
            self.bootstrap(cancel, &mut report)?;
            self.db.set_local_version(VERSION_LOCAL)?;
            report.bootstrapped = true;
            log::info!("Local bootstrap took {}ms", start.elapsed().as_millis());
        }

        let version = self.db.local_version()?;
        if self.should_sync_remote(request, version)? {
            let start = Instant::now();
            let started_at = Utc::now();
            self.sync_remote(cancel, &mut report)?;
            self.db.set_last_remote_sync(started_at)?;
            self.db.set_local_version(VERSION_REMOTE)?;
            report.remote_synced = true;
            log::info!("Remote sync took {}ms", start.elapsed().as_millis());
        }

        // Bootstrap data was always there; only a later remote sync has news.
        if !bootstrap && report.remote_synced && self.notifications {
            self.notify()?;
            report.notified = true;
        }

        Ok(report)
    }

    fn check_cancelled(cancel: &AtomicBool) -> Result<(), SyncError> {
        if cancel.load(Ordering::SeqCst) {
            log::info!("Sync cancelled before next entity group");
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    fn bootstrap(&self, cancel: &AtomicBool, report: &mut SyncReport) -> Result<(), SyncError> {
        for kind in EntityKind::SYNC_ORDER {
            Self::check_cancelled(cancel)?;
            let items = self
                .local
                .fetch(local_asset(kind))
                .map_err(|source| SyncError::Fetch {
                    group: kind.name(),
                    source,
                })?;
            self.reconcile_and_apply(kind, SyncMode::Local, &[items], report)?;

            let Some(lab_asset) = local_lab_asset(kind) else {
                continue;
            };
            match self.local.fetch(lab_asset) {
                Ok(items) => {
                    self.reconcile_and_apply(kind, SyncMode::LocalLab, &[items], report)?;
                }
                Err(FetchError::AssetMissing(path)) => {
                    log::debug!("No bundled lab data at {}", path.display());
                }
                Err(source) => {
                    return Err(SyncError::Fetch {
                        group: kind.name(),
                        source,
                    })
                }
            }
        }
        Ok(())
    }

    /// Cheapest checks first: connectivity policy, version, force flag, and
    /// only then the checksum round-trips.
    fn should_sync_remote(&self, request: &SyncRequest, version: i32) -> Result<bool, SyncError> {
        if self.wifi_only && !self.connectivity.is_wifi() {
            log::info!("Not syncing remotely: Wi-Fi only and not on Wi-Fi");
            return Ok(false);
        }
        if version < VERSION_REMOTE {
            log::info!("Remote sync needed: local_version={}", version);
            return Ok(true);
        }
        if request.force {
            log::info!("Remote sync forced");
            return Ok(true);
        }
        for url in self.endpoints.tracked_urls() {
            let current = self.remote_checksum(url);
            let stored = self.db.checksum(url)?;
            if is_changed(current.as_deref(), stored.as_deref()) {
                log::info!("Remote content changed at {}", url);
                return Ok(true);
            }
        }
        log::info!("Remote content unchanged; skipping remote sync");
        Ok(false)
    }

    /// Checksum lookups never fail a sync; an error means "unknown".
    fn remote_checksum(&self, url: &str) -> Option<String> {
        match self.checksums.checksum(url) {
            Ok(digest) => digest,
            Err(e) => {
                log::warn!("Checksum lookup failed for {}: {}", url, e);
                None
            }
        }
    }

    fn sync_remote(&self, cancel: &AtomicBool, report: &mut SyncReport) -> Result<(), SyncError> {
        for kind in EntityKind::SYNC_ORDER {
            Self::check_cancelled(cancel)?;

            let urls = self.endpoints.urls_for(kind);
            let mut batches: Vec<Vec<Value>> = Vec::with_capacity(urls.len());
            let mut digests: Vec<(&str, String)> = Vec::with_capacity(urls.len());
            for url in urls {
                if let Some(digest) = self.remote_checksum(url) {
                    digests.push((url, digest));
                }
                let items = self.remote.fetch(url).map_err(|source| SyncError::Fetch {
                    group: kind.name(),
                    source,
                })?;
                batches.push(items);
            }

            self.reconcile_and_apply(kind, SyncMode::Remote, &batches, report)?;

            for (url, digest) in digests {
                self.db.update_checksum(url, &digest)?;
            }
        }
        Ok(())
    }

    fn reconcile_and_apply(
        &self,
        kind: EntityKind,
        mode: SyncMode,
        batches: &[Vec<Value>],
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let ctx = ReconcileContext::new(mode).with_utc_offset(self.utc_offset_minutes);
        let ops = kind
            .reconcile(batches, &self.db, &ctx)
            .map_err(|source| SyncError::Reconcile {
                group: kind.name(),
                source,
            })?;
        let outcome = apply_batch(&self.db, &ops).map_err(|source| SyncError::Apply {
            group: kind.name(),
            source,
        })?;
        log::info!(
            "{} ({:?}): {} inserted, {} updated, {} deleted",
            kind.name(),
            mode,
            outcome.inserted,
            outcome.updated,
            outcome.deleted
        );
        report.groups.push(GroupReport {
            kind,
            mode,
            outcome,
        });
        Ok(())
    }

    fn notify(&self) -> Result<(), SyncError> {
        self.notifier.cancel_all();

        let new_sessions = self.db.new_sessions()?;
        if !new_sessions.is_empty() {
            self.notifier.notify_new_sessions(&new_sessions);
        }

        let changed = self.db.updated_starred_sessions()?;
        if !changed.is_empty() {
            self.notifier.notify_changed_starred_sessions(&changed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
