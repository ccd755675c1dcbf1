//! Single-threaded sync queue.
//!
//! Requests are processed one at a time on a dedicated thread, in arrival
//! order; a request made while a sync is running waits for it. Each request
//! gets its own status stream: `Running`, then `Finished` or `Error`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{SyncError, SyncFailure};
use crate::sync::orchestrator::SyncOrchestrator;
use crate::types::{SyncRequest, SyncStatus};

/// Message sent to the worker thread
#[derive(Debug)]
struct SyncMessage {
    request: SyncRequest,
    status: mpsc::UnboundedSender<SyncStatus>,
}

/// Handle to the sync worker thread.
pub struct SyncHandle {
    sender: Option<mpsc::UnboundedSender<SyncMessage>>,
    cancel: Arc<AtomicBool>,
    last_status: Arc<Mutex<Option<SyncStatus>>>,
    thread: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Start the worker thread. The orchestrator (and its database
    /// connection) moves onto that thread for good.
    pub fn spawn(orchestrator: SyncOrchestrator) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let last_status = Arc::new(Mutex::new(None));

        let worker_cancel = cancel.clone();
        let worker_status = last_status.clone();
        let thread = std::thread::Builder::new()
            .name("confsched-sync".to_string())
            .spawn(move || run_loop(orchestrator, receiver, worker_cancel, worker_status))?;

        Ok(Self {
            sender: Some(sender),
            cancel,
            last_status,
            thread: Some(thread),
        })
    }

    /// Queue a sync. The returned receiver yields this request's statuses.
    pub fn request(
        &self,
        request: SyncRequest,
    ) -> Result<mpsc::UnboundedReceiver<SyncStatus>, SyncError> {
        let (status, receiver) = mpsc::unbounded_channel();
        self.sender
            .as_ref()
            .ok_or(SyncError::WorkerStopped)?
            .send(SyncMessage { request, status })
            .map_err(|_| SyncError::WorkerStopped)?;
        Ok(receiver)
    }

    /// Most recent status published by any run.
    pub fn last_status(&self) -> Option<SyncStatus> {
        self.last_status.lock().clone()
    }

    /// Ask the running sync to stop before its next entity group. Batches
    /// already committed stay committed.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Stop accepting requests, let queued ones finish, and join the thread.
    pub fn shutdown(mut self) {
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Sync worker thread panicked");
            }
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        // Closing the channel lets the thread exit once the queue drains.
        self.sender.take();
    }
}

fn run_loop(
    orchestrator: SyncOrchestrator,
    mut receiver: mpsc::UnboundedReceiver<SyncMessage>,
    cancel: Arc<AtomicBool>,
    last_status: Arc<Mutex<Option<SyncStatus>>>,
) {
    log::info!("Sync worker started");
    while let Some(msg) = receiver.blocking_recv() {
        log::info!("Starting sync (force: {})", msg.request.force);
        cancel.store(false, Ordering::SeqCst);

        publish(
            &msg.status,
            &last_status,
            SyncStatus::Running {
                started_at: Utc::now(),
            },
        );

        let status = match orchestrator.run(&msg.request, &cancel) {
            Ok(report) => SyncStatus::Finished {
                finished_at: Utc::now(),
                remote_synced: report.remote_synced,
            },
            Err(e) => SyncStatus::Error {
                error: SyncFailure::from(&e),
            },
        };
        publish(&msg.status, &last_status, status);
    }
    log::info!("Sync worker stopped");
}

fn publish(
    listener: &mpsc::UnboundedSender<SyncStatus>,
    last_status: &Mutex<Option<SyncStatus>>,
    status: SyncStatus,
) {
    *last_status.lock() = Some(status.clone());
    // The caller may have dropped its receiver; the run still counts.
    let _ = listener.send(status);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ScheduleDb;
    use crate::error::ErrorType;
    use crate::sync::checksum::DigestChecksumService;
    use crate::sync::fetch::LocalFetcher;
    use crate::types::Config;
    use std::path::Path;

    /// Orchestrator over `assets` that never goes remote.
    fn offline_orchestrator(root: &Path, assets: &Path) -> SyncOrchestrator {
        let config = Config {
            wifi_only: true,
            on_wifi: false,
            ..Config::default()
        };
        let db = ScheduleDb::open_at(root.join("worker.db")).expect("open db");
        SyncOrchestrator::new(
            db,
            &config,
            Box::new(LocalFetcher::new(assets)),
            Box::new(LocalFetcher::new(assets)),
            Box::new(DigestChecksumService::new(Box::new(LocalFetcher::new(assets)))),
        )
    }

    fn write_empty_assets(dir: &Path) {
        for name in [
            "cache-rooms.json",
            "cache-speakers.json",
            "cache-presentations.json",
            "cache-schedule.json",
        ] {
            std::fs::write(dir.join(name), "[]").expect("write asset");
        }
    }

    fn drain(mut receiver: mpsc::UnboundedReceiver<SyncStatus>) -> Vec<SyncStatus> {
        let mut statuses = Vec::new();
        while let Some(status) = receiver.blocking_recv() {
            statuses.push(status);
        }
        statuses
    }

    #[test]
    fn test_request_reports_running_then_finished() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_empty_assets(dir.path());
        let handle = SyncHandle::spawn(offline_orchestrator(dir.path(), dir.path())).expect("spawn");

        let statuses = drain(handle.request(SyncRequest::default()).expect("queue"));
        assert_eq!(statuses.len(), 2);
        assert!(matches!(statuses[0], SyncStatus::Running { .. }));
        assert!(matches!(
            statuses[1],
            SyncStatus::Finished {
                remote_synced: false,
                ..
            }
        ));
        assert_eq!(handle.last_status(), Some(statuses[1].clone()));
        handle.shutdown();
    }

    #[test]
    fn test_queued_requests_run_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_empty_assets(dir.path());
        let handle = SyncHandle::spawn(offline_orchestrator(dir.path(), dir.path())).expect("spawn");

        let first = handle.request(SyncRequest::default()).expect("queue");
        let second = handle.request(SyncRequest::forced()).expect("queue");
        let first = drain(first);
        let second = drain(second);

        for statuses in [&first, &second] {
            assert_eq!(statuses.len(), 2);
            assert!(statuses[1].is_terminal());
        }
        let finished_at = |s: &SyncStatus| match s {
            SyncStatus::Finished { finished_at, .. } => Some(*finished_at),
            _ => None,
        };
        let started_at = |s: &SyncStatus| match s {
            SyncStatus::Running { started_at } => Some(*started_at),
            _ => None,
        };
        assert!(finished_at(&first[1]) <= started_at(&second[0]));
        handle.shutdown();
    }

    #[test]
    fn test_failure_reported_as_single_error_status() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("no-assets");
        let handle = SyncHandle::spawn(offline_orchestrator(dir.path(), &missing)).expect("spawn");

        let statuses = drain(handle.request(SyncRequest::default()).expect("queue"));
        assert_eq!(statuses.len(), 2);
        match &statuses[1] {
            SyncStatus::Error { error } => {
                assert_eq!(error.error_type, ErrorType::RequiresUserAction);
                assert!(error.message.contains("rooms"));
            }
            other => panic!("expected error status, got {other:?}"),
        }
        handle.shutdown();
    }
}
