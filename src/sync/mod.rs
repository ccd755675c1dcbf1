//! Sync engine: fetch, reconcile, apply.
//!
//! Fetchers return raw JSON arrays, reconcilers turn them into an ordered
//! batch of row operations against the current store, and the applier
//! commits each batch atomically. The orchestrator sequences the groups and
//! the worker runs the orchestrator off the caller's thread.

pub mod apply;
pub mod checksum;
pub mod fetch;
pub mod ids;
pub mod ops;
pub mod orchestrator;
pub mod reconcile;
pub mod record;
pub mod store;
pub mod worker;
