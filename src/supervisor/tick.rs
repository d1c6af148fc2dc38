//! Poll tick bookkeeping
//!
//! Each reconciliation pass:
//! - Drains worker events
//! - Reaps lifecycles that have exited
//! - Fetches the manifest and diffs it against the active set
//! - Starts and stops lifecycles

use std::collections::HashMap;

use crate::domain::AppId;

/// What a single reconciliation pass decided
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Applications whose lifecycle was launched
    pub started: Vec<AppId>,
    /// Applications whose liveness flag was cleared
    pub stopped: Vec<AppId>,
    /// Applications that failed sync or run-mode resolution this pass
    pub skipped: Vec<AppId>,
    /// Applications waiting for a previous lifecycle to finish draining
    pub deferred: Vec<AppId>,
}

impl ReconcileReport {
    /// True if the pass changed nothing
    pub fn is_noop(&self) -> bool {
        self.started.is_empty() && self.stopped.is_empty()
    }
}

/// Counters accumulated across ticks
#[derive(Debug, Default)]
pub struct TickState {
    /// Number of ticks since start
    pub tick_count: u64,
    /// Lifecycles launched this session
    pub total_started: u64,
    /// Lifecycles asked to stop this session
    pub total_stopped: u64,
    /// Lifecycles that exited while their application was still desired
    pub total_failed: u64,
    /// Start attempts skipped for sync or directive errors
    pub total_skipped: u64,
    /// Ticks whose manifest fetch failed
    pub manifest_failures: u64,
    /// Worker processes spawned this session
    pub total_launches: u64,
    /// Worker processes spawned, per application still being tracked
    pub launches: HashMap<AppId, u64>,
    /// Worker processes that failed to spawn
    pub launch_failures: u64,
}

impl TickState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new tick
    pub fn tick(&mut self) {
        self.tick_count += 1;
    }

    /// Fold a reconcile report into the totals
    pub fn record(&mut self, report: &ReconcileReport) {
        self.total_started += report.started.len() as u64;
        self.total_stopped += report.stopped.len() as u64;
        self.total_skipped += report.skipped.len() as u64;
    }

    pub fn failed(&mut self, count: usize) {
        self.total_failed += count as u64;
    }

    pub fn manifest_failed(&mut self) {
        self.manifest_failures += 1;
    }

    pub fn launched(&mut self, app: &str) {
        self.total_launches += 1;
        *self.launches.entry(app.to_string()).or_insert(0) += 1;
    }

    /// Drop per-application counters once its lifecycle has been released
    pub fn forget(&mut self, app: &str) {
        self.launches.remove(app);
    }

    pub fn launch_failed(&mut self) {
        self.launch_failures += 1;
    }

    /// Processes spawned for one application this session
    pub fn launches_for(&self, app: &str) -> u64 {
        self.launches.get(app).copied().unwrap_or(0)
    }
}
