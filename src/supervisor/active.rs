//! Active set - the reconciler's table of running lifecycles.
//!
//! An entry is created when a lifecycle is launched. Stopping an application
//! clears its liveness flag and moves the task handle to the draining table,
//! so the identity leaves the active set immediately but cannot be launched
//! again until the previous lifecycle has actually exited.

use std::collections::HashMap;
use std::time::Instant;

use futures::future::join_all;
use tokio::task::{JoinError, JoinHandle};

use crate::domain::{AppId, LifecycleOutcome, RunMode};
use crate::worker::LivenessFlag;

/// One launched lifecycle
#[derive(Debug)]
pub struct ActiveEntry {
    flag: LivenessFlag,
    handle: JoinHandle<LifecycleOutcome>,
    mode: RunMode,
    started_at: Instant,
}

impl ActiveEntry {
    pub fn new(flag: LivenessFlag, handle: JoinHandle<LifecycleOutcome>, mode: RunMode) -> Self {
        Self {
            flag,
            handle,
            mode,
            started_at: Instant::now(),
        }
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn is_alive(&self) -> bool {
        self.flag.is_alive()
    }
}

/// A lifecycle task that has exited and been collected
#[derive(Debug)]
pub struct Reaped {
    pub app: AppId,
    /// The task's result, or the join error if it panicked
    pub outcome: Result<LifecycleOutcome, JoinError>,
    /// True if the application was still desired when its lifecycle ended
    pub was_active: bool,
}

#[derive(Debug, Default)]
pub struct ActiveSet {
    active: HashMap<AppId, ActiveEntry>,
    draining: HashMap<AppId, JoinHandle<LifecycleOutcome>>,
}

impl ActiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly launched lifecycle
    pub fn insert(&mut self, app: AppId, entry: ActiveEntry) {
        self.active.insert(app, entry);
    }

    pub fn contains(&self, app: &str) -> bool {
        self.active.contains_key(app)
    }

    pub fn is_draining(&self, app: &str) -> bool {
        self.draining.contains_key(app)
    }

    pub fn get(&self, app: &str) -> Option<&ActiveEntry> {
        self.active.get(app)
    }

    /// Active application identities, sorted
    pub fn apps(&self) -> Vec<AppId> {
        let mut apps: Vec<AppId> = self.active.keys().cloned().collect();
        apps.sort();
        apps
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn draining_len(&self) -> usize {
        self.draining.len()
    }

    /// Clear the application's liveness flag and move it to draining
    ///
    /// Returns false if the application was not active.
    pub fn stop(&mut self, app: &str) -> bool {
        let Some(entry) = self.active.remove(app) else {
            return false;
        };
        entry.flag.clear();
        if let Some(previous) = self.draining.insert(app.to_string(), entry.handle) {
            // Only possible if a relaunch raced a drain; keep the newer handle.
            previous.abort();
        }
        true
    }

    /// Collect every lifecycle task that has finished
    pub async fn reap(&mut self) -> Vec<Reaped> {
        let finished_active: Vec<AppId> = self
            .active
            .iter()
            .filter(|(_, entry)| entry.handle.is_finished())
            .map(|(app, _)| app.clone())
            .collect();
        let finished_draining: Vec<AppId> = self
            .draining
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(app, _)| app.clone())
            .collect();

        let mut reaped = Vec::new();
        for app in finished_active {
            if let Some(entry) = self.active.remove(&app) {
                let outcome = entry.handle.await;
                reaped.push(Reaped {
                    app,
                    outcome,
                    was_active: true,
                });
            }
        }
        for app in finished_draining {
            if let Some(handle) = self.draining.remove(&app) {
                let outcome = handle.await;
                reaped.push(Reaped {
                    app,
                    outcome,
                    was_active: false,
                });
            }
        }
        reaped
    }

    /// Stop everything and wait for all lifecycles to exit
    pub async fn shutdown(&mut self) -> Vec<Reaped> {
        for app in self.apps() {
            self.stop(&app);
        }

        let (apps, handles): (Vec<AppId>, Vec<_>) = self.draining.drain().unzip();
        join_all(handles)
            .await
            .into_iter()
            .zip(apps)
            .map(|(outcome, app)| Reaped {
                app,
                outcome,
                was_active: false,
            })
            .collect()
    }
}
