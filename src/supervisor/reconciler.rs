//! Reconciler - keeps the active set in line with the manifest.
//!
//! On every poll the reconciler fetches a fresh desired set, stops the
//! lifecycles of applications that disappeared, and launches lifecycles for
//! applications that appeared. Applications present in both are left alone:
//! an upstream change to a running script only takes effect after it is
//! removed and added again.

use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::domain::{AppId, RunMode, WorkerEvent};
use crate::error::Result;
use crate::source::{ArtifactSync, Manifest, ManifestSource};
use crate::supervisor::active::{ActiveEntry, ActiveSet, Reaped};
use crate::supervisor::tick::{ReconcileReport, TickState};
use crate::worker::{CommandBuilder, DEFAULT_OUTPUT_TAIL_BYTES, WorkerLifecycle, liveness, resolve_run_mode};

/// Default time between manifest polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for the Reconciler
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Time between manifest polls
    pub poll_interval: Duration,
    /// Directory the artifacts are synced into
    pub workdir: PathBuf,
    /// Trailing bytes of worker output kept for logging
    pub output_tail_bytes: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            workdir: PathBuf::from("tmp"),
            output_tail_bytes: DEFAULT_OUTPUT_TAIL_BYTES,
        }
    }
}

impl ReconcilerConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    pub fn with_output_tail(mut self, bytes: usize) -> Self {
        self.output_tail_bytes = bytes;
        self
    }
}

pub struct Reconciler {
    config: ReconcilerConfig,
    manifest: Arc<dyn ManifestSource>,
    sync: Arc<dyn ArtifactSync>,
    commands: Arc<dyn CommandBuilder>,
    active: ActiveSet,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
    event_rx: mpsc::UnboundedReceiver<WorkerEvent>,
    state: TickState,
}

impl Reconciler {
    pub fn new(
        config: ReconcilerConfig,
        manifest: Arc<dyn ManifestSource>,
        sync: Arc<dyn ArtifactSync>,
        commands: Arc<dyn CommandBuilder>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            config,
            manifest,
            sync,
            commands,
            active: ActiveSet::new(),
            event_tx,
            event_rx,
            state: TickState::new(),
        }
    }

    pub fn stats(&self) -> &TickState {
        &self.state
    }

    /// Identities with a live lifecycle, sorted
    pub fn active_apps(&self) -> Vec<AppId> {
        self.active.apps()
    }

    pub fn is_active(&self, app: &str) -> bool {
        self.active.contains(app)
    }

    /// Stopped but not yet exited
    pub fn is_draining(&self, app: &str) -> bool {
        self.active.is_draining(app)
    }

    /// Run mode an active application was launched with
    pub fn run_mode(&self, app: &str) -> Option<RunMode> {
        self.active.get(app).map(|entry| entry.mode())
    }

    /// Poll until `shutdown` resolves, then stop every lifecycle
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        log::info!(
            "Reconciler started, polling every {}s",
            self.config.poll_interval.as_secs_f64()
        );

        loop {
            if let Err(e) = self.tick().await {
                tracing::error!(error = %e, "Reconcile pass failed; retrying next poll");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = &mut shutdown => break,
            }
        }

        self.shutdown().await;
    }

    /// One full pass: drain events, reap, fetch, reconcile
    ///
    /// Only a manifest failure is returned as an error; everything else is
    /// local to one application and logged.
    pub async fn tick(&mut self) -> Result<ReconcileReport> {
        self.state.tick();
        self.process_events();
        self.reap_completed().await;

        let manifest = match self.manifest.fetch().await {
            Ok(manifest) => manifest,
            Err(e) => {
                self.state.manifest_failed();
                return Err(e);
            }
        };
        tracing::debug!(
            files = manifest.files.len(),
            applications = manifest.applications.len(),
            "Fetched manifest"
        );

        let report = self.reconcile(&manifest).await;
        tracing::debug!(
            tick = self.state.tick_count,
            active = self.active.len(),
            draining = self.active.draining_len(),
            started = report.started.len(),
            stopped = report.stopped.len(),
            "Reconcile pass complete"
        );
        Ok(report)
    }

    /// Diff the manifest against the active set and act on the difference
    pub async fn reconcile(&mut self, manifest: &Manifest) -> ReconcileReport {
        let desired: HashSet<&str> = manifest.applications.iter().map(String::as_str).collect();
        let mut report = ReconcileReport::default();

        for app in self.active.apps() {
            if !desired.contains(app.as_str()) {
                let uptime_secs = self
                    .active
                    .get(&app)
                    .map(|entry| entry.started_at().elapsed().as_secs())
                    .unwrap_or_default();
                tracing::info!(app = %app, uptime_secs, "Stopping application");
                self.active.stop(&app);
                report.stopped.push(app);
            }
        }

        let mut seen = HashSet::new();
        for app in &manifest.applications {
            if !seen.insert(app.as_str()) || self.active.contains(app) {
                continue;
            }
            if self.active.is_draining(app) {
                tracing::info!(app = %app, "Previous lifecycle still stopping; deferring start");
                report.deferred.push(app.clone());
                continue;
            }

            match self.start_application(app, manifest).await {
                Ok(()) => report.started.push(app.clone()),
                Err(e) => {
                    tracing::warn!(app = %app, error = %e, "Skipping application this cycle");
                    report.skipped.push(app.clone());
                }
            }
        }

        self.state.record(&report);
        report
    }

    async fn start_application(&mut self, app: &str, manifest: &Manifest) -> Result<()> {
        tracing::info!(app = %app, "Starting application");
        self.sync.sync(app, manifest).await?;
        let mode = resolve_run_mode(&self.config.workdir.join(app)).await?;

        let (flag, watch) = liveness();
        let lifecycle = WorkerLifecycle::new(app, mode, self.commands.clone(), watch, self.event_tx.clone())
            .with_output_tail(self.config.output_tail_bytes);
        let handle = tokio::spawn(lifecycle.run());

        self.active.insert(app.to_string(), ActiveEntry::new(flag, handle, mode));
        Ok(())
    }

    /// Drain pending worker events into the tick statistics
    pub fn process_events(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            tracing::trace!(event = ?event, "Worker event");
            match &event {
                WorkerEvent::Launched { app, .. } => self.state.launched(app),
                WorkerEvent::LaunchFailed { .. } => self.state.launch_failed(),
                WorkerEvent::Exited { .. } | WorkerEvent::Stopped { .. } => {}
            }
        }
    }

    /// Remove lifecycles that have exited from bookkeeping
    async fn reap_completed(&mut self) {
        let reaped = self.active.reap().await;
        let failed = reaped.iter().filter(|r| r.was_active).count();
        for r in &reaped {
            log_reaped(r);
            if !r.was_active {
                self.state.forget(&r.app);
            }
        }
        self.state.failed(failed);
    }

    /// Clear every liveness flag and wait for all lifecycles to exit
    pub async fn shutdown(&mut self) {
        log::info!("Shutting down {} application(s)", self.active.len());
        for r in self.active.shutdown().await {
            log_reaped(&r);
        }
        self.process_events();
    }
}

fn log_reaped(reaped: &Reaped) {
    match &reaped.outcome {
        Err(e) => tracing::error!(app = %reaped.app, error = ?e, "Lifecycle task panicked"),
        Ok(outcome) if reaped.was_active => tracing::warn!(
            app = %reaped.app,
            outcome = ?outcome,
            "Application exited while still desired; will retry on next poll"
        ),
        Ok(_) => tracing::debug!(app = %reaped.app, "Lifecycle released"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RapidError;
    use crate::source::{NoopSync, StaticManifest};
    use crate::worker::LaunchCommand;
    use tempfile::TempDir;

    struct Harness {
        dir: TempDir,
        manifest: Arc<StaticManifest>,
        sync: Arc<NoopSync>,
        reconciler: Reconciler,
    }

    impl Harness {
        fn new(interpreter: &'static str) -> Self {
            let dir = TempDir::new().unwrap();
            let workdir = dir.path().to_path_buf();
            let manifest = Arc::new(StaticManifest::default());
            let sync = Arc::new(NoopSync::new());
            let commands = {
                let workdir = workdir.clone();
                Arc::new(move |app: &str| {
                    LaunchCommand::new(interpreter).arg(workdir.join(app).to_string_lossy().into_owned())
                })
            };
            let config = ReconcilerConfig::default().with_workdir(workdir);
            let reconciler = Reconciler::new(config, manifest.clone(), sync.clone(), commands);
            Self {
                dir,
                manifest,
                sync,
                reconciler,
            }
        }

        fn script(&self, app: &str, body: &str) {
            std::fs::write(self.dir.path().join(app), body).unwrap();
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    #[test]
    fn test_config_default() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.workdir, PathBuf::from("tmp"));
    }

    #[test]
    fn test_config_builder() {
        let config = ReconcilerConfig::default()
            .with_poll_interval(Duration::from_secs(2))
            .with_output_tail(128);
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.output_tail_bytes, 128);
    }

    #[tokio::test]
    async fn test_tick_starts_desired_apps() {
        let mut h = Harness::new("sh");
        h.script("a.sh", "# 0\nexec sleep 30\n");
        h.script("b.sh", "# 60\ntrue\n");
        h.manifest.set_applications(["a.sh", "b.sh"]);

        let report = h.reconciler.tick().await.unwrap();
        assert_eq!(report.started, vec!["a.sh", "b.sh"]);
        assert_eq!(h.sync.synced(), vec!["a.sh", "b.sh"]);
        assert_eq!(h.reconciler.active_apps(), vec!["a.sh", "b.sh"]);
        assert_eq!(h.reconciler.run_mode("a.sh"), Some(RunMode::Continuous));
        assert_eq!(h.reconciler.run_mode("b.sh").and_then(|m| m.interval()), Some(Duration::from_secs(60)));

        h.reconciler.shutdown().await;
    }

    #[tokio::test]
    async fn test_unchanged_apps_are_not_restarted() {
        let mut h = Harness::new("sh");
        h.script("a.sh", "# 0\nexec sleep 30\n");
        h.manifest.set_applications(["a.sh"]);

        h.reconciler.tick().await.unwrap();
        settle().await;
        let report = h.reconciler.tick().await.unwrap();
        assert!(report.is_noop());
        settle().await;
        h.reconciler.tick().await.unwrap();

        assert_eq!(h.sync.synced(), vec!["a.sh"]);
        assert_eq!(h.reconciler.stats().launches_for("a.sh"), 1);
        assert_eq!(h.reconciler.stats().total_started, 1);

        h.reconciler.shutdown().await;
    }

    #[tokio::test]
    async fn test_removed_app_is_stopped_and_others_untouched() {
        let mut h = Harness::new("sh");
        h.script("a.sh", "# 0\nexec sleep 30\n");
        h.script("b.sh", "# 0\nexec sleep 30\n");
        h.manifest.set_applications(["a.sh", "b.sh"]);
        h.reconciler.tick().await.unwrap();
        settle().await;

        h.manifest.set_applications(["b.sh"]);
        let report = h.reconciler.tick().await.unwrap();
        assert_eq!(report.stopped, vec!["a.sh"]);
        assert!(report.started.is_empty());
        assert!(!h.reconciler.is_active("a.sh"));
        assert!(h.reconciler.is_active("b.sh"));

        // The stopped lifecycle exits on its own; the next poll only releases it.
        settle().await;
        assert!(h.reconciler.is_draining("a.sh"));
        let report = h.reconciler.tick().await.unwrap();
        assert!(report.is_noop());
        assert!(!h.reconciler.is_draining("a.sh"));
        assert_eq!(h.reconciler.stats().launches_for("b.sh"), 1);
        assert_eq!(h.reconciler.stats().launches_for("a.sh"), 0);
        assert_eq!(h.reconciler.stats().launches.len(), 1);
        assert_eq!(h.reconciler.stats().total_launches, 2);

        h.reconciler.shutdown().await;
    }

    #[tokio::test]
    async fn test_bad_directive_is_skipped_and_retried() {
        let mut h = Harness::new("sh");
        h.script("a.sh", "echo no directive\n");
        h.manifest.set_applications(["a.sh"]);

        let report = h.reconciler.tick().await.unwrap();
        assert_eq!(report.skipped, vec!["a.sh"]);
        assert!(!h.reconciler.is_active("a.sh"));

        h.script("a.sh", "# 0\nexec sleep 30\n");
        let report = h.reconciler.tick().await.unwrap();
        assert_eq!(report.started, vec!["a.sh"]);
        assert_eq!(h.sync.synced(), vec!["a.sh", "a.sh"]);

        h.reconciler.shutdown().await;
    }

    #[tokio::test]
    async fn test_manifest_failure_keeps_workers_running() {
        let mut h = Harness::new("sh");
        h.script("a.sh", "# 0\nexec sleep 30\n");
        h.manifest.set_applications(["a.sh"]);
        h.reconciler.tick().await.unwrap();

        h.manifest.set_failure(Some("connection reset"));
        let err = h.reconciler.tick().await.unwrap_err();
        assert!(matches!(err, RapidError::Manifest(_)));
        assert!(h.reconciler.is_active("a.sh"));
        assert_eq!(h.reconciler.stats().manifest_failures, 1);

        h.manifest.set_failure(None);
        let report = h.reconciler.tick().await.unwrap();
        assert!(report.is_noop());

        h.reconciler.shutdown().await;
    }

    #[tokio::test]
    async fn test_continuous_launch_failure_retried_next_poll() {
        let mut h = Harness::new("/nonexistent/python-xyz");
        h.script("a.py", "# 0\n");
        h.manifest.set_applications(["a.py"]);

        h.reconciler.tick().await.unwrap();
        assert!(h.reconciler.is_active("a.py"));
        settle().await;

        let report = h.reconciler.tick().await.unwrap();
        assert_eq!(report.started, vec!["a.py"]);
        assert_eq!(h.reconciler.stats().total_failed, 1);
        assert!(h.reconciler.stats().launch_failures >= 1);

        h.reconciler.shutdown().await;
    }

    #[tokio::test]
    async fn test_draining_app_is_not_relaunched() {
        let mut h = Harness::new("sh");
        // In-flight recurrent runs are allowed to finish, which keeps the
        // lifecycle draining for a while after it is removed.
        h.script("slow.sh", "# 60\nsleep 1\n");
        h.manifest.set_applications(["slow.sh"]);
        h.reconciler.tick().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        h.manifest.set_applications(Vec::<String>::new());
        h.reconciler.tick().await.unwrap();
        assert!(h.reconciler.is_draining("slow.sh"));

        h.manifest.set_applications(["slow.sh"]);
        let report = h.reconciler.tick().await.unwrap();
        assert_eq!(report.deferred, vec!["slow.sh"]);
        assert!(!h.reconciler.is_active("slow.sh"));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let report = h.reconciler.tick().await.unwrap();
        assert_eq!(report.started, vec!["slow.sh"]);
        assert!(!h.reconciler.is_draining("slow.sh"));

        h.reconciler.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_identities_launch_once() {
        let mut h = Harness::new("sh");
        h.script("a.sh", "# 0\nexec sleep 30\n");
        h.manifest.set_applications(["a.sh", "a.sh"]);

        let report = h.reconciler.tick().await.unwrap();
        assert_eq!(report.started, vec!["a.sh"]);

        h.reconciler.shutdown().await;
    }

    #[tokio::test]
    async fn test_run_until_shuts_down() {
        let mut h = Harness::new("sh");
        h.script("a.sh", "# 0\nexec sleep 30\n");
        h.manifest.set_applications(["a.sh"]);

        let shutdown = tokio::time::sleep(Duration::from_millis(300));
        tokio::time::timeout(Duration::from_secs(5), h.reconciler.run_until(shutdown))
            .await
            .unwrap();

        assert!(h.reconciler.active_apps().is_empty());
        assert!(!h.reconciler.is_draining("a.sh"));
        assert_eq!(h.reconciler.stats().launches_for("a.sh"), 1);
    }
}
