//! Worker lifecycle - drives one application until its liveness flag clears.
//!
//! Continuous workers are launched once and killed on stop. They are never
//! relaunched within the same lifecycle, even if they exit early.
//!
//! Recurrent workers run to completion, then wait their interval before the
//! next launch. A failed launch is logged and the schedule continues. A stop
//! that arrives while a run is in flight lets that run finish.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::domain::{AppId, LifecycleOutcome, LifecycleState, RunMode, WorkerEvent};
use crate::worker::command::CommandBuilder;
use crate::worker::liveness::LivenessWatch;
use crate::worker::process::{DEFAULT_OUTPUT_TAIL_BYTES, WorkerProcess};

pub struct WorkerLifecycle {
    app: AppId,
    mode: RunMode,
    commands: Arc<dyn CommandBuilder>,
    liveness: LivenessWatch,
    events: mpsc::UnboundedSender<WorkerEvent>,
    output_tail_bytes: usize,
    state: LifecycleState,
}

impl WorkerLifecycle {
    pub fn new(
        app: impl Into<AppId>,
        mode: RunMode,
        commands: Arc<dyn CommandBuilder>,
        liveness: LivenessWatch,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Self {
        Self {
            app: app.into(),
            mode,
            commands,
            liveness,
            events,
            output_tail_bytes: DEFAULT_OUTPUT_TAIL_BYTES,
            state: LifecycleState::Starting,
        }
    }

    /// Limit how much worker output is kept for log messages
    pub fn with_output_tail(mut self, bytes: usize) -> Self {
        self.output_tail_bytes = bytes;
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Run until stopped
    pub async fn run(mut self) -> LifecycleOutcome {
        match self.mode {
            RunMode::Continuous => self.run_continuous().await,
            RunMode::Recurrent { interval } => self.run_recurrent(interval).await,
        }
    }

    async fn run_continuous(&mut self) -> LifecycleOutcome {
        self.transition(LifecycleState::Starting);
        let command = self.commands.build(&self.app);
        tracing::info!(app = %self.app, command = %command, "Running continuous application");

        let mut process = match WorkerProcess::start(&command, self.output_tail_bytes) {
            Ok(process) => process,
            Err(e) => {
                tracing::error!(app = %self.app, error = %e, "Error starting the application");
                self.emit(WorkerEvent::LaunchFailed {
                    app: self.app.clone(),
                    error: e.to_string(),
                });
                self.finish();
                return LifecycleOutcome::LaunchFailed(e.to_string());
            }
        };
        self.emit(WorkerEvent::Launched {
            app: self.app.clone(),
            pid: process.pid(),
        });

        self.transition(LifecycleState::Running);
        let early_exit = tokio::select! {
            _ = self.liveness.stopped() => None,
            status = process.wait_status() => Some(status),
        };

        if let Some(status) = early_exit {
            match status {
                Ok(status) => {
                    let stderr = process.stderr();
                    tracing::warn!(
                        app = %self.app,
                        exit_code = ?status.code(),
                        stderr = %stderr.trim(),
                        "Continuous application exited; it will not be relaunched until it is redeployed"
                    );
                    self.emit(WorkerEvent::Exited {
                        app: self.app.clone(),
                        exit_code: status.code(),
                        success: status.success(),
                    });
                }
                Err(e) => {
                    tracing::error!(app = %self.app, error = %e, "Error waiting on the application");
                }
            }
            self.liveness.stopped().await;
        }

        self.transition(LifecycleState::Stopping);
        if process.has_exited() {
            tracing::debug!(app = %self.app, "Process already exited, nothing to kill");
        } else if let Err(e) = process.kill().await {
            tracing::warn!(app = %self.app, error = %e, "Error stopping the application");
        }

        self.finish();
        LifecycleOutcome::Stopped
    }

    async fn run_recurrent(&mut self, interval: Duration) -> LifecycleOutcome {
        self.transition(LifecycleState::Starting);
        tracing::info!(
            app = %self.app,
            interval_secs = interval.as_secs(),
            "Running recurrent application"
        );

        while self.liveness.is_alive() {
            self.transition(LifecycleState::Launching);
            self.launch_once().await;

            self.transition(LifecycleState::Waiting);
            let stopped = tokio::select! {
                _ = tokio::time::sleep(interval) => false,
                _ = self.liveness.stopped() => true,
            };
            if stopped {
                break;
            }
        }

        self.finish();
        LifecycleOutcome::Stopped
    }

    /// One blocking recurrent run; failures never end the lifecycle
    async fn launch_once(&mut self) {
        let command = self.commands.build(&self.app);
        let process = match WorkerProcess::start(&command, self.output_tail_bytes) {
            Ok(process) => process,
            Err(e) => {
                tracing::error!(app = %self.app, error = %e, "Error starting the application");
                self.emit(WorkerEvent::LaunchFailed {
                    app: self.app.clone(),
                    error: e.to_string(),
                });
                return;
            }
        };
        self.emit(WorkerEvent::Launched {
            app: self.app.clone(),
            pid: process.pid(),
        });

        match process.wait().await {
            Ok(exit) => {
                if exit.success() {
                    tracing::debug!(app = %self.app, "Run completed");
                } else {
                    tracing::warn!(
                        app = %self.app,
                        exit_code = ?exit.code(),
                        stderr = %exit.stderr.trim(),
                        "Run failed"
                    );
                }
                self.emit(WorkerEvent::Exited {
                    app: self.app.clone(),
                    exit_code: exit.code(),
                    success: exit.success(),
                });
            }
            Err(e) => {
                tracing::error!(app = %self.app, error = %e, "Error waiting on the application");
            }
        }
    }

    fn transition(&mut self, next: LifecycleState) {
        if self.state != next {
            tracing::trace!(app = %self.app, from = ?self.state, to = ?next, "Lifecycle transition");
            self.state = next;
        }
    }

    fn finish(&mut self) {
        self.transition(LifecycleState::Stopped);
        tracing::info!(app = %self.app, "Application stopped");
        self.emit(WorkerEvent::Stopped {
            app: self.app.clone(),
        });
    }

    fn emit(&self, event: WorkerEvent) {
        // The reconciler may already be gone during shutdown.
        let _ = self.events.send(event);
    }
}
