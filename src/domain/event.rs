//! Events reported by worker lifecycles.

use crate::domain::AppId;

/// Event sent from a running lifecycle back to the reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// A worker process was spawned
    Launched { app: AppId, pid: Option<u32> },
    /// A worker process exited on its own
    Exited {
        app: AppId,
        exit_code: Option<i32>,
        success: bool,
    },
    /// A worker process could not be spawned
    LaunchFailed { app: AppId, error: String },
    /// The lifecycle reached its terminal state
    Stopped { app: AppId },
}

impl WorkerEvent {
    /// Application this event belongs to
    pub fn app(&self) -> &str {
        match self {
            WorkerEvent::Launched { app, .. }
            | WorkerEvent::Exited { app, .. }
            | WorkerEvent::LaunchFailed { app, .. }
            | WorkerEvent::Stopped { app } => app,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_app() {
        let event = WorkerEvent::Launched {
            app: "bots/poller.py".to_string(),
            pid: Some(42),
        };
        assert_eq!(event.app(), "bots/poller.py");

        let event = WorkerEvent::Stopped {
            app: "report.py".to_string(),
        };
        assert_eq!(event.app(), "report.py");
    }
}
