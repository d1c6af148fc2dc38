//! Lifecycle state and outcome types.

/// State of a single worker lifecycle
///
/// Continuous workers move `Starting -> Running -> Stopping -> Stopped`;
/// recurrent workers cycle `Launching -> Waiting` until `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Running,
    Launching,
    Waiting,
    Stopping,
    Stopped,
}

/// How a lifecycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleOutcome {
    /// Stop signal observed; the worker was shut down
    Stopped,
    /// Continuous worker could not be launched at all
    LaunchFailed(String),
}
