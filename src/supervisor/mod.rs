//! Supervisor - the reconciliation loop and its active set.

pub mod active;
pub mod reconciler;
pub mod tick;

pub use active::{ActiveEntry, ActiveSet, Reaped};
pub use reconciler::{DEFAULT_POLL_INTERVAL, Reconciler, ReconcilerConfig};
pub use tick::{ReconcileReport, TickState};
