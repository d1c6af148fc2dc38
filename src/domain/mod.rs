//! Domain types for rapidpy
//!
//! This module contains the core supervision types:
//! - RunMode: how an application is executed (continuous or recurrent)
//! - LifecycleState / LifecycleOutcome: where a worker lifecycle is and how it ended
//! - WorkerEvent: reports sent from lifecycles back to the reconciler

pub mod event;
pub mod outcome;
pub mod run_mode;

pub use event::WorkerEvent;
pub use outcome::{LifecycleOutcome, LifecycleState};
pub use run_mode::RunMode;

/// Application identity: the artifact path relative to the manifest root
pub type AppId = String;
