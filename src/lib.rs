//! rapidpy - a host-local supervisor for manifest-declared worker scripts
//!
//! The reconciler polls a manifest of applications, syncs each new
//! application's files locally, reads its run-mode directive, and keeps it
//! running as either a continuous or a recurrent worker until it disappears
//! from the manifest.

pub mod config;
pub mod domain;
pub mod error;
pub mod source;
pub mod supervisor;
pub mod worker;

pub use error::{RapidError, Result};
