//! Worker module - everything needed to run one supervised script.
//!
//! - directive: reads the run-mode directive from a worker artifact
//! - process: spawns a worker with captured output and kills it
//! - command: builds the launch command for an application
//! - liveness: per-application stop flag shared with the reconciler
//! - lifecycle: drives one worker through its run-mode state machine

pub mod command;
pub mod directive;
pub mod lifecycle;
pub mod liveness;
pub mod process;

pub use command::{CommandBuilder, DeploymentMode, LaunchCommand, ScriptCommand};
pub use directive::{DIRECTIVE_PREFIX, parse_directive, resolve_run_mode};
pub use lifecycle::WorkerLifecycle;
pub use liveness::{LivenessFlag, LivenessWatch, liveness};
pub use process::{DEFAULT_OUTPUT_TAIL_BYTES, ProcessExit, WorkerProcess};
