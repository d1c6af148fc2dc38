//! CLI module for rapidpy - command-line interface.

pub mod commands;

pub use commands::Cli;
