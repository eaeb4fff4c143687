//! Command-line interface for the `cu` binary.

mod commands;
mod helpers;

pub use commands::{is_verbose, run, Cli};
