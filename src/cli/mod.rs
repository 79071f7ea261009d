//! Command-line front end (§6.1): `backup`/`restore`/`verify` subcommands
//! built with `clap`'s derive API, plus a terminal `UserFeedback` and a
//! periodic-print `ProgressSink`.
//!
//! Grounded on the teacher's `cli/args.rs` (argument surface) and
//! `cli/init.rs` (turning parsed args into the structures the core
//! consumes), generalized from a single-file compress/decompress job to the
//! three operations this crate exposes.

pub mod args;
pub mod feedback;
pub mod progress;

pub use args::{Cli, Command};
pub use feedback::TerminalFeedback;
pub use progress::PrintProgressSink;
