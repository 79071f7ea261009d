//! Collaborator interfaces consumed by the core (§6).
//!
//! These are the seams a host application fills in: acquiring a consistent
//! snapshot of a live disk, prompting an operator for a substitute path, and
//! receiving progress/error notifications. The core ships no production
//! implementation of `SnapshotProvider` — taking a snapshot is inherently
//! platform-specific (§1) — but does ship terminal-based `UserFeedback` and
//! `ProgressSink` implementations for the CLI (§6.1).

use std::path::PathBuf;

use crate::error::PipelineError;

/// Acquires a point-in-time-consistent view of one or more mount points as
/// read-only device paths.
pub trait SnapshotProvider: Send {
    fn acquire(&mut self, mount_points: &[PathBuf]) -> crate::error::Result<Vec<PathBuf>>;
    fn release(&mut self, ok: bool);
}

/// A `SnapshotProvider` that performs no snapshotting: it returns the
/// caller's paths unchanged. Appropriate for already-quiesced or unmounted
/// devices (§6.1).
pub struct NoopSnapshotProvider;

impl SnapshotProvider for NoopSnapshotProvider {
    fn acquire(&mut self, mount_points: &[PathBuf]) -> crate::error::Result<Vec<PathBuf>> {
        Ok(mount_points.to_vec())
    }

    fn release(&mut self, _ok: bool) {}
}

/// Prompts an operator for a decision when the split manager cannot find an
/// expected part.
pub trait UserFeedback: Send {
    fn ask_missing_part(&mut self, path: &std::path::Path, index: u32) -> Option<PathBuf>;
}

/// A `UserFeedback` that never offers a substitute, for non-interactive
/// callers (tests, daemons).
pub struct NoFeedback;

impl UserFeedback for NoFeedback {
    fn ask_missing_part(&mut self, _path: &std::path::Path, _index: u32) -> Option<PathBuf> {
        None
    }
}

/// Periodic progress and fatal-error notifications from a running pipeline.
pub trait ProgressSink: Send {
    fn on_bytes_processed(&mut self, bytes: u64);
    fn on_error(&mut self, kind: &'static str, message: &str);
}

/// A `ProgressSink` that discards every notification.
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn on_bytes_processed(&mut self, _bytes: u64) {}
    fn on_error(&mut self, _kind: &'static str, _message: &str) {}
}

impl ProgressSink for () {
    fn on_bytes_processed(&mut self, _bytes: u64) {}
    fn on_error(&mut self, _kind: &'static str, _message: &str) {}
}

pub(crate) fn log_error(error: &PipelineError) {
    log::error!("{} ({})", error, error.kind());
}
