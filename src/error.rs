//! Error hierarchy for the imaging pipeline.
//!
//! `PipelineError` carries every error kind named in the imaging
//! specification (§7) as a distinct variant. Low-level codec and stream
//! errors are wrapped rather than flattened, so a caller that wants the
//! original `std::io::Error` or codec error code can still get at it via
//! `std::error::Error::source`.

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::config::CompressionFormat;

/// Every failure mode the pipeline can surface. Variant names are a
/// contract: collaborators match on them, not on the message text.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to open device {path:?}: {source}")]
    DeviceOpenError { path: PathBuf, source: io::Error },

    #[error("I/O error on device at offset {offset}, len {len}: {source}")]
    DeviceIoError {
        offset: u64,
        len: usize,
        source: io::Error,
    },

    #[error("unaligned access: offset {offset} or len {len} is not a multiple of {required}")]
    AlignmentError {
        offset: u64,
        len: usize,
        required: usize,
    },

    #[error("failed to open container part {path:?}: {source}")]
    FileOpenError { path: PathBuf, source: io::Error },

    #[error("I/O error on container file: {0}")]
    FileIoError(#[source] io::Error),

    #[error("container part {index} is missing")]
    PartMissing { index: u32 },

    #[error("container magic mismatch")]
    HeaderMagicMismatch,

    #[error("container format version {found} is not supported (expected {expected})")]
    HeaderVersionUnsupported { found: u32, expected: u32 },

    #[error("container header is corrupt: {field}")]
    HeaderCorrupt { field: &'static str },

    #[error("allocation map is corrupt: decoded {decoded} clusters, expected {expected}")]
    AllocationMapCorrupt { decoded: u64, expected: u64 },

    #[error("{format} compression failed: {detail}")]
    CompressionError {
        format: CompressionFormat,
        detail: String,
    },

    #[error("{format} decompression failed: {detail}")]
    DecompressionError {
        format: CompressionFormat,
        detail: String,
    },

    #[error("split size is too small to hold even the container header")]
    ChunkSizeTooSmall,

    #[error("chunk pool exhausted")]
    ChunkPoolExhausted,

    #[error("operation was cancelled")]
    Cancelled,

    #[error(
        "verification failed: container CRC-32 is {expected:#010x}, computed {actual:#010x}"
    )]
    VerifyMismatch { expected: u32, actual: u32 },

    #[error("restore target is smaller than the image volume size ({target} < {volume})")]
    UnsupportedShrink { target: u64, volume: u64 },
}

impl PipelineError {
    /// Short, stable tag for the error kind, usable by collaborators (e.g.
    /// `ProgressSink::on_error`) that want to branch on kind without a full
    /// `match`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DeviceOpenError { .. } => "DeviceOpenError",
            Self::DeviceIoError { .. } => "DeviceIoError",
            Self::AlignmentError { .. } => "AlignmentError",
            Self::FileOpenError { .. } => "FileOpenError",
            Self::FileIoError(_) => "FileIoError",
            Self::PartMissing { .. } => "PartMissing",
            Self::HeaderMagicMismatch => "HeaderMagicMismatch",
            Self::HeaderVersionUnsupported { .. } => "HeaderVersionUnsupported",
            Self::HeaderCorrupt { .. } => "HeaderCorrupt",
            Self::AllocationMapCorrupt { .. } => "AllocationMapCorrupt",
            Self::CompressionError { .. } => "CompressionError",
            Self::DecompressionError { .. } => "DecompressionError",
            Self::ChunkSizeTooSmall => "ChunkSizeTooSmall",
            Self::ChunkPoolExhausted => "ChunkPoolExhausted",
            Self::Cancelled => "Cancelled",
            Self::VerifyMismatch { .. } => "VerifyMismatch",
            Self::UnsupportedShrink { .. } => "UnsupportedShrink",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<io::Error> for PipelineError {
    fn from(e: io::Error) -> Self {
        PipelineError::FileIoError(e)
    }
}

/// Display wrapper used when formatting `(kind, message)` pairs recorded by
/// a stage before the coordinator has wrapped them into a `PipelineError`.
pub(crate) struct StageError {
    pub kind: &'static str,
    pub message: String,
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
