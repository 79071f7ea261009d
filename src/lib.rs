//! Raw block-device imaging: backup, restore, and verify devices against a
//! compressed, optionally split container format (§1).
//!
//! The crate is organized as a reader/codec/writer pipeline (§2) driven by
//! [`pipeline::PipelineCoordinator`], wrapped by a `clap`-based CLI in
//! [`cli`]. Every module below corresponds to one component of the data-flow
//! diagram in the design document; see each module's doc comment for its
//! grounding.

pub mod allocmap;
pub mod chunk;
pub mod cli;
pub mod codec;
pub mod codec_stage;
pub mod collab;
pub mod config;
pub mod container;
pub mod crc32;
pub mod device;
pub mod error;
pub mod header;
pub mod io;
pub mod multipart;
pub mod pipeline;
pub mod reader;
pub mod varint;
pub mod writer;

pub use collab::{NoFeedback, NoopSnapshotProvider, NullProgressSink, ProgressSink, SnapshotProvider, UserFeedback};
pub use config::{CompressionFormat, PipelineConfig, VolumeKind};
pub use error::{PipelineError, Result};
pub use pipeline::{
    BackupOutcome, BackupRequest, PipelineCoordinator, RestoreOutcome, RestoreRequest, VerifyRequest,
};
