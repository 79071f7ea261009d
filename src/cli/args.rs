//! Argument surface for the `odin-image` binary.
//!
//! Grounded on the teacher's `cli::args::ParsedArgs`: a flat, documented
//! struct per mode populated by `clap`'s derive macros rather than the
//! teacher's hand-rolled getopt-style loop (the teacher ports a C `argv`
//! walker; this crate has no legacy short-flag aggregation to preserve, so
//! `clap` derive is the idiomatic fit, §6.1).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::{CompressionFormat, PipelineConfig, VolumeKind};

/// Command-line compression selector; maps onto [`CompressionFormat`].
///
/// A separate enum because `clap::ValueEnum` wants to own its `Display`/
/// parsing glue and [`CompressionFormat`]'s numeric discriminants (used for
/// the on-disk header field) are a different concern from its spelling on
/// the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliCompression {
    None,
    Gzip,
    Bzip2,
    Lz4,
    Lz4hc,
    Zstd,
}

impl From<CliCompression> for CompressionFormat {
    fn from(c: CliCompression) -> Self {
        match c {
            CliCompression::None => CompressionFormat::None,
            CliCompression::Gzip => CompressionFormat::Gzip,
            CliCompression::Bzip2 => CompressionFormat::Bzip2,
            CliCompression::Lz4 => CompressionFormat::Lz4,
            CliCompression::Lz4hc => CompressionFormat::Lz4Hc,
            CliCompression::Zstd => CompressionFormat::Zstd,
        }
    }
}

/// Command-line volume-kind selector; maps onto [`VolumeKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliVolumeKind {
    Partition,
    WholeDisk,
}

impl From<CliVolumeKind> for VolumeKind {
    fn from(k: CliVolumeKind) -> Self {
        match k {
            CliVolumeKind::Partition => VolumeKind::Partition,
            CliVolumeKind::WholeDisk => VolumeKind::WholeDisk,
        }
    }
}

/// Block-device imaging: backup, restore, and verify raw devices to and
/// from a compressed, optionally split container format.
#[derive(Debug, Parser)]
#[command(name = "odin-image", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read a device (or a regular file standing in for one) into a
    /// container.
    Backup(BackupArgs),
    /// Write a container back onto a device or regular file.
    Restore(RestoreArgs),
    /// Recompute a container's CRC-32 and compare it against the stored
    /// header value, without writing anywhere.
    Verify(VerifyArgs),
}

#[derive(Debug, Parser)]
pub struct BackupArgs {
    /// Source block device (or regular file) to read.
    pub device_path: PathBuf,
    /// Destination container path; with `--split-size` set, sibling parts
    /// are named `<base>0001.<ext>`, `<base>0002.<ext>`, ...
    pub container_path: PathBuf,
    /// Whether the source is a whole disk or a single partition (recorded
    /// in the header, §6).
    #[arg(long, value_enum, default_value = "partition")]
    pub volume_kind: CliVolumeKind,
    /// Cluster size in bytes used to interpret the allocation map.
    #[arg(long, default_value_t = 4096)]
    pub cluster_size: u32,
    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Debug, Parser)]
pub struct RestoreArgs {
    /// Source container path (the first part, if split).
    pub container_path: PathBuf,
    /// Destination device or regular file.
    pub target_path: PathBuf,
    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Debug, Parser)]
pub struct VerifyArgs {
    /// Container path (the first part, if split).
    pub container_path: PathBuf,
    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Options shared by every subcommand that run a pipeline session.
#[derive(Debug, Parser)]
pub struct ConfigArgs {
    /// Compression format. Ignored by `restore`/`verify`, which read the
    /// format recorded in the container's header.
    #[arg(long, value_enum, default_value = "none")]
    pub compression: CliCompression,
    /// Compression level; clamped into the valid range for the chosen
    /// format (zstd 1-22, gzip 1-9), ignored otherwise.
    #[arg(long, default_value_t = crate::config::DEFAULT_COMPRESSION_LEVEL)]
    pub compression_level: i32,
    /// Save every cluster rather than only those marked used in an
    /// allocation map. Always true for `restore`/`verify`, which have no
    /// separate allocation map to honor (the container already contains
    /// only used-cluster bytes).
    #[arg(long, default_value_t = false)]
    pub save_all_blocks: bool,
    /// Split the container into parts of this many bytes; 0 disables
    /// splitting.
    #[arg(long, default_value_t = 0)]
    pub split_size: u64,
    /// Chunk size for the internal reader/codec/writer pipeline.
    #[arg(long, default_value_t = crate::config::DEFAULT_CHUNK_SIZE)]
    pub read_block_size: usize,
    /// Number of chunks kept in flight across the pipeline's bounded
    /// queues.
    #[arg(long, default_value_t = crate::config::DEFAULT_POOL_SIZE)]
    pub pool_size: usize,
    /// Free-text comment stored (UTF-16LE) in the container header.
    #[arg(long, default_value_t = String::new())]
    pub comment: String,
}

impl ConfigArgs {
    pub fn into_pipeline_config(self) -> PipelineConfig {
        PipelineConfig {
            compression: self.compression.into(),
            compression_level: self.compression_level,
            save_all_blocks: self.save_all_blocks,
            split_size: self.split_size,
            read_block_size: self.read_block_size,
            pool_size: self.pool_size,
            comment: self.comment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_parses_positional_paths() {
        let cli = Cli::parse_from([
            "odin-image",
            "backup",
            "/dev/sda1",
            "image.odin",
            "--compression",
            "zstd",
        ]);
        match cli.command {
            Command::Backup(args) => {
                assert_eq!(args.device_path, PathBuf::from("/dev/sda1"));
                assert_eq!(args.container_path, PathBuf::from("image.odin"));
                assert_eq!(args.config.compression, CliCompression::Zstd);
            }
            _ => panic!("expected Backup"),
        }
    }

    #[test]
    fn restore_parses_positional_paths() {
        let cli = Cli::parse_from(["odin-image", "restore", "image.odin", "/dev/sda1"]);
        match cli.command {
            Command::Restore(args) => {
                assert_eq!(args.container_path, PathBuf::from("image.odin"));
                assert_eq!(args.target_path, PathBuf::from("/dev/sda1"));
            }
            _ => panic!("expected Restore"),
        }
    }

    #[test]
    fn verify_defaults() {
        let cli = Cli::parse_from(["odin-image", "verify", "image.odin"]);
        match cli.command {
            Command::Verify(args) => {
                assert_eq!(args.container_path, PathBuf::from("image.odin"));
                assert_eq!(args.config.split_size, 0);
            }
            _ => panic!("expected Verify"),
        }
    }

    #[test]
    fn split_size_option_parses() {
        let cli = Cli::parse_from([
            "odin-image",
            "backup",
            "dev",
            "out.odin",
            "--split-size",
            "1048576",
        ]);
        match cli.command {
            Command::Backup(args) => assert_eq!(args.config.split_size, 1_048_576),
            _ => panic!("expected Backup"),
        }
    }
}
