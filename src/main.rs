//! `odin-image` binary: a thin driver that parses arguments, builds a
//! [`odin_image::pipeline::PipelineCoordinator`], and reports the outcome.
//!
//! Grounded on the teacher's `main.rs` dispatch shape (parse args, resolve
//! defaults, call into the library, map errors to an exit code) but without
//! the teacher's single-job compress/decompress branch: this binary instead
//! dispatches on the `backup`/`restore`/`verify` subcommand.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

use odin_image::cli::{Cli, Command, PrintProgressSink, TerminalFeedback};
use odin_image::collab::NullProgressSink;
use odin_image::device::BlockDeviceStream;
use odin_image::header::ContainerHeader;
use odin_image::pipeline::{BackupRequest, PipelineCoordinator, RestoreRequest, VerifyRequest};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Backup(args) => {
            let volume_size = BlockDeviceStream::open_read(&args.device_path, args.cluster_size)
                .map(|d| d.size())
                .unwrap_or(0);
            let mut coordinator =
                PipelineCoordinator::new(Box::new(PrintProgressSink::new(volume_size, false)));
            let outcome = coordinator
                .backup(BackupRequest {
                    device_path: args.device_path,
                    container_path: args.container_path,
                    volume_kind: args.volume_kind.into(),
                    cluster_size: args.cluster_size,
                    config: args.config.into_pipeline_config(),
                    allocation_map: None,
                })
                .context("backup failed")?;
            println!(
                "backup complete: crc32={:#010x} parts={} allocated_bytes={}",
                outcome.crc32, outcome.part_count, outcome.allocated_bytes
            );
        }
        Command::Restore(args) => {
            let volume_size = peek_container_volume_size(&args.container_path).unwrap_or(0);
            let mut coordinator =
                PipelineCoordinator::new(Box::new(PrintProgressSink::new(volume_size, false)));
            let outcome = coordinator
                .restore(RestoreRequest {
                    container_path: args.container_path,
                    target_path: args.target_path,
                    config: args.config.into_pipeline_config(),
                    feedback: Box::new(TerminalFeedback),
                })
                .context("restore failed")?;
            println!("restore complete: crc32={:#010x}", outcome.crc32);
        }
        Command::Verify(args) => {
            let mut coordinator = PipelineCoordinator::new(Box::new(NullProgressSink));
            let crc32 = coordinator
                .verify(VerifyRequest {
                    container_path: args.container_path,
                    config: args.config.into_pipeline_config(),
                    feedback: Box::new(TerminalFeedback),
                })
                .context("verify failed")?;
            println!("verify ok: crc32={crc32:#010x}");
        }
    }

    Ok(())
}

/// Best-effort peek at a container's header, used only to size the CLI's
/// progress bar; a failure here is not fatal, the real read happens inside
/// the coordinator and surfaces its own error.
fn peek_container_volume_size(path: &Path) -> Option<u64> {
    let mut file = File::open(path).ok()?;
    ContainerHeader::read(&mut file).ok().map(|h| h.volume_size)
}
