//! Each compression format shrinks a highly repetitive source well below
//! its original size and round-trips byte-identical.
//!
//! Scaled down from the nominal 64 MiB / 1 MiB scenario to keep the suite
//! fast; the compression ratio asserted here (8:1) is far looser than what
//! any of these codecs actually achieve on a 4-byte repeating pattern, so
//! the scaling doesn't weaken the property being checked.

mod common;

use tempfile::tempdir;

use odin_image::collab::{NoFeedback, NullProgressSink};
use odin_image::config::CompressionFormat;
use odin_image::crc32::crc32;
use odin_image::pipeline::{BackupRequest, PipelineCoordinator, RestoreRequest, VerifyRequest};

const SOURCE_LEN: usize = 8 * (1 << 20);
const CLUSTER_SIZE: u32 = 4096;

fn repeating_pattern(len: usize) -> Vec<u8> {
    b"ODIN".iter().cycle().take(len).copied().collect()
}

#[test]
fn every_format_compresses_and_round_trips() {
    for format in [
        CompressionFormat::Gzip,
        CompressionFormat::Lz4,
        CompressionFormat::Lz4Hc,
        CompressionFormat::Zstd,
    ] {
        let dir = tempdir().unwrap();
        let source_path = dir.path().join("source.bin");
        let container_path = dir.path().join("image.odin");
        let target_path = dir.path().join("restored.bin");

        let source = repeating_pattern(SOURCE_LEN);
        common::write_source(&source_path, &source);

        let mut config = common::config(format);
        config.save_all_blocks = true;

        let mut coordinator = PipelineCoordinator::new(Box::new(NullProgressSink));
        let outcome = coordinator
            .backup(BackupRequest {
                device_path: source_path.clone(),
                container_path: container_path.clone(),
                volume_kind: common::DEFAULT_VOLUME_KIND,
                cluster_size: CLUSTER_SIZE,
                config: config.clone(),
                allocation_map: None,
            })
            .unwrap_or_else(|e| panic!("{format} backup failed: {e}"));
        assert_eq!(outcome.crc32, crc32(&source));

        let compressed_len = std::fs::metadata(&container_path).unwrap().len();
        assert!(
            compressed_len < (SOURCE_LEN / 8) as u64,
            "{format}: compressed container ({compressed_len} bytes) did not shrink enough"
        );

        let mut coordinator = PipelineCoordinator::new(Box::new(NullProgressSink));
        coordinator
            .restore(RestoreRequest {
                container_path: container_path.clone(),
                target_path: target_path.clone(),
                config: config.clone(),
                feedback: Box::new(NoFeedback),
            })
            .unwrap_or_else(|e| panic!("{format} restore failed: {e}"));

        let restored = std::fs::read(&target_path).unwrap();
        assert_eq!(restored, source, "{format}: restored content differs");

        let mut coordinator = PipelineCoordinator::new(Box::new(NullProgressSink));
        coordinator
            .verify(VerifyRequest {
                container_path,
                config,
                feedback: Box::new(NoFeedback),
            })
            .unwrap_or_else(|e| panic!("{format} verify failed: {e}"));
    }
}
