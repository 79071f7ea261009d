//! Small round-trip with no compression, every cluster treated as used.

mod common;

use tempfile::tempdir;

use odin_image::collab::{NoFeedback, NullProgressSink};
use odin_image::config::CompressionFormat;
use odin_image::crc32::crc32;
use odin_image::header::ContainerHeader;
use odin_image::pipeline::{BackupRequest, PipelineCoordinator, RestoreRequest, VerifyRequest};

const ONE_MIB: usize = 1 << 20;
const CLUSTER_SIZE: u32 = 4096;

#[test]
fn small_image_round_trips_and_verifies() {
    let dir = tempdir().unwrap();
    let source_path = dir.path().join("source.bin");
    let container_path = dir.path().join("image.odin");
    let target_path = dir.path().join("restored.bin");

    let source = common::offset_pattern(ONE_MIB);
    common::write_source(&source_path, &source);

    let mut config = common::config(CompressionFormat::None);
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
        .unwrap();

    assert_eq!(outcome.part_count, 1);
    assert_eq!(outcome.allocated_bytes, ONE_MIB as u64);
    assert_eq!(outcome.crc32, crc32(&source));

    let mut header_file = std::fs::File::open(&container_path).unwrap();
    let header = ContainerHeader::read(&mut header_file).unwrap();
    assert_eq!(header.volume_size, ONE_MIB as u64);
    assert_eq!(header.crc32, crc32(&source));
    assert_eq!(header.alloc_map_length, 0);

    let mut coordinator = PipelineCoordinator::new(Box::new(NullProgressSink));
    let restore_outcome = coordinator
        .restore(RestoreRequest {
            container_path: container_path.clone(),
            target_path: target_path.clone(),
            config: config.clone(),
            feedback: Box::new(NoFeedback),
        })
        .unwrap();
    assert_eq!(restore_outcome.crc32, crc32(&source));

    let restored = std::fs::read(&target_path).unwrap();
    assert_eq!(restored, source);

    let mut coordinator = PipelineCoordinator::new(Box::new(NullProgressSink));
    let verify_crc = coordinator
        .verify(VerifyRequest {
            container_path,
            config,
            feedback: Box::new(NoFeedback),
        })
        .unwrap();
    assert_eq!(verify_crc, crc32(&source));
}
