//! Splitting a container across parts is transparent on restore, and part
//! sizes land exactly on the configured split boundary.

mod common;

use tempfile::tempdir;

use odin_image::collab::{NoFeedback, NullProgressSink};
use odin_image::config::CompressionFormat;
use odin_image::container::part_path;
use odin_image::crc32::crc32;
use odin_image::pipeline::{BackupRequest, PipelineCoordinator, RestoreRequest};

const TEN_MIB: u64 = 10 * (1 << 20);
const SPLIT_SIZE: u64 = 4 * (1 << 20);
const CLUSTER_SIZE: u32 = 4096;
const HEADER_LEN: u64 = 90;

#[test]
fn split_at_four_mib_produces_expected_part_sizes_and_reproduces_source() {
    let dir = tempdir().unwrap();
    let source_path = dir.path().join("source.bin");
    let container_path = dir.path().join("img.odin");
    let target_path = dir.path().join("restored.bin");

    let source = vec![0xFFu8; TEN_MIB as usize];
    common::write_source(&source_path, &source);

    let mut config = common::config(CompressionFormat::None);
    config.save_all_blocks = true;
    config.split_size = SPLIT_SIZE;

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
    assert_eq!(outcome.part_count, 3);

    let part0 = &container_path;
    let part1 = part_path(&container_path, 1);
    let part2 = part_path(&container_path, 2);
    assert_eq!(part1, dir.path().join("img0001.odin"));
    assert_eq!(part2, dir.path().join("img0002.odin"));

    assert_eq!(std::fs::metadata(part0).unwrap().len(), SPLIT_SIZE + HEADER_LEN);
    assert_eq!(std::fs::metadata(&part1).unwrap().len(), SPLIT_SIZE);
    assert_eq!(std::fs::metadata(&part2).unwrap().len(), TEN_MIB - 2 * SPLIT_SIZE);

    let mut reassembled = std::fs::read(part0).unwrap()[HEADER_LEN as usize..].to_vec();
    reassembled.extend(std::fs::read(&part1).unwrap());
    reassembled.extend(std::fs::read(&part2).unwrap());
    assert_eq!(reassembled, source);

    let mut coordinator = PipelineCoordinator::new(Box::new(NullProgressSink));
    let restore_outcome = coordinator
        .restore(RestoreRequest {
            container_path: container_path.clone(),
            target_path: target_path.clone(),
            config,
            feedback: Box::new(NoFeedback),
        })
        .unwrap();
    assert_eq!(restore_outcome.crc32, crc32(&source));
    assert_eq!(std::fs::read(&target_path).unwrap(), source);
}
