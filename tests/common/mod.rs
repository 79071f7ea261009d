//! Shared fixtures for the end-to-end pipeline tests.

use std::path::Path;

use odin_image::config::{CompressionFormat, PipelineConfig, VolumeKind};

/// `byte i & 0xFF` content, the pattern used throughout the scenario suite.
pub fn offset_pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i & 0xFF) as u8).collect()
}

/// A content pattern that never contains a zero byte, so sparse
/// hole-punching on the restore side can't mask a missed write.
pub fn nonzero_pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i % 200) + 1) as u8).collect()
}

pub fn config(compression: CompressionFormat) -> PipelineConfig {
    PipelineConfig {
        compression,
        ..PipelineConfig::default()
    }
}

pub fn write_source(path: &Path, data: &[u8]) {
    std::fs::write(path, data).unwrap();
}

pub const DEFAULT_VOLUME_KIND: VolumeKind = VolumeKind::Partition;
