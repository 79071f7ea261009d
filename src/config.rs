//! Session configuration and compile-time constants.
//!
//! Grounded on the teacher's `io::prefs::Prefs` value type and `config.rs`
//! constants module: a plain, passed-in value rather than a process-wide
//! singleton (SPEC_FULL.md §9 "Global state").

use std::fmt;

pub const KB: usize = 1 << 10;
pub const MB: usize = 1 << 20;

/// Default chunk capacity (component A). Corresponds to `read_block_size`.
pub const DEFAULT_CHUNK_SIZE: usize = MB;

/// Default bounded-pool size N (component A).
pub const DEFAULT_POOL_SIZE: usize = 8;

/// Default zstd/gzip compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 6;

/// bzip2 is always encoded at level 9, matching the original
/// `BZ2_bzCompressInit(&bzsStream, 9, 0, 0)` call — not configurable (§9:
/// bzip2 encode is preserved for compatibility but discouraged).
pub const BZIP2_ENCODE_LEVEL: u32 = 9;

/// Maximum UTF-16 comment length in code units (§6).
pub const MAX_COMMENT_LEN: usize = 32_768;

/// Compression format, matching the header's 4-byte compression field (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionFormat {
    #[default]
    None = 0,
    Gzip = 1,
    Bzip2 = 2,
    Lz4 = 3,
    Lz4Hc = 4,
    Zstd = 5,
}

impl CompressionFormat {
    pub fn to_u32(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for CompressionFormat {
    type Error = u32;

    fn try_from(v: u32) -> Result<Self, u32> {
        match v {
            0 => Ok(Self::None),
            1 => Ok(Self::Gzip),
            2 => Ok(Self::Bzip2),
            3 => Ok(Self::Lz4),
            4 => Ok(Self::Lz4Hc),
            5 => Ok(Self::Zstd),
            other => Err(other),
        }
    }
}

impl fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
            Self::Lz4 => "lz4",
            Self::Lz4Hc => "lz4hc",
            Self::Zstd => "zstd",
        };
        f.write_str(s)
    }
}

/// Volume kind, matching the header's volume-kind field (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VolumeKind {
    #[default]
    Partition = 0,
    WholeDisk = 1,
}

impl VolumeKind {
    pub fn to_u32(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for VolumeKind {
    type Error = u32;

    fn try_from(v: u32) -> Result<Self, u32> {
        match v {
            0 => Ok(Self::Partition),
            1 => Ok(Self::WholeDisk),
            other => Err(other),
        }
    }
}

/// Per-operation configuration (§6 "Pipeline configuration"). Constructed by
/// a caller (CLI, test, or embedding application) and passed in — there is
/// no process-wide singleton.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub compression: CompressionFormat,
    pub compression_level: i32,
    pub save_all_blocks: bool,
    pub split_size: u64,
    pub read_block_size: usize,
    pub pool_size: usize,
    pub comment: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            compression: CompressionFormat::None,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            save_all_blocks: false,
            split_size: 0,
            read_block_size: DEFAULT_CHUNK_SIZE,
            pool_size: DEFAULT_POOL_SIZE,
            comment: String::new(),
        }
    }
}

impl PipelineConfig {
    /// Clamp `compression_level` into the range valid for `compression`,
    /// mirroring §4.F's "zstd [1,22]" / "gzip [1,9]" ranges. bzip2 and lz4
    /// ignore the level (the former is pinned to 9, the latter switches
    /// between fast/HC mode purely on `compression` itself).
    pub fn normalized_level(&self) -> i32 {
        match self.compression {
            CompressionFormat::Zstd => self.compression_level.clamp(1, 22),
            CompressionFormat::Gzip => self.compression_level.clamp(1, 9),
            _ => self.compression_level,
        }
    }
}
