//! Running CRC-32 for container integrity checking (§7).
//!
//! Thin wrapper over `crc32fast::Hasher` so reader/writer stages can feed it
//! chunk-sized slices without each pulling in the crate directly.

use crc32fast::Hasher;

#[derive(Default)]
pub struct RunningCrc32 {
    hasher: Hasher,
}

impl RunningCrc32 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}

/// One-shot CRC-32 of a whole buffer, used by tests and small fixed-size
/// header fields.
pub fn crc32(data: &[u8]) -> u32 {
    let mut h = Hasher::new();
    h.update(data);
    h.finalize()
}
