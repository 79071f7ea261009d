//! Reader stage: emits chunks from a source, honoring the allocation map
//! when backing up a device in used-blocks mode (§4.G, component G).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::allocmap::Run;
use crate::chunk::{CancelToken, ChunkQueue};
use crate::crc32::RunningCrc32;
use crate::device::BlockDeviceStream;
use crate::container::file_stream::ContainerReadStream;
use crate::error::Result;

/// What the reader pulls bytes from.
pub enum ReadSource {
    /// A raw block device, read at caller-chosen offsets (backup
    /// direction). Supports allocation-map-driven skipping.
    Device(BlockDeviceStream),
    /// A container's sequential byte stream (restore/verify direction, the
    /// already-decompressed or not-yet-decompressed payload depending on
    /// where this reader sits in the pipeline). Always read start-to-end.
    Container(ContainerReadStream),
}

pub struct ReaderStage {
    source: ReadSource,
    queue: Arc<ChunkQueue>,
    cancel: CancelToken,
    /// Precomputed (byte_offset, run) pairs, device mode only.
    alloc_runs: Option<Vec<(u64, Run)>>,
    cluster_size: u64,
    source_len: u64,
    bytes_processed: Arc<AtomicU64>,
    crc: RunningCrc32,
}

impl ReaderStage {
    pub fn new(
        source: ReadSource,
        queue: Arc<ChunkQueue>,
        cancel: CancelToken,
        alloc_runs: Option<Vec<(u64, Run)>>,
        cluster_size: u64,
        source_len: u64,
        bytes_processed: Arc<AtomicU64>,
    ) -> Self {
        ReaderStage {
            source,
            queue,
            cancel,
            alloc_runs,
            cluster_size,
            source_len,
            bytes_processed,
            crc: RunningCrc32::new(),
        }
    }

    /// Runs to completion (EOS or error) on the calling thread; the
    /// coordinator spawns this on a dedicated reader thread (§5).
    pub fn run(mut self) -> Result<u32> {
        match self.alloc_runs.take() {
            Some(runs) => self.run_device_with_runs(runs)?,
            None => match &mut self.source {
                ReadSource::Device(_) => self.run_device_plain()?,
                ReadSource::Container(_) => self.run_container()?,
            },
        }
        Ok(self.crc.finalize())
    }

    fn take_empty_or_cancelled(&self) -> Option<crate::chunk::Chunk> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.queue.take_empty()
    }

    fn emit(&mut self, data: &[u8]) -> Result<bool> {
        let mut offset = 0;
        while offset < data.len() {
            let Some(mut chunk) = self.take_empty_or_cancelled() else {
                return Ok(false);
            };
            let cap = chunk.capacity();
            let n = (data.len() - offset).min(cap);
            chunk.as_mut_slice()[..n].copy_from_slice(&data[offset..offset + n]);
            chunk.set_len(n);
            self.crc.update(&data[offset..offset + n]);
            self.queue.return_filled(chunk);
            self.bytes_processed.fetch_add(n as u64, Ordering::Relaxed);
            offset += n;
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn emit_eos(&self) {
        if let Some(mut chunk) = self.queue.take_empty() {
            chunk.set_len(0);
            chunk.set_eos(true);
            self.queue.return_filled(chunk);
        }
    }

    fn run_device_plain(&mut self) -> Result<()> {
        const STEP: usize = 1 << 20;
        let mut offset = 0u64;
        let len = self.source_len;
        while offset < len {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            let want = STEP.min((len - offset) as usize);
            let mut buf = vec![0u8; want];
            let n = match &mut self.source {
                ReadSource::Device(dev) => dev.read_at(offset, &mut buf)?,
                ReadSource::Container(_) => unreachable!("plain device loop"),
            };
            if n == 0 {
                break;
            }
            if !self.emit(&buf[..n])? {
                return Ok(());
            }
            offset += n as u64;
        }
        self.emit_eos();
        Ok(())
    }

    fn run_device_with_runs(&mut self, runs: Vec<(u64, Run)>) -> Result<()> {
        for (cluster_offset, run) in runs {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            if !run.used {
                continue;
            }
            let byte_offset = cluster_offset * self.cluster_size;
            let total = run.clusters * self.cluster_size;
            let mut remaining = total;
            let mut pos = byte_offset;
            while remaining > 0 {
                if self.cancel.is_cancelled() {
                    return Ok(());
                }
                let want = remaining.min(1 << 20) as usize;
                let mut buf = vec![0u8; want];
                let n = match &mut self.source {
                    ReadSource::Device(dev) => dev.read_at(pos, &mut buf)?,
                    ReadSource::Container(_) => unreachable!("device-only path"),
                };
                if n == 0 {
                    break;
                }
                if !self.emit(&buf[..n])? {
                    return Ok(());
                }
                pos += n as u64;
                remaining -= n as u64;
            }
        }
        self.emit_eos();
        Ok(())
    }

    fn run_container(&mut self) -> Result<()> {
        const STEP: usize = 1 << 20;
        let mut buf = vec![0u8; STEP];
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            let n = match &mut self.source {
                ReadSource::Container(stream) => stream.read(&mut buf)?,
                ReadSource::Device(_) => unreachable!("container-only path"),
            };
            if n == 0 {
                break;
            }
            if !self.emit(&buf[..n])? {
                return Ok(());
            }
        }
        self.emit_eos();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc32::crc32;
    use tempfile::NamedTempFile;

    fn make_queue() -> (Arc<ChunkQueue>, CancelToken) {
        let cancel = CancelToken::new();
        let queue = Arc::new(ChunkQueue::new(4, 4096, &cancel));
        (queue, cancel)
    }

    #[test]
    fn plain_device_read_emits_all_bytes_and_correct_crc() {
        let f = NamedTempFile::new().unwrap();
        let data = vec![0x42u8; 8192];
        std::fs::write(f.path(), &data).unwrap();
        let dev = BlockDeviceStream::open_read(f.path(), 4096).unwrap();
        let len = dev.size();
        let (queue, cancel) = make_queue();
        let bytes_processed = Arc::new(AtomicU64::new(0));
        let reader = ReaderStage::new(
            ReadSource::Device(dev),
            Arc::clone(&queue),
            cancel,
            None,
            4096,
            len,
            Arc::clone(&bytes_processed),
        );

        let handle = std::thread::spawn(move || reader.run());

        let mut collected = Vec::new();
        loop {
            let chunk = queue.take_filled().unwrap();
            collected.extend_from_slice(chunk.data());
            let eos = chunk.eos();
            queue.return_empty(chunk);
            if eos {
                break;
            }
        }
        let crc = handle.join().unwrap().unwrap();
        assert_eq!(collected, data);
        assert_eq!(crc, crc32(&data));
        assert_eq!(bytes_processed.load(Ordering::Relaxed), 8192);
    }

    #[test]
    fn used_run_skip_free_clusters() {
        let f = NamedTempFile::new().unwrap();
        let mut data = vec![0xAAu8; 4096]; // used cluster 0
        data.extend(vec![0xBBu8; 4096]); // free cluster 1 (skipped)
        data.extend(vec![0xCCu8; 4096]); // used cluster 2
        std::fs::write(f.path(), &data).unwrap();
        let dev = BlockDeviceStream::open_read(f.path(), 4096).unwrap();
        let len = dev.size();
        let (queue, cancel) = make_queue();
        let bytes_processed = Arc::new(AtomicU64::new(0));
        let runs = vec![
            (
                0,
                Run {
                    used: true,
                    clusters: 1,
                },
            ),
            (
                1,
                Run {
                    used: false,
                    clusters: 1,
                },
            ),
            (
                2,
                Run {
                    used: true,
                    clusters: 1,
                },
            ),
        ];
        let reader = ReaderStage::new(
            ReadSource::Device(dev),
            Arc::clone(&queue),
            cancel,
            Some(runs),
            4096,
            len,
            bytes_processed,
        );
        let handle = std::thread::spawn(move || reader.run());
        let mut collected = Vec::new();
        loop {
            let chunk = queue.take_filled().unwrap();
            collected.extend_from_slice(chunk.data());
            let eos = chunk.eos();
            queue.return_empty(chunk);
            if eos {
                break;
            }
        }
        handle.join().unwrap().unwrap();
        let mut expected = vec![0xAAu8; 4096];
        expected.extend(vec![0xCCu8; 4096]);
        assert_eq!(collected, expected);
    }
}
