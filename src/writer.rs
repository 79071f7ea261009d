//! Writer stage: symmetric to the reader, consumes chunks and writes,
//! discards (verify), or seeks past them according to the allocation map
//! (§4.H, component H).

use std::fs::File;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::allocmap::Run;
use crate::chunk::{CancelToken, ChunkQueue};
use crate::container::file_stream::ContainerWriteStream;
use crate::crc32::RunningCrc32;
use crate::device::BlockDeviceStream;
use crate::error::Result;
use crate::io::sparse::{fwrite_sparse, fwrite_sparse_end};

pub enum WriteSink {
    /// Backup direction: sequential append to the container.
    Container(ContainerWriteStream),
    /// Restore direction onto a raw device: random-access writes, free
    /// runs advance the cursor without writing.
    Device(BlockDeviceStream),
    /// Restore direction onto a regular file (tests, image-as-file
    /// restores): supports sparse hole-punching (§4.H "ADDED").
    File { file: File, sparse_mode: bool },
    /// Verify direction: bytes are CRC'd and discarded.
    Discard,
}

pub struct WriterStage {
    sink: WriteSink,
    queue: Arc<ChunkQueue>,
    cancel: CancelToken,
    /// Precomputed (byte_offset, run) pairs for restore onto a device or
    /// file; `None` means write sequentially with no gaps (backup, or a
    /// save-all-blocks restore).
    alloc_runs: Option<Vec<(u64, Run)>>,
    cluster_size: u64,
    bytes_processed: Arc<AtomicU64>,
    crc: RunningCrc32,
    stored_skips: u64,
    /// Cursor for sequential writes onto a device sink when no allocation
    /// map is in play (full-device restore, every block was saved).
    seq_cursor: u64,
}

impl WriterStage {
    pub fn new(
        sink: WriteSink,
        queue: Arc<ChunkQueue>,
        cancel: CancelToken,
        alloc_runs: Option<Vec<(u64, Run)>>,
        cluster_size: u64,
        bytes_processed: Arc<AtomicU64>,
    ) -> Self {
        WriterStage {
            sink,
            queue,
            cancel,
            alloc_runs,
            cluster_size,
            bytes_processed,
            crc: RunningCrc32::new(),
            stored_skips: 0,
            seq_cursor: 0,
        }
    }

    /// Runs to completion, returning the CRC-32 of every byte the writer
    /// consumed from its input queue (used for `VerifyMismatch` and for
    /// recording into the header on restore, if desired) together with the
    /// final part count (always `1` unless the sink is a splitting
    /// container writer).
    pub fn run(mut self) -> Result<(u32, u32)> {
        match self.alloc_runs.take() {
            Some(runs) => self.run_with_runs(runs)?,
            None => self.run_sequential()?,
        }
        self.finish_sink()?;
        let part_count = match &self.sink {
            WriteSink::Container(stream) => stream.part_count(),
            _ => 1,
        };
        Ok((self.crc.finalize(), part_count))
    }

    fn finish_sink(&mut self) -> Result<()> {
        if let WriteSink::File { file, .. } = &mut self.sink {
            fwrite_sparse_end(file, self.stored_skips)?;
        }
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.crc.update(data);
        match &mut self.sink {
            WriteSink::Container(stream) => stream.write_all(data),
            WriteSink::Device(dev) => {
                dev.write_at(self.seq_cursor, data)?;
                self.seq_cursor += data.len() as u64;
                Ok(())
            }
            WriteSink::File { file, sparse_mode } => {
                self.stored_skips =
                    fwrite_sparse(file, data, self.stored_skips, *sparse_mode)?;
                Ok(())
            }
            WriteSink::Discard => Ok(()),
        }
    }

    fn run_sequential(&mut self) -> Result<()> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            let Some(chunk) = self.queue.take_filled() else {
                return Ok(());
            };
            let eos = chunk.eos();
            if !chunk.is_empty() {
                self.write_bytes(chunk.data())?;
                self.bytes_processed
                    .fetch_add(chunk.len() as u64, Ordering::Relaxed);
            }
            self.queue.return_empty(chunk);
            if eos {
                return Ok(());
            }
        }
    }

    /// Restore path with an allocation map: the incoming byte stream is
    /// exactly the concatenation of used-cluster bytes (container
    /// invariant, §3); the writer walks the same run sequence the backup
    /// reader used, writing used spans at their original offsets and
    /// advancing the sink cursor across free spans without writing.
    fn run_with_runs(&mut self, runs: Vec<(u64, Run)>) -> Result<()> {
        let mut pending = Vec::new();
        let mut eos_seen = false;

        for (cluster_offset, run) in runs {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            let byte_offset = cluster_offset * self.cluster_size;
            let run_len = run.clusters * self.cluster_size;

            if !run.used {
                self.advance_gap(byte_offset, run_len)?;
                continue;
            }

            let mut remaining = run_len;
            let mut pos = byte_offset;
            while remaining > 0 {
                if self.cancel.is_cancelled() {
                    return Ok(());
                }
                if pending.is_empty() {
                    if eos_seen {
                        break;
                    }
                    let Some(chunk) = self.queue.take_filled() else {
                        return Ok(());
                    };
                    eos_seen = chunk.eos();
                    pending = chunk.data().to_vec();
                    self.queue.return_empty(chunk);
                }
                let take = (pending.len() as u64).min(remaining) as usize;
                let piece = pending.drain(..take).collect::<Vec<u8>>();
                self.write_at(pos, &piece)?;
                self.bytes_processed
                    .fetch_add(piece.len() as u64, Ordering::Relaxed);
                pos += piece.len() as u64;
                remaining -= piece.len() as u64;
            }
        }
        Ok(())
    }

    fn advance_gap(&mut self, offset: u64, len: u64) -> Result<()> {
        match &mut self.sink {
            WriteSink::Device(dev) => dev.skip(offset, len),
            WriteSink::File { .. } => {
                self.stored_skips += len;
                Ok(())
            }
            WriteSink::Container(_) | WriteSink::Discard => Ok(()),
        }
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.crc.update(data);
        match &mut self.sink {
            WriteSink::Device(dev) => dev.write_at(offset, data),
            WriteSink::File { file, sparse_mode } => {
                self.stored_skips =
                    fwrite_sparse(file, data, self.stored_skips, *sparse_mode)?;
                Ok(())
            }
            WriteSink::Container(stream) => stream.write_all(data),
            WriteSink::Discard => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;
    use crate::crc32::crc32;
    use tempfile::NamedTempFile;

    fn make_queue() -> (Arc<ChunkQueue>, CancelToken) {
        let cancel = CancelToken::new();
        let queue = Arc::new(ChunkQueue::new(4, 4096, &cancel));
        (queue, cancel)
    }

    fn feed(queue: &ChunkQueue, data: &[u8], piece: usize) {
        for part in data.chunks(piece) {
            let mut c = queue.take_empty().unwrap();
            c.as_mut_slice()[..part.len()].copy_from_slice(part);
            c.set_len(part.len());
            queue.return_filled(c);
        }
        let mut eos = queue.take_empty().unwrap();
        eos.set_len(0);
        eos.set_eos(true);
        queue.return_filled(eos);
    }

    #[test]
    fn sequential_discard_computes_crc() {
        let (queue, cancel) = make_queue();
        let data = vec![0x11u8; 10_000];
        let bytes_processed = Arc::new(AtomicU64::new(0));
        let writer = WriterStage::new(
            WriteSink::Discard,
            Arc::clone(&queue),
            cancel,
            None,
            4096,
            bytes_processed,
        );
        let handle = std::thread::spawn(move || writer.run());
        feed(&queue, &data, 777);
        let (crc, part_count) = handle.join().unwrap().unwrap();
        assert_eq!(crc, crc32(&data));
        assert_eq!(part_count, 1);
    }

    #[test]
    fn run_driven_restore_writes_used_skips_free() {
        let f = NamedTempFile::new().unwrap();
        std::fs::write(f.path(), vec![0u8; 12288]).unwrap();
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(f.path())
            .unwrap();
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
        let writer = WriterStage::new(
            WriteSink::File {
                file,
                sparse_mode: false,
            },
            Arc::clone(&queue),
            cancel,
            Some(runs),
            4096,
            bytes_processed,
        );
        let handle = std::thread::spawn(move || writer.run());
        let mut payload = vec![0xAAu8; 4096];
        payload.extend(vec![0xCCu8; 4096]);
        feed(&queue, &payload, 4096);
        handle.join().unwrap().unwrap();

        let result = std::fs::read(f.path()).unwrap();
        assert_eq!(&result[0..4096], &vec![0xAAu8; 4096][..]);
        assert_eq!(&result[8192..12288], &vec![0xCCu8; 4096][..]);
    }
}
