//! Assembles and drives backup/restore/verify sessions (§4.J, component J).
//!
//! Grounded on the teacher's top-level driver that opens streams, wires
//! worker threads around a shared cancellation flag, and joins them on
//! completion — generalized here from a single compress-or-decompress job
//! to the three-stage reader/codec/writer topology with an optional middle
//! stage.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::allocmap::AllocationMap;
use crate::chunk::{CancelToken, ChunkQueue};
use crate::codec::{new_decoder, new_encoder};
use crate::codec_stage::CodecStage;
use crate::collab::{log_error, ProgressSink, UserFeedback};
use crate::config::{CompressionFormat, PipelineConfig, VolumeKind};
use crate::container::file_stream::{ContainerReadStream, ContainerWriteStream};
use crate::container::split::{SplitReader, SplitWriter};
use crate::device::BlockDeviceStream;
use crate::error::{PipelineError, Result};
use crate::header::ContainerHeader;
use crate::reader::{ReaderStage, ReadSource};
use crate::writer::{WriteSink, WriterStage};

/// What the caller asked of one pipeline session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Running,
    Finalizing,
    Done,
    Failed,
    Cancelled,
}

fn transition(from: SessionState, to: SessionState) {
    match to {
        SessionState::Failed => log::warn!("pipeline {from:?} -> {to:?}"),
        SessionState::Cancelled => log::warn!("pipeline {from:?} -> {to:?}"),
        _ => log::debug!("pipeline {from:?} -> {to:?}"),
    }
}

pub struct BackupRequest {
    pub device_path: PathBuf,
    pub container_path: PathBuf,
    pub volume_kind: VolumeKind,
    pub cluster_size: u32,
    pub config: PipelineConfig,
    /// Caller-supplied used-cluster map (filesystem-aware detection is a
    /// platform collaborator's job, out of this crate's scope, §1). Ignored
    /// when `config.save_all_blocks` is set.
    pub allocation_map: Option<AllocationMap>,
}

pub struct RestoreRequest {
    pub container_path: PathBuf,
    pub target_path: PathBuf,
    pub config: PipelineConfig,
    pub feedback: Box<dyn UserFeedback>,
}

pub struct VerifyRequest {
    pub container_path: PathBuf,
    pub config: PipelineConfig,
    pub feedback: Box<dyn UserFeedback>,
}

pub struct BackupOutcome {
    pub crc32: u32,
    pub part_count: u32,
    pub allocated_bytes: u64,
}

pub struct RestoreOutcome {
    pub crc32: u32,
}

/// Drives one backup/restore/verify operation at a time. Not reused across
/// concurrent operations — construct one per session (§3 "Pipeline
/// session").
pub struct PipelineCoordinator {
    cancel: CancelToken,
    bytes_processed: Arc<AtomicU64>,
    progress: Box<dyn ProgressSink>,
    state: SessionState,
}

impl PipelineCoordinator {
    pub fn new(progress: Box<dyn ProgressSink>) -> Self {
        PipelineCoordinator {
            cancel: CancelToken::new(),
            bytes_processed: Arc::new(AtomicU64::new(0)),
            progress,
            state: SessionState::Idle,
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed.load(Ordering::Relaxed)
    }

    fn set_state(&mut self, to: SessionState) {
        transition(self.state, to);
        self.state = to;
    }

    /// Spawns a watcher that reports `bytes_processed` to the progress sink
    /// on a fixed cadence until `stop` is poisoned. Mirrors the teacher's
    /// polling-driven progress print rather than a push channel (§2.2).
    fn sample_progress(
        bytes_processed: Arc<AtomicU64>,
        cancel: CancelToken,
        mut progress: Box<dyn ProgressSink>,
    ) -> (thread::JoinHandle<Box<dyn ProgressSink>>, CancelToken) {
        let sampler_cancel = CancelToken::new();
        let stop = sampler_cancel.clone();
        let handle = thread::spawn(move || {
            loop {
                if stop.is_cancelled() || cancel.is_cancelled() {
                    break;
                }
                progress.on_bytes_processed(bytes_processed.load(Ordering::Relaxed));
                thread::sleep(Duration::from_millis(200));
            }
            progress
        });
        (handle, sampler_cancel)
    }

    pub fn backup(&mut self, req: BackupRequest) -> Result<BackupOutcome> {
        self.set_state(SessionState::Running);
        match self.run_backup(req) {
            Ok(outcome) => {
                self.set_state(SessionState::Done);
                Ok(outcome)
            }
            Err(e) => {
                if e.is_cancelled() {
                    self.set_state(SessionState::Cancelled);
                } else {
                    self.set_state(SessionState::Failed);
                    log_error(&e);
                    self.progress.on_error(e.kind(), &e.to_string());
                }
                Err(e)
            }
        }
    }

    fn run_backup(&mut self, req: BackupRequest) -> Result<BackupOutcome> {
        let dev = BlockDeviceStream::open_read(&req.device_path, req.cluster_size)?;
        let volume_size = dev.size();
        let cluster_size = req.cluster_size as u64;
        let total_clusters = (volume_size + cluster_size - 1) / cluster_size.max(1);

        // Locally-recovered fallback (§7): a mounted source cannot be
        // trusted for a used-cluster map without a live snapshot, so treat
        // it as save-all-blocks rather than fail outright.
        let mounted = dev.is_mounted();
        if mounted {
            log::warn!(
                "{} is mounted; falling back to save-all-blocks",
                req.device_path.display()
            );
        }
        let save_all = req.config.save_all_blocks || mounted;

        let alloc_map = if save_all {
            None
        } else {
            Some(
                req.allocation_map
                    .unwrap_or_else(|| AllocationMap::fully(true, total_clusters)),
            )
        };

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&req.container_path)
            .map_err(|source| PipelineError::FileOpenError {
                path: req.container_path.clone(),
                source,
            })?;

        let alloc_bytes = alloc_map.as_ref().map(|m| m.encode());
        let comment_len = req.config.comment.encode_utf16().count() as u64 * 2;
        let fixed_with_comment = 90u64 + comment_len;
        let (alloc_map_offset, alloc_map_length) = match &alloc_bytes {
            Some(bytes) => (fixed_with_comment, bytes.len() as u64),
            None => (0, 0),
        };
        let data_offset = fixed_with_comment + alloc_map_length;

        let header = ContainerHeader {
            volume_kind: req.volume_kind,
            compression: req.config.compression,
            cluster_size: req.cluster_size,
            volume_size,
            allocated_bytes: alloc_map
                .as_ref()
                .map(|m| m.used_clusters() * cluster_size)
                .unwrap_or(volume_size),
            alloc_map_offset,
            alloc_map_length,
            data_offset,
            crc32: 0,
            creation_timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            part_count: 0,
            part_size: req.config.split_size,
            comment: req.config.comment.clone(),
        };
        header.write(&mut file)?;
        if let Some(bytes) = &alloc_bytes {
            file.seek(SeekFrom::Start(alloc_map_offset))?;
            file.write_all(bytes)?;
        }
        file.seek(SeekFrom::Start(data_offset))?;

        let boundary: Option<Box<dyn crate::container::file_stream::WriteBoundary>> =
            if req.config.split_size > 0 {
                Some(Box::new(SplitWriter::new(req.container_path.clone())))
            } else {
                None
            };
        let container = ContainerWriteStream::new(file, req.config.split_size, boundary);

        let alloc_runs: Option<Vec<_>> = alloc_map.as_ref().map(|m| m.iter_with_offsets().collect());

        let (reader_crc, writer_result, part_count) = self.run_stages(
            ReadSource::Device(dev),
            WriteSink::Container(container),
            req.config.compression,
            req.config.normalized_level(),
            alloc_runs,
            req.cluster_size as u64,
            volume_size,
            req.config.pool_size,
            req.config.read_block_size,
            true,
        )?;
        let _ = writer_result;

        self.set_state(SessionState::Finalizing);
        let mut file = OpenOptions::new()
            .write(true)
            .open(&req.container_path)
            .map_err(|source| PipelineError::FileOpenError {
                path: req.container_path.clone(),
                source,
            })?;
        ContainerHeader::patch_crc32(&mut file, reader_crc, data_offset)?;
        // Part count is only known once splitting has actually happened;
        // patch it in alongside the CRC.
        file.seek(SeekFrom::Start(76))?;
        file.write_all(&part_count.to_le_bytes())?;

        Ok(BackupOutcome {
            crc32: reader_crc,
            part_count,
            allocated_bytes: header.allocated_bytes,
        })
    }

    pub fn restore(&mut self, req: RestoreRequest) -> Result<RestoreOutcome> {
        self.set_state(SessionState::Running);
        match self.run_restore(req) {
            Ok(outcome) => {
                self.set_state(SessionState::Done);
                Ok(outcome)
            }
            Err(e) => {
                if e.is_cancelled() {
                    self.set_state(SessionState::Cancelled);
                } else {
                    self.set_state(SessionState::Failed);
                    log_error(&e);
                    self.progress.on_error(e.kind(), &e.to_string());
                }
                Err(e)
            }
        }
    }

    fn run_restore(&mut self, req: RestoreRequest) -> Result<RestoreOutcome> {
        let (header, alloc_map, container) = open_container_for_read(
            &req.container_path,
            req.feedback,
        )?;

        let target_size = probe_target_size(&req.target_path, header.cluster_size)?;
        if let Some(size) = target_size {
            if size < header.volume_size {
                return Err(PipelineError::UnsupportedShrink {
                    target: size,
                    volume: header.volume_size,
                });
            }
        }

        let sink = open_restore_sink(&req.target_path, header.cluster_size)?;
        let alloc_runs: Option<Vec<_>> = alloc_map.as_ref().map(|m| m.iter_with_offsets().collect());

        let (_reader_crc, writer_crc, _parts) = self.run_stages(
            ReadSource::Container(container),
            sink,
            header.compression,
            req.config.normalized_level(),
            alloc_runs,
            header.cluster_size as u64,
            header.volume_size,
            req.config.pool_size,
            req.config.read_block_size,
            false,
        )?;

        Ok(RestoreOutcome {
            crc32: writer_crc.unwrap_or(0),
        })
    }

    pub fn verify(&mut self, req: VerifyRequest) -> Result<u32> {
        self.set_state(SessionState::Running);
        match self.run_verify(req) {
            Ok(crc) => {
                self.set_state(SessionState::Done);
                Ok(crc)
            }
            Err(e) => {
                if e.is_cancelled() {
                    self.set_state(SessionState::Cancelled);
                } else {
                    self.set_state(SessionState::Failed);
                    log_error(&e);
                    self.progress.on_error(e.kind(), &e.to_string());
                }
                Err(e)
            }
        }
    }

    fn run_verify(&mut self, req: VerifyRequest) -> Result<u32> {
        let (header, alloc_map, container) = open_container_for_read(
            &req.container_path,
            req.feedback,
        )?;
        let alloc_runs: Option<Vec<_>> = alloc_map.as_ref().map(|m| m.iter_with_offsets().collect());

        let (_reader_crc, writer_crc, _parts) = self.run_stages(
            ReadSource::Container(container),
            WriteSink::Discard,
            header.compression,
            req.config.normalized_level(),
            alloc_runs,
            header.cluster_size as u64,
            header.volume_size,
            req.config.pool_size,
            req.config.read_block_size,
            false,
        )?;

        let actual = writer_crc.unwrap_or(0);
        if actual != header.crc32 {
            return Err(PipelineError::VerifyMismatch {
                expected: header.crc32,
                actual,
            });
        }
        Ok(actual)
    }

    /// Builds the queues and stage threads, runs them to completion, and
    /// returns `(reader_crc, writer_crc, part_count)`. `writer_crc` is
    /// `None` for the backup direction, where the writer's CRC is over
    /// compressed bytes and therefore not meaningful (§4.J step 8 uses the
    /// reader's CRC instead). `part_count` reflects the container writer's
    /// final part count, or `1` when the writer side isn't a container.
    #[allow(clippy::too_many_arguments)]
    fn run_stages(
        &mut self,
        source: ReadSource,
        sink: WriteSink,
        compression: CompressionFormat,
        level: i32,
        alloc_runs_writer: Option<Vec<(u64, crate::allocmap::Run)>>,
        cluster_size: u64,
        source_len: u64,
        pool_size: usize,
        chunk_capacity: usize,
        reader_has_runs: bool,
    ) -> Result<(u32, Option<u32>, u32)> {
        let reader_runs = if reader_has_runs {
            alloc_runs_writer.clone()
        } else {
            None
        };
        let writer_runs = if reader_has_runs {
            None
        } else {
            alloc_runs_writer
        };

        let q1 = Arc::new(ChunkQueue::new(pool_size, chunk_capacity, &self.cancel));
        let bytes_processed = Arc::clone(&self.bytes_processed);
        bytes_processed.store(0, Ordering::Relaxed);

        let reader = ReaderStage::new(
            source,
            Arc::clone(&q1),
            self.cancel.clone(),
            reader_runs,
            cluster_size,
            source_len,
            Arc::clone(&bytes_processed),
        );

        let sampler_progress: Box<dyn ProgressSink> =
            std::mem::replace(&mut self.progress, Box::new(crate::collab::NullProgressSink));
        let (sampler_handle, sampler_stop) =
            Self::sample_progress(Arc::clone(&bytes_processed), self.cancel.clone(), sampler_progress);

        let (reader_handle, codec_handle, writer_handle) = if compression == CompressionFormat::None {
            let writer = WriterStage::new(
                sink,
                Arc::clone(&q1),
                self.cancel.clone(),
                writer_runs,
                cluster_size,
                Arc::clone(&bytes_processed),
            );
            let reader_handle = thread::spawn(move || reader.run());
            let writer_handle = thread::spawn(move || writer.run());
            (reader_handle, None, writer_handle)
        } else {
            let q2 = Arc::new(ChunkQueue::new(pool_size, chunk_capacity, &self.cancel));
            let codec: Box<dyn crate::codec::Codec> = if reader_has_runs {
                new_encoder(compression, level)
            } else {
                new_decoder(compression)
            };
            let codec_stage = CodecStage::new(codec, Arc::clone(&q1), Arc::clone(&q2), self.cancel.clone());
            let writer = WriterStage::new(
                sink,
                Arc::clone(&q2),
                self.cancel.clone(),
                writer_runs,
                cluster_size,
                Arc::clone(&bytes_processed),
            );
            let reader_handle = thread::spawn(move || reader.run());
            let codec_handle = thread::spawn(move || codec_stage.run());
            let writer_handle = thread::spawn(move || writer.run());
            (reader_handle, Some(codec_handle), writer_handle)
        };

        let reader_result = reader_handle.join().expect("reader thread panicked");
        let codec_result = codec_handle.map(|h| h.join().expect("codec thread panicked"));
        let writer_result = writer_handle.join().expect("writer thread panicked");

        sampler_stop.cancel();
        let progress = sampler_handle.join().expect("progress sampler panicked");
        self.progress = progress;

        // First-error-wins (§4.J, §7): reader, then codec, then writer. Each
        // stage's `run` already returns an owned `PipelineError`, so the
        // original variant (e.g. `PartMissing`) is propagated as-is instead
        // of being rebuilt into a generic I/O error.
        if reader_result.is_err() {
            self.cancel.cancel();
            return Err(reader_result.unwrap_err());
        }
        if let Some(Err(_)) = &codec_result {
            self.cancel.cancel();
            return Err(codec_result.unwrap().unwrap_err());
        }
        // Neither stage treats cancellation as an error internally (both
        // `ReaderStage::run` and `WriterStage::run` just stop early and
        // return `Ok`), so a cancelled session is detected here via the
        // flag itself rather than by inspecting `writer_result`.
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let (writer_crc, part_count) = writer_result?;
        let reader_crc = reader_result?;
        let writer_crc_for_restore = if reader_has_runs { None } else { Some(writer_crc) };
        Ok((reader_crc, writer_crc_for_restore, part_count))
    }
}

fn open_container_for_read(
    container_path: &Path,
    feedback: Box<dyn UserFeedback>,
) -> Result<(ContainerHeader, Option<AllocationMap>, ContainerReadStream)> {
    let mut file = File::open(container_path).map_err(|source| PipelineError::FileOpenError {
        path: container_path.to_path_buf(),
        source,
    })?;
    let header = ContainerHeader::read(&mut file)?;

    let alloc_map = if header.alloc_map_length > 0 {
        file.seek(SeekFrom::Start(header.alloc_map_offset))?;
        let mut buf = vec![0u8; header.alloc_map_length as usize];
        file.read_exact(&mut buf)?;
        let total_clusters =
            (header.volume_size + header.cluster_size as u64 - 1) / (header.cluster_size as u64).max(1);
        Some(AllocationMap::decode(&buf, total_clusters)?)
    } else {
        None
    };
    file.seek(SeekFrom::Start(header.data_offset))?;

    let boundary: Option<Box<dyn crate::container::file_stream::ReadBoundary>> = if header.part_count > 1
    {
        Some(Box::new(SplitReader::new(container_path.to_path_buf(), feedback)))
    } else {
        None
    };
    let stream = ContainerReadStream::new(file, header.part_count, boundary);
    Ok((header, alloc_map, stream))
}

/// Reports the restore target's current capacity, or `None` if it doesn't
/// exist yet (a fresh regular-file restore target). Block devices report
/// `st_size == 0` from `stat(2)`, so their capacity has to come from the
/// same geometry ioctl `BlockDeviceStream` uses, not `metadata().len()`.
fn probe_target_size(path: &Path, cluster_size: u32) -> Result<Option<u64>> {
    if is_block_device(path) {
        let dev = BlockDeviceStream::open_read(path, cluster_size)?;
        return Ok(Some(dev.size()));
    }
    match std::fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(PipelineError::DeviceOpenError {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(unix)]
fn is_block_device(path: &Path) -> bool {
    use std::os::unix::fs::FileTypeExt;
    std::fs::metadata(path)
        .map(|m| m.file_type().is_block_device())
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_block_device(_path: &Path) -> bool {
    false
}

fn open_restore_sink(path: &Path, cluster_size: u32) -> Result<WriteSink> {
    if is_block_device(path) {
        Ok(WriteSink::Device(BlockDeviceStream::open_write(
            path,
            cluster_size,
        )?))
    } else {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .open(path)
            .map_err(|source| PipelineError::FileOpenError {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(WriteSink::File {
            file,
            sparse_mode: true,
        })
    }
}

/// Convenience re-export for embedding callers that want a non-interactive
/// default `UserFeedback` without depending on `collab` directly.
pub use crate::collab::NoFeedback as DefaultFeedback;
