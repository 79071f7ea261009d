//! Sequential, part-aware reading and writing of a container (component C).
//!
//! Grounded on the teacher's `io::file_io::DstFile`: a thin `Write`/`Read`
//! wrapper that hides sentinel/rollover decisions behind ordinary
//! `write_all`/`read` calls. Here the thing being hidden is the part
//! boundary rather than a stdout/devnull sentinel.

use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;

use crate::error::{PipelineError, Result};

/// Supplies the next part's file handle when a write would cross a part
/// boundary (§4.C, §4.I).
pub trait WriteBoundary: Send {
    fn next_part(&mut self, next_index: u32) -> Result<(File, PathBuf)>;
}

/// Supplies the next part's file handle when a sequential read crosses a
/// part boundary, with a fallback for a missing part (§4.C, §4.I).
pub trait ReadBoundary: Send {
    fn open_part(&mut self, index: u32) -> std::io::Result<File>;
    /// Called when `open_part` fails; returns a substitute path to retry,
    /// or `None` to give up (surfaced as `PartMissing`).
    fn ask_substitute(&mut self, index: u32) -> Option<PathBuf>;
}

/// Sequential append-only writer across one or more container parts.
pub struct ContainerWriteStream {
    current: File,
    current_index: u32,
    bytes_in_part: u64,
    part_size: u64,
    boundary: Option<Box<dyn WriteBoundary>>,
}

impl ContainerWriteStream {
    /// `part_size == 0` means unsplit: the boundary is never consulted.
    pub fn new(first_part: File, part_size: u64, boundary: Option<Box<dyn WriteBoundary>>) -> Self {
        ContainerWriteStream {
            current: first_part,
            current_index: 0,
            bytes_in_part: 0,
            part_size,
            boundary,
        }
    }

    pub fn current_index(&self) -> u32 {
        self.current_index
    }

    pub fn part_count(&self) -> u32 {
        self.current_index + 1
    }

    pub fn current_file_mut(&mut self) -> &mut File {
        &mut self.current
    }

    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        if self.part_size > 0 {
            let would_exceed = self.bytes_in_part + buf.len() as u64 > self.part_size;
            if would_exceed && self.bytes_in_part == 0 {
                // Even an empty part can't hold this write (§4.I edge case).
                return Err(PipelineError::ChunkSizeTooSmall);
            }
            if would_exceed {
                let boundary = self
                    .boundary
                    .as_mut()
                    .expect("split_size > 0 requires a write boundary callback");
                let (file, _path) = boundary.next_part(self.current_index + 1)?;
                self.current = file;
                self.current_index += 1;
                self.bytes_in_part = 0;
            }
        }
        self.current.write_all(buf)?;
        self.bytes_in_part += buf.len() as u64;
        Ok(())
    }
}

/// Sequential reader across one or more container parts.
pub struct ContainerReadStream {
    current: File,
    current_index: u32,
    part_count: u32,
    boundary: Option<Box<dyn ReadBoundary>>,
}

impl ContainerReadStream {
    /// `part_count` is the total number of parts the container header
    /// declares; the boundary is never consulted once the last part is
    /// reached, so a split reader can't run one part past the real end.
    pub fn new(first_part: File, part_count: u32, boundary: Option<Box<dyn ReadBoundary>>) -> Self {
        ContainerReadStream {
            current: first_part,
            current_index: 0,
            part_count: part_count.max(1),
            boundary,
        }
    }

    pub fn current_index(&self) -> u32 {
        self.current_index
    }

    /// Reads up to `buf.len()` bytes, rolling to the next part transparently
    /// on EOF of the current part. Returns `0` only when there is truly no
    /// more data (the last part is exhausted or no boundary is configured).
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let n = self.current.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            let next_index = self.current_index + 1;
            if next_index >= self.part_count {
                return Ok(0);
            }
            let Some(boundary) = self.boundary.as_mut() else {
                return Ok(0);
            };
            match boundary.open_part(next_index) {
                Ok(file) => {
                    self.current = file;
                    self.current_index = next_index;
                }
                Err(_) => match boundary.ask_substitute(next_index) {
                    Some(path) => {
                        let file =
                            File::open(&path).map_err(|source| PipelineError::FileOpenError {
                                path,
                                source,
                            })?;
                        self.current = file;
                        self.current_index = next_index;
                    }
                    None => {
                        return Err(PipelineError::PartMissing { index: next_index });
                    }
                },
            }
        }
    }
}
