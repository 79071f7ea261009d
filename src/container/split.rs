//! Split manager: part naming and boundary callbacks for multi-part
//! containers (component I, §4.I).

use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use crate::collab::UserFeedback;
use crate::container::file_stream::{ReadBoundary, WriteBoundary};
use crate::container::part_path;
use crate::error::{PipelineError, Result};

/// Write-direction boundary: opens the next part at `base` with the
/// standard naming scheme.
pub struct SplitWriter {
    base: PathBuf,
}

impl SplitWriter {
    pub fn new(base: PathBuf) -> Self {
        SplitWriter { base }
    }
}

impl WriteBoundary for SplitWriter {
    fn next_part(&mut self, next_index: u32) -> Result<(File, PathBuf)> {
        let path = part_path(&self.base, next_index);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| PipelineError::FileOpenError {
                path: path.clone(),
                source,
            })?;
        Ok((file, path))
    }
}

/// Read-direction boundary: opens the next part by the standard naming
/// scheme, falling back to `UserFeedback::ask_missing_part` when it is
/// absent.
pub struct SplitReader {
    base: PathBuf,
    feedback: Box<dyn UserFeedback>,
}

impl SplitReader {
    pub fn new(base: PathBuf, feedback: Box<dyn UserFeedback>) -> Self {
        SplitReader { base, feedback }
    }
}

impl ReadBoundary for SplitReader {
    fn open_part(&mut self, index: u32) -> std::io::Result<File> {
        File::open(part_path(&self.base, index))
    }

    fn ask_substitute(&mut self, index: u32) -> Option<PathBuf> {
        let expected = part_path(&self.base, index);
        self.feedback.ask_missing_part(&expected, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::NoFeedback;
    use crate::container::file_stream::{ContainerReadStream, ContainerWriteStream};
    use tempfile::tempdir;

    #[test]
    fn split_writer_round_trips_across_two_parts() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("image.odin");
        let first = File::create(&base).unwrap();
        let mut stream = ContainerWriteStream::new(
            first,
            32,
            Some(Box::new(SplitWriter::new(base.clone()))),
        );
        stream.write_all(&[1u8; 20]).unwrap();
        stream.write_all(&[2u8; 20]).unwrap();
        assert_eq!(stream.part_count(), 2);
        assert!(dir.path().join("image0001.odin").exists());
    }

    #[test]
    fn split_reader_reports_part_missing_with_no_feedback() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("image.odin");
        std::fs::write(&base, b"abc").unwrap();
        let f0 = File::open(&base).unwrap();
        let mut stream = ContainerReadStream::new(
            f0,
            2,
            Some(Box::new(SplitReader::new(base, Box::new(NoFeedback)))),
        );
        let mut buf = [0u8; 8];
        let n = stream.read(&mut buf).unwrap();
        assert_eq!(n, 3);
        let err = stream.read(&mut buf).unwrap_err();
        assert!(matches!(err, PipelineError::PartMissing { index: 1 }));
    }
}
