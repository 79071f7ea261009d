//! Sparse-hole writing for the restore writer (§4.H, "ADDED").
//!
//! When the writer's sink is a regular file rather than a raw device, runs
//! of zero bytes don't need to be physically written: seeking past them and
//! writing only the non-zero remainder lets the filesystem represent the
//! gap as a hole. The scan is word-at-a-time rather than byte-at-a-time so
//! it doesn't cost more than the write it replaces.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::mem;

use crate::error::Result;

const ONE_GB: u64 = 1 << 30;
const WORD: usize = mem::size_of::<usize>();

/// Granularity of the zero-run scan; also the unit in which a segment is
/// decided to be "all zero" or "has data".
pub const SPARSE_SEGMENT_SIZE: usize = 32 * 1024;

/// Writes `buf` to `file`, punching holes for runs of zero bytes when
/// `sparse_mode` is set. Returns the updated count of bytes skipped but not
/// yet materialized — pass it back on the next call and finally to
/// [`fwrite_sparse_end`].
#[cfg(unix)]
pub fn fwrite_sparse(
    file: &mut File,
    buf: &[u8],
    stored_skips: u64,
    sparse_mode: bool,
) -> Result<u64> {
    if !sparse_mode {
        file.write_all(buf)?;
        return Ok(0);
    }

    let mut stored_skips = stored_skips;
    if stored_skips > ONE_GB {
        file.seek(SeekFrom::Current(ONE_GB as i64))?;
        stored_skips -= ONE_GB;
    }

    let seg_size_words = (SPARSE_SEGMENT_SIZE / WORD).max(1);
    let aligned_len = buf.len() / WORD;
    let mut buf_remaining = aligned_len;
    let mut buf_pos = 0usize;

    while buf_pos < aligned_len * WORD {
        let seg_words = seg_size_words.min(buf_remaining);
        buf_remaining -= seg_words;

        let mut nb_zeros = 0usize;
        for i in 0..seg_words {
            let start = buf_pos + i * WORD;
            let word = usize::from_ne_bytes(buf[start..start + WORD].try_into().unwrap());
            if word != 0 {
                break;
            }
            nb_zeros += 1;
        }
        stored_skips += (nb_zeros * WORD) as u64;

        if nb_zeros != seg_words {
            file.seek(SeekFrom::Current(stored_skips as i64))?;
            stored_skips = 0;
            let write_start = buf_pos + nb_zeros * WORD;
            let write_len = (seg_words - nb_zeros) * WORD;
            file.write_all(&buf[write_start..write_start + write_len])?;
        }

        buf_pos += seg_words * WORD;
    }

    let rest = &buf[aligned_len * WORD..];
    if !rest.is_empty() {
        let nb_zero_bytes = rest.iter().take_while(|&&b| b == 0).count();
        stored_skips += nb_zero_bytes as u64;
        if nb_zero_bytes < rest.len() {
            file.seek(SeekFrom::Current(stored_skips as i64))?;
            stored_skips = 0;
            file.write_all(&rest[nb_zero_bytes..])?;
        }
    }

    Ok(stored_skips)
}

#[cfg(not(unix))]
pub fn fwrite_sparse(
    file: &mut File,
    buf: &[u8],
    _stored_skips: u64,
    _sparse_mode: bool,
) -> Result<u64> {
    file.write_all(buf)?;
    Ok(0)
}

/// Finalizes a sparse-write sequence by materializing the trailing hole, if
/// any, so the file's logical length is correct. Must be called exactly
/// once after the last `fwrite_sparse` call for a given destination.
pub fn fwrite_sparse_end(file: &mut File, stored_skips: u64) -> Result<()> {
    if stored_skips > 0 {
        file.seek(SeekFrom::Current((stored_skips - 1) as i64))?;
        file.write_all(&[0u8])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn plain_data_has_no_skips() {
        let mut f = tempfile::tempfile().unwrap();
        let data: Vec<u8> = (1u8..=16).collect();
        let skips = fwrite_sparse(&mut f, &data, 0, true).unwrap();
        assert_eq!(skips, 0);
        f.seek(SeekFrom::Start(0)).unwrap();
        let mut out = vec![0u8; 16];
        f.read_exact(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn all_zero_buffer_is_fully_skipped() {
        let mut f = tempfile::tempfile().unwrap();
        let zeros = vec![0u8; 64];
        let skips = fwrite_sparse(&mut f, &zeros, 0, true).unwrap();
        assert_eq!(skips, 64);
        assert_eq!(f.seek(SeekFrom::Current(0)).unwrap(), 0);
    }

    #[test]
    fn mixed_content_round_trips() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&[0xABu8; 8]);
        buf.extend_from_slice(&[0u8; 16]);
        buf.extend_from_slice(&[0xCDu8; 8]);

        let mut f = tempfile::tempfile().unwrap();
        let skips = fwrite_sparse(&mut f, &buf, 0, true).unwrap();
        fwrite_sparse_end(&mut f, skips).unwrap();

        f.seek(SeekFrom::Start(0)).unwrap();
        let mut out = vec![0u8; buf.len()];
        f.read_exact(&mut out).unwrap();
        assert_eq!(out, buf);
    }

    #[test]
    fn sparse_mode_off_writes_everything_plainly() {
        let mut f = tempfile::tempfile().unwrap();
        let zeros = vec![0u8; 32];
        let skips = fwrite_sparse(&mut f, &zeros, 0, false).unwrap();
        assert_eq!(skips, 0);
        assert_eq!(f.seek(SeekFrom::End(0)).unwrap(), 32);
    }
}
