//! LZ4 frame codec stage: the `lz4` crate's frame `Encoder`/`Decoder`
//! (§4.F.1), used for both the fast (`lz4`) and high-compression
//! (`lz4hc`) header variants via the builder's `.level(n)`.
//!
//! Encoding is `Write`-based like gzip/bzip2 and streams incrementally.
//! Decoding is `Read`-based: the crate parses the frame header eagerly
//! inside `Decoder::new`, which doesn't compose with a bytes-arrive-over-
//! time push model. Rather than guess at the FFI decoder's short-read
//! behavior, the decoder buffers the whole compressed frame and decodes it
//! in one pass at `finishing`, then drains the result through the normal
//! bounded-output staging path — encode stays fully streaming, decode
//! trades memory for correctness at the frame boundary (see DESIGN.md).

use std::io::{Cursor, Read, Write};

use lz4::{Decoder, EncoderBuilder};

use crate::codec::{Codec, ProcessOutcome, Staged};
use crate::config::CompressionFormat;
use crate::error::{PipelineError, Result};

const FAST_LEVEL: u32 = 1;
const HC_LEVEL: u32 = 9;

fn comp_err(detail: impl ToString) -> PipelineError {
    PipelineError::CompressionError {
        format: CompressionFormat::Lz4,
        detail: detail.to_string(),
    }
}

fn decomp_err(detail: impl ToString) -> PipelineError {
    PipelineError::DecompressionError {
        format: CompressionFormat::Lz4,
        detail: detail.to_string(),
    }
}

pub struct Lz4Encoder {
    enc: Option<lz4::Encoder<Vec<u8>>>,
    staged: Staged,
    finished: bool,
}

impl Lz4Encoder {
    pub fn new(high_compression: bool) -> Self {
        let level = if high_compression { HC_LEVEL } else { FAST_LEVEL };
        let enc = EncoderBuilder::new()
            .level(level)
            .block_mode(lz4::BlockMode::Independent)
            .block_size(lz4::BlockSize::Max64KB)
            .checksum(lz4::ContentChecksum::ChecksumEnabled)
            .auto_flush(true)
            .build(Vec::new())
            .expect("in-memory lz4 encoder construction cannot fail");
        Lz4Encoder {
            enc: Some(enc),
            staged: Staged::default(),
            finished: false,
        }
    }

    fn drain_sink(&mut self) {
        if let Some(enc) = self.enc.as_mut() {
            let buf = enc.writer_mut();
            if !buf.is_empty() {
                self.staged.push(buf);
                buf.clear();
            }
        }
    }
}

impl Codec for Lz4Encoder {
    fn process(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        finishing: bool,
    ) -> Result<ProcessOutcome> {
        let mut consumed = 0;
        // Input is chunked into 64 KiB pieces so the per-call compressed
        // output stays bounded by compressBound(64 KiB) (§4.F).
        const PIECE: usize = 64 * 1024;
        if !input.is_empty() {
            let piece = &input[..input.len().min(PIECE)];
            let enc = self
                .enc
                .as_mut()
                .ok_or_else(|| comp_err("process called after stream end"))?;
            enc.write_all(piece).map_err(comp_err)?;
            consumed = piece.len();
            self.drain_sink();
        }
        if finishing && consumed == input.len() && !self.finished {
            if let Some(enc) = self.enc.take() {
                let (buf, result) = enc.finish();
                result.map_err(comp_err)?;
                self.staged.push(&buf);
            }
            self.finished = true;
        }
        let produced = self.staged.drain_into(output);
        Ok(ProcessOutcome {
            consumed,
            produced,
            stream_end: self.finished && self.staged.is_empty(),
        })
    }
}

#[derive(Default)]
pub struct Lz4Decoder {
    accumulated: Vec<u8>,
    staged: Staged,
    decoded: bool,
}

impl Lz4Decoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Codec for Lz4Decoder {
    fn process(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        finishing: bool,
    ) -> Result<ProcessOutcome> {
        self.accumulated.extend_from_slice(input);
        let consumed = input.len();

        if finishing && !self.decoded {
            let cursor = Cursor::new(std::mem::take(&mut self.accumulated));
            let mut decoder = Decoder::new(cursor).map_err(decomp_err)?;
            let mut out = Vec::new();
            decoder.read_to_end(&mut out).map_err(decomp_err)?;
            self.staged.push(&out);
            self.decoded = true;
        }

        let produced = self.staged.drain_into(output);
        Ok(ProcessOutcome {
            consumed,
            produced,
            stream_end: self.decoded && self.staged.is_empty(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_full(codec: &mut dyn Codec, input: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut scratch = vec![0u8; 256];
        let mut pos = 0;
        loop {
            let slice = &input[pos..];
            let outcome = codec.process(slice, &mut scratch, true).unwrap();
            pos += outcome.consumed;
            out.extend_from_slice(&scratch[..outcome.produced]);
            if outcome.stream_end {
                break;
            }
        }
        out
    }

    #[test]
    fn fast_round_trip() {
        let data = b"abcdefghij".repeat(500);
        let mut enc = Lz4Encoder::new(false);
        let compressed = run_full(&mut enc, &data);
        let mut dec = Lz4Decoder::new();
        let decompressed = run_full(&mut dec, &compressed);
        assert_eq!(decompressed, data);
    }

    #[test]
    fn hc_round_trip() {
        let data = b"zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz".repeat(200);
        let mut enc = Lz4Encoder::new(true);
        let compressed = run_full(&mut enc, &data);
        let mut dec = Lz4Decoder::new();
        let decompressed = run_full(&mut dec, &compressed);
        assert_eq!(decompressed, data);
    }
}
