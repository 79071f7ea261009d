//! gzip codec stage: `flate2::write::GzEncoder`/`GzDecoder` (§4.F.1).
//!
//! Standard deflate with a gzip wrapper (window bits 15). `flate2` exposes
//! only a `Write`-sink interface, not a bounded-output buffer-to-buffer one,
//! so produced bytes are staged and drained into the caller's output slice
//! across calls.

use std::io::Write;

use flate2::write::{GzDecoder, GzEncoder};
use flate2::Compression;

use crate::codec::{Codec, ProcessOutcome, Staged};
use crate::config::CompressionFormat;
use crate::error::{PipelineError, Result};

fn comp_err(detail: impl ToString) -> PipelineError {
    PipelineError::CompressionError {
        format: CompressionFormat::Gzip,
        detail: detail.to_string(),
    }
}

fn decomp_err(detail: impl ToString) -> PipelineError {
    PipelineError::DecompressionError {
        format: CompressionFormat::Gzip,
        detail: detail.to_string(),
    }
}

pub struct GzipEncoder {
    enc: Option<GzEncoder<Vec<u8>>>,
    staged: Staged,
    finished: bool,
}

impl GzipEncoder {
    pub fn new(level: i32) -> Self {
        let level = level.clamp(1, 9) as u32;
        GzipEncoder {
            enc: Some(GzEncoder::new(Vec::new(), Compression::new(level))),
            staged: Staged::default(),
            finished: false,
        }
    }

    fn drain_sink(&mut self) {
        if let Some(enc) = self.enc.as_mut() {
            let buf = enc.get_mut();
            if !buf.is_empty() {
                self.staged.push(buf);
                buf.clear();
            }
        }
    }
}

impl Codec for GzipEncoder {
    fn process(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        finishing: bool,
    ) -> Result<ProcessOutcome> {
        let mut consumed = 0;
        if !input.is_empty() {
            let enc = self.enc.as_mut().ok_or_else(|| {
                comp_err("process called after stream end")
            })?;
            enc.write_all(input).map_err(comp_err)?;
            consumed = input.len();
            self.drain_sink();
        }
        if finishing && consumed == input.len() && !self.finished {
            if let Some(enc) = self.enc.take() {
                let tail = enc.finish().map_err(comp_err)?;
                self.staged.push(&tail);
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

pub struct GzipDecoder {
    dec: Option<GzDecoder<Vec<u8>>>,
    staged: Staged,
    finished: bool,
}

impl GzipDecoder {
    pub fn new() -> Self {
        GzipDecoder {
            dec: Some(GzDecoder::new(Vec::new())),
            staged: Staged::default(),
            finished: false,
        }
    }

    fn drain_sink(&mut self) {
        if let Some(dec) = self.dec.as_mut() {
            let buf = dec.get_mut();
            if !buf.is_empty() {
                self.staged.push(buf);
                buf.clear();
            }
        }
    }
}

impl Default for GzipDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for GzipDecoder {
    fn process(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        finishing: bool,
    ) -> Result<ProcessOutcome> {
        let mut consumed = 0;
        if !input.is_empty() {
            let dec = self
                .dec
                .as_mut()
                .ok_or_else(|| decomp_err("process called after stream end"))?;
            dec.write_all(input).map_err(decomp_err)?;
            consumed = input.len();
            self.drain_sink();
        }
        if finishing && consumed == input.len() && !self.finished {
            if let Some(dec) = self.dec.take() {
                let tail = dec.finish().map_err(decomp_err)?;
                self.staged.push(&tail);
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

#[cfg(test)]
mod tests {
    use super::*;

    fn run_full(codec: &mut dyn Codec, input: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut scratch = vec![0u8; 64];
        let mut pos = 0;
        loop {
            let finishing = true;
            let slice = &input[pos..];
            let outcome = codec.process(slice, &mut scratch, finishing).unwrap();
            pos += outcome.consumed;
            out.extend_from_slice(&scratch[..outcome.produced]);
            if outcome.stream_end {
                break;
            }
        }
        out
    }

    #[test]
    fn round_trip_small_payload() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(20);
        let mut enc = GzipEncoder::new(6);
        let compressed = run_full(&mut enc, &data);
        assert!(!compressed.is_empty());
        let mut dec = GzipDecoder::new();
        let decompressed = run_full(&mut dec, &compressed);
        assert_eq!(decompressed, data);
    }

    #[test]
    fn empty_input_round_trips() {
        let mut enc = GzipEncoder::new(6);
        let compressed = run_full(&mut enc, b"");
        let mut dec = GzipDecoder::new();
        let decompressed = run_full(&mut dec, &compressed);
        assert!(decompressed.is_empty());
    }
}
