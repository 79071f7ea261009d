//! bzip2 codec stage: `bzip2::write::BzEncoder`/`BzDecoder` (§4.F.1).
//!
//! Encode is pinned to level 9, matching the original implementation's
//! fixed `BZ2_bzCompressInit(&bzsStream, 9, 0, 0)` call (§2.2) — kept for
//! compatibility with existing containers, not because level is otherwise
//! configurable for this format.

use std::io::Write;

use bzip2::write::{BzDecoder, BzEncoder};
use bzip2::Compression;

use crate::codec::{Codec, ProcessOutcome, Staged};
use crate::config::{CompressionFormat, BZIP2_ENCODE_LEVEL};
use crate::error::{PipelineError, Result};

fn comp_err(detail: impl ToString) -> PipelineError {
    PipelineError::CompressionError {
        format: CompressionFormat::Bzip2,
        detail: detail.to_string(),
    }
}

fn decomp_err(detail: impl ToString) -> PipelineError {
    PipelineError::DecompressionError {
        format: CompressionFormat::Bzip2,
        detail: detail.to_string(),
    }
}

pub struct Bzip2Encoder {
    enc: Option<BzEncoder<Vec<u8>>>,
    staged: Staged,
    finished: bool,
}

impl Bzip2Encoder {
    pub fn new() -> Self {
        Bzip2Encoder {
            enc: Some(BzEncoder::new(Vec::new(), Compression::new(BZIP2_ENCODE_LEVEL))),
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

impl Default for Bzip2Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for Bzip2Encoder {
    fn process(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        finishing: bool,
    ) -> Result<ProcessOutcome> {
        let mut consumed = 0;
        if !input.is_empty() {
            let enc = self
                .enc
                .as_mut()
                .ok_or_else(|| comp_err("process called after stream end"))?;
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

pub struct Bzip2Decoder {
    dec: Option<BzDecoder<Vec<u8>>>,
    staged: Staged,
    finished: bool,
}

impl Bzip2Decoder {
    pub fn new() -> Self {
        Bzip2Decoder {
            dec: Some(BzDecoder::new(Vec::new())),
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

impl Default for Bzip2Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for Bzip2Decoder {
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
    fn round_trip_small_payload() {
        let data = b"sherbet sailboat syllabus".repeat(30);
        let mut enc = Bzip2Encoder::new();
        let compressed = run_full(&mut enc, &data);
        let mut dec = Bzip2Decoder::new();
        let decompressed = run_full(&mut dec, &compressed);
        assert_eq!(decompressed, data);
    }
}
