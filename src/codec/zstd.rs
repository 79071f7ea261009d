//! zstd codec stage: `zstd::stream::raw::Encoder`/`Decoder` (§4.F.1).
//!
//! Unlike the `Write`-based adapters used for gzip/bzip2/lz4, `zstd`'s raw
//! module is genuinely buffer-to-buffer (`Operation::run` over `InBuffer`/
//! `OutBuffer`), so no staging area is needed here — every byte `run`
//! reports as produced already lives in the caller's `output` slice.

use zstd::stream::raw::{Decoder as RawDecoder, Encoder as RawEncoder, InBuffer, Operation, OutBuffer};

use crate::codec::{Codec, ProcessOutcome};
use crate::config::CompressionFormat;
use crate::error::{PipelineError, Result};

fn comp_err(detail: impl ToString) -> PipelineError {
    PipelineError::CompressionError {
        format: CompressionFormat::Zstd,
        detail: detail.to_string(),
    }
}

fn decomp_err(detail: impl ToString) -> PipelineError {
    PipelineError::DecompressionError {
        format: CompressionFormat::Zstd,
        detail: detail.to_string(),
    }
}

pub struct ZstdEncoder {
    inner: RawEncoder<'static>,
    finished: bool,
}

impl ZstdEncoder {
    pub fn new(level: i32) -> Self {
        let level = level.clamp(1, 22);
        ZstdEncoder {
            inner: RawEncoder::new(level).expect("zstd encoder context init"),
            finished: false,
        }
    }
}

impl Codec for ZstdEncoder {
    fn process(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        finishing: bool,
    ) -> Result<ProcessOutcome> {
        if self.finished {
            return Ok(ProcessOutcome {
                consumed: 0,
                produced: 0,
                stream_end: true,
            });
        }

        let mut in_buf = InBuffer::around(input);
        let mut out_buf = OutBuffer::around(output);
        self.inner.run(&mut in_buf, &mut out_buf).map_err(comp_err)?;
        let consumed = in_buf.pos();
        let mut produced = out_buf.pos();

        if finishing && consumed == input.len() {
            let mut tail = OutBuffer::around(&mut output[produced..]);
            let remaining = self.inner.finish(&mut tail, true).map_err(comp_err)?;
            produced += tail.pos();
            if remaining == 0 {
                self.finished = true;
            }
        }

        Ok(ProcessOutcome {
            consumed,
            produced,
            stream_end: self.finished,
        })
    }
}

pub struct ZstdDecoder {
    inner: RawDecoder<'static>,
    finished: bool,
}

impl ZstdDecoder {
    pub fn new() -> Self {
        ZstdDecoder {
            inner: RawDecoder::new().expect("zstd decoder context init"),
            finished: false,
        }
    }
}

impl Default for ZstdDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for ZstdDecoder {
    fn process(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        _finishing: bool,
    ) -> Result<ProcessOutcome> {
        if self.finished {
            return Ok(ProcessOutcome {
                consumed: 0,
                produced: 0,
                stream_end: true,
            });
        }

        let mut in_buf = InBuffer::around(input);
        let mut out_buf = OutBuffer::around(output);
        let remaining = self.inner.run(&mut in_buf, &mut out_buf).map_err(decomp_err)?;
        if remaining == 0 {
            self.finished = true;
        }

        Ok(ProcessOutcome {
            consumed: in_buf.pos(),
            produced: out_buf.pos(),
            stream_end: self.finished,
        })
    }
}
