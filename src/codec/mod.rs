//! Streaming compression codec stages (component F).
//!
//! Every format shares one contract (§4.F): `process(input, output,
//! finishing)` consumes as much of `input` as it can in one call, produces
//! at most `output.len()` bytes, and reports whether the underlying stream
//! has truly ended (distinct from `finishing`, which only means "no more
//! input is coming" — a codec may still have buffered output to drain).
//!
//! See `SPEC_FULL.md` §4.F.1 for why this binds to `flate2`/`bzip2`/`zstd`/
//! `lz4` rather than reimplementing any of them.

pub mod bzip2;
pub mod gzip;
pub mod lz4frame;
pub mod zstd;

use crate::config::CompressionFormat;
use crate::error::Result;

pub struct ProcessOutcome {
    pub consumed: usize,
    pub produced: usize,
    pub stream_end: bool,
}

/// One direction (encode or decode) of one format's streaming state.
pub trait Codec: Send {
    fn process(&mut self, input: &[u8], output: &mut [u8], finishing: bool)
        -> Result<ProcessOutcome>;
}

pub fn new_encoder(format: CompressionFormat, level: i32) -> Box<dyn Codec> {
    match format {
        CompressionFormat::None => Box::new(PassThrough::default()),
        CompressionFormat::Gzip => Box::new(gzip::GzipEncoder::new(level)),
        CompressionFormat::Bzip2 => Box::new(bzip2::Bzip2Encoder::new()),
        CompressionFormat::Lz4 => Box::new(lz4frame::Lz4Encoder::new(false)),
        CompressionFormat::Lz4Hc => Box::new(lz4frame::Lz4Encoder::new(true)),
        CompressionFormat::Zstd => Box::new(zstd::ZstdEncoder::new(level)),
    }
}

pub fn new_decoder(format: CompressionFormat) -> Box<dyn Codec> {
    match format {
        CompressionFormat::None => Box::new(PassThrough::default()),
        CompressionFormat::Gzip => Box::new(gzip::GzipDecoder::new()),
        CompressionFormat::Bzip2 => Box::new(bzip2::Bzip2Decoder::new()),
        CompressionFormat::Lz4 | CompressionFormat::Lz4Hc => Box::new(lz4frame::Lz4Decoder::new()),
        CompressionFormat::Zstd => Box::new(zstd::ZstdDecoder::new()),
    }
}

/// Identity codec for `CompressionFormat::None`: copies input straight to
/// output, one buffer at a time.
#[derive(Default)]
struct PassThrough;

impl Codec for PassThrough {
    fn process(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        finishing: bool,
    ) -> Result<ProcessOutcome> {
        let n = input.len().min(output.len());
        output[..n].copy_from_slice(&input[..n]);
        Ok(ProcessOutcome {
            consumed: n,
            produced: n,
            stream_end: finishing && n == input.len(),
        })
    }
}

/// Byte staging area for the `Write`-based adapters (gzip/bzip2/lz4): bytes
/// accumulate here faster than the bounded per-call `output` slice can
/// drain them, since the underlying encoders don't respect an output-size
/// bound themselves.
#[derive(Default)]
pub(crate) struct Staged {
    buf: Vec<u8>,
    cursor: usize,
}

impl Staged {
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn drain_into(&mut self, output: &mut [u8]) -> usize {
        let available = self.buf.len() - self.cursor;
        let n = available.min(output.len());
        output[..n].copy_from_slice(&self.buf[self.cursor..self.cursor + n]);
        self.cursor += n;
        if self.cursor == self.buf.len() {
            self.buf.clear();
            self.cursor = 0;
        } else if self.cursor > 64 * 1024 {
            self.buf.drain(0..self.cursor);
            self.cursor = 0;
        }
        n
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == self.buf.len()
    }
}
