//! Drives one streaming codec between two chunk queues (§4.F, the "F" box
//! in the backup/restore data-flow diagram, §2).
//!
//! Grounded on the same producer/consumer shape as `ReaderStage`/
//! `WriterStage`: a dedicated thread pulls filled chunks from its input
//! queue, feeds their bytes through [`Codec::process`], and pushes filled
//! chunks to its output queue, honoring cancellation at every blocking
//! point.

use std::sync::Arc;

use crate::chunk::{CancelToken, ChunkQueue};
use crate::codec::Codec;
use crate::error::Result;

pub struct CodecStage {
    codec: Box<dyn Codec>,
    input: Arc<ChunkQueue>,
    output: Arc<ChunkQueue>,
    cancel: CancelToken,
}

impl CodecStage {
    pub fn new(
        codec: Box<dyn Codec>,
        input: Arc<ChunkQueue>,
        output: Arc<ChunkQueue>,
        cancel: CancelToken,
    ) -> Self {
        CodecStage {
            codec,
            input,
            output,
            cancel,
        }
    }

    pub fn run(mut self) -> Result<()> {
        let mut pending: Vec<u8> = Vec::new();
        let mut input_eos = false;
        let mut codec_done = false;

        while !codec_done {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            let Some(mut out_chunk) = self.output.take_empty() else {
                return Ok(());
            };

            let mut out_pos = 0usize;
            while out_pos < out_chunk.capacity() && !codec_done {
                if self.cancel.is_cancelled() {
                    return Ok(());
                }
                if pending.is_empty() && !input_eos {
                    let Some(chunk) = self.input.take_filled() else {
                        return Ok(());
                    };
                    input_eos = chunk.eos();
                    pending = chunk.data().to_vec();
                    self.input.return_empty(chunk);
                }

                let finishing = input_eos && pending.is_empty();
                let outcome = self.codec.process(
                    &pending,
                    &mut out_chunk.as_mut_slice()[out_pos..],
                    finishing,
                )?;
                pending.drain(..outcome.consumed);
                out_pos += outcome.produced;
                if outcome.stream_end {
                    codec_done = true;
                }
                if outcome.consumed == 0 && outcome.produced == 0 && !finishing {
                    // Codec needs a fresh input chunk; pending is already
                    // empty at this point, so the loop head will fetch one.
                    if !pending.is_empty() {
                        // Defensive: a codec that makes no progress on
                        // non-empty input would spin forever. Treat as
                        // "wait for more output room" and break out.
                        break;
                    }
                }
            }

            out_chunk.set_len(out_pos);
            if codec_done {
                out_chunk.set_eos(true);
            }
            self.output.return_filled(out_chunk);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{new_decoder, new_encoder};
    use crate::config::CompressionFormat;
    use std::thread;

    fn make_queue(pool: usize, cap: usize, cancel: &CancelToken) -> Arc<ChunkQueue> {
        Arc::new(ChunkQueue::new(pool, cap, cancel))
    }

    fn feed(queue: &ChunkQueue, data: &[u8], piece: usize) {
        for part in data.chunks(piece.max(1)) {
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

    fn drain(queue: &ChunkQueue) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let chunk = queue.take_filled().unwrap();
            out.extend_from_slice(chunk.data());
            let eos = chunk.eos();
            queue.return_empty(chunk);
            if eos {
                break;
            }
        }
        out
    }

    #[test]
    fn encode_then_decode_round_trips_through_two_stages() {
        let cancel = CancelToken::new();
        let q_in = make_queue(4, 256, &cancel);
        let q_mid = make_queue(4, 256, &cancel);
        let q_out = make_queue(4, 256, &cancel);

        let enc_stage = CodecStage::new(
            new_encoder(CompressionFormat::Zstd, 3),
            Arc::clone(&q_in),
            Arc::clone(&q_mid),
            cancel.clone(),
        );
        let dec_stage = CodecStage::new(
            new_decoder(CompressionFormat::Zstd),
            Arc::clone(&q_mid),
            Arc::clone(&q_out),
            cancel.clone(),
        );

        let enc_handle = thread::spawn(move || enc_stage.run());
        let dec_handle = thread::spawn(move || dec_stage.run());

        let data = b"pipeline data pipeline data pipeline data".repeat(100);
        feed(&q_in, &data, 97);
        let result = drain(&q_out);

        enc_handle.join().unwrap().unwrap();
        dec_handle.join().unwrap().unwrap();
        assert_eq!(result, data);
    }
}
