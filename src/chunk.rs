//! Chunk buffers and the bounded chunk queue (component A).
//!
//! Grounded on the teacher's `threadpool::TPool`, which uses a
//! `crossbeam_channel::bounded` channel as a semaphore of job slots rather
//! than a `Mutex`+`Condvar` pair. The same trick gives us the bounded pool
//! here: `empty` and `filled` are each a `bounded` channel of `Chunk`
//! values, and the pool-size invariant (§3 "sum of buffers ... equals N")
//! falls out of the channel capacities by construction.
//!
//! Cancellation poisons both queues by disconnecting a shared zero-capacity
//! `cancel` channel (SPEC_FULL.md §9): once its sole sender is dropped,
//! every current and future `recv()` on a clone of its receiver returns
//! immediately, so `crossbeam_channel::select!` between the data channel and
//! the cancel channel wakes any blocked waiter without a timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, select, Receiver, Sender};

/// A fixed-capacity byte buffer passed between pipeline stages by value.
///
/// Carries no payload metadata beyond its logical length and end-of-stream
/// flag (§3 "Chunk").
pub struct Chunk {
    buf: Vec<u8>,
    len: usize,
    eos: bool,
}

impl Chunk {
    pub fn with_capacity(capacity: usize) -> Self {
        Chunk {
            buf: vec![0u8; capacity],
            len: 0,
            eos: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn eos(&self) -> bool {
        self.eos
    }

    pub fn set_eos(&mut self, eos: bool) {
        self.eos = eos;
    }

    /// The valid payload, `buf[..len]`.
    pub fn data(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// The full backing buffer, for a producer to fill before calling
    /// [`Chunk::set_len`].
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Declares how many bytes of `as_mut_slice()` are valid payload.
    ///
    /// Panics if `len` exceeds capacity — a stage bug, not a runtime
    /// condition callers should handle.
    pub fn set_len(&mut self, len: usize) {
        assert!(len <= self.capacity(), "chunk length exceeds capacity");
        self.len = len;
    }

    fn reset(&mut self) {
        self.len = 0;
        self.eos = false;
    }
}

/// Shared cancellation signal for one pipeline session.
///
/// `cancel()` is idempotent and may be called from any thread, including
/// one that does not own a [`ChunkQueue`] (e.g. the coordinator reacting to
/// an external `cancel()` call, §4.J).
#[derive(Clone)]
pub struct CancelToken {
    sender: Arc<Mutex<Option<Sender<()>>>>,
    receiver: Receiver<()>,
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        CancelToken {
            sender: Arc::new(Mutex::new(Some(tx))),
            receiver: rx,
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Poisons every queue built from this token. Safe to call more than
    /// once or concurrently with itself.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        // Dropping the sender disconnects the channel; every receiver clone
        // now reports `Err` on `recv()` instead of blocking.
        self.sender.lock().unwrap().take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn receiver(&self) -> Receiver<()> {
        self.receiver.clone()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded producer/consumer hand-off of [`Chunk`]s between two stages
/// (§4.A).
///
/// One producer thread calls `take_empty`/`return_filled`; one consumer
/// thread calls `take_filled`/`return_empty`. The queue tolerates more than
/// one thread on either side (§4.A "the contract permits multiple
/// consumers"), but the pipeline coordinator never constructs it that way.
pub struct ChunkQueue {
    empty_tx: Sender<Chunk>,
    empty_rx: Receiver<Chunk>,
    filled_tx: Sender<Chunk>,
    filled_rx: Receiver<Chunk>,
    cancel: Receiver<()>,
}

impl ChunkQueue {
    /// Builds a queue with `pool_size` pre-allocated chunks of
    /// `chunk_capacity` bytes each, all starting on the empty side.
    pub fn new(pool_size: usize, chunk_capacity: usize, cancel: &CancelToken) -> Self {
        let (empty_tx, empty_rx) = bounded(pool_size);
        let (filled_tx, filled_rx) = bounded(pool_size);
        for _ in 0..pool_size {
            empty_tx
                .send(Chunk::with_capacity(chunk_capacity))
                .expect("freshly created channel cannot be disconnected");
        }
        ChunkQueue {
            empty_tx,
            empty_rx,
            filled_tx,
            filled_rx,
            cancel: cancel.receiver(),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.empty_tx.capacity().unwrap_or(0)
    }

    /// Blocks until an empty chunk is available, or the queue is poisoned
    /// (`None`).
    pub fn take_empty(&self) -> Option<Chunk> {
        select! {
            recv(self.empty_rx) -> msg => msg.ok(),
            recv(self.cancel) -> _ => None,
        }
    }

    /// Hands a filled chunk downstream. Never blocks: the filled side has
    /// the same capacity as the pool, and a producer only ever holds one
    /// chunk at a time.
    pub fn return_filled(&self, chunk: Chunk) {
        let _ = self.filled_tx.send(chunk);
    }

    /// Blocks until a filled chunk is available, or the queue is poisoned
    /// (`None`).
    pub fn take_filled(&self) -> Option<Chunk> {
        select! {
            recv(self.filled_rx) -> msg => msg.ok(),
            recv(self.cancel) -> _ => None,
        }
    }

    /// Returns a chunk to the empty side after resetting its length/EOS.
    pub fn return_empty(&self, mut chunk: Chunk) {
        chunk.reset();
        let _ = self.empty_tx.send(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn chunk_len_and_eos() {
        let mut c = Chunk::with_capacity(16);
        assert_eq!(c.capacity(), 16);
        assert!(c.is_empty());
        c.as_mut_slice()[..4].copy_from_slice(b"abcd");
        c.set_len(4);
        assert_eq!(c.data(), b"abcd");
        c.set_eos(true);
        assert!(c.eos());
    }

    #[test]
    #[should_panic]
    fn chunk_set_len_over_capacity_panics() {
        let mut c = Chunk::with_capacity(4);
        c.set_len(5);
    }

    #[test]
    fn pool_conservation_round_trip() {
        let cancel = CancelToken::new();
        let q = ChunkQueue::new(4, 64, &cancel);
        let mut held = Vec::new();
        for _ in 0..4 {
            held.push(q.take_empty().expect("not cancelled"));
        }
        // Pool exhausted: a fifth take must not be satisfiable without a
        // return. We verify this without blocking forever by using a
        // background thread race against a short sleep.
        let q = Arc::new(q);
        let q2 = Arc::clone(&q);
        let (done_tx, done_rx) = bounded::<()>(1);
        thread::spawn(move || {
            let _ = q2.take_empty();
            let _ = done_tx.send(());
        });
        assert!(done_rx.recv_timeout(Duration::from_millis(50)).is_err());
        q.return_empty(held.pop().unwrap());
        assert!(done_rx.recv_timeout(Duration::from_millis(500)).is_ok());
    }

    #[test]
    fn cancel_unblocks_pending_take() {
        let cancel = CancelToken::new();
        let q = Arc::new(ChunkQueue::new(1, 16, &cancel));
        // Drain the sole chunk so the next take_empty would otherwise block.
        let _held = q.take_empty().unwrap();
        let q2 = Arc::clone(&q);
        let handle = thread::spawn(move || q2.take_empty());
        thread::sleep(Duration::from_millis(20));
        cancel.cancel();
        assert!(handle.join().unwrap().is_none());
    }

    #[test]
    fn cancel_makes_future_takes_return_none_immediately() {
        let cancel = CancelToken::new();
        let q = ChunkQueue::new(2, 16, &cancel);
        cancel.cancel();
        assert!(q.take_empty().is_none());
        assert!(q.take_filled().is_none());
    }

    #[test]
    fn filled_and_empty_round_trip_preserves_payload() {
        let cancel = CancelToken::new();
        let q = ChunkQueue::new(2, 8, &cancel);
        let mut c = q.take_empty().unwrap();
        c.as_mut_slice()[..3].copy_from_slice(b"xyz");
        c.set_len(3);
        q.return_filled(c);
        let c2 = q.take_filled().unwrap();
        assert_eq!(c2.data(), b"xyz");
        q.return_empty(c2);
        let c3 = q.take_empty().unwrap();
        assert_eq!(c3.len(), 0);
        assert!(!c3.eos());
    }
}
