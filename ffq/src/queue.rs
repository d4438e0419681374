use std::alloc::Layout;
use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicI64, Ordering};

use crossbeam_utils::CachePadded;
use log::{trace, warn};

use crate::backoff::Backoff;
use crate::cell::{Cell, EMPTY_CELL};
use crate::error::FfqError;
use crate::Payload;

/// Smallest legal ring.
pub const MIN_CAPACITY: usize = 2;

/// Producer-private enqueue cursor.
///
/// Only the producer process advances it; it is never required to be
/// globally consistent. The queue region carries an advisory mirror.
#[repr(C)]
#[derive(Debug)]
pub struct ProducerState {
    tail: i64,
}

impl ProducerState {
    pub fn new() -> Self {
        Self { tail: 0 }
    }

    /// Next rank this producer will try to publish.
    pub fn tail(&self) -> i64 {
        self.tail
    }
}

impl Default for ProducerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Fast-Forward Queue: bounded single-producer / multiple-consumer FIFO.
///
/// Ranks `0, 1, 2, ...` map onto `capacity` cells by modular arithmetic.
/// The producer never waits for a particular slot: an occupied slot gets a
/// monotonic `gap` mark and the producer moves to the next rank. Consumers
/// agree on rank ownership through a single fetch-and-add on `head`.
///
/// The queue can live on the heap of one process (`with_capacity`) or be
/// placement-constructed into a shared mapping (`init_in_shared`) that
/// forked peers attach to (`attach_shared`).
#[repr(C)]
pub struct FfqQueue<P: Payload> {
    capacity: usize,

    // Shared across all consumers, advanced only by fetch-and-add.
    head: CachePadded<AtomicI64>,

    // Advisory mirror of the producer cursor. Never read on a hot path.
    tail: CachePadded<AtomicI64>,

    // Consumer-incremented delivery counter, advisory (termination checks).
    dequeued: CachePadded<AtomicI64>,

    buffer: *mut Cell<P>,
    owns_buffer: bool,
}

unsafe impl<P: Payload> Send for FfqQueue<P> {}
unsafe impl<P: Payload> Sync for FfqQueue<P> {}

impl<P: Payload> FfqQueue<P> {
    /// Default advisory cap on empty polls in one dequeue call. With the
    /// backoff ceiling this is on the order of ten seconds of producer
    /// silence before `RetryExhausted` is reported.
    pub const DEFAULT_RETRY_CAP: usize = 1_000;

    /// Build a queue in process-local memory.
    pub fn with_capacity(capacity: usize) -> Result<Self, FfqError> {
        if capacity < MIN_CAPACITY {
            return Err(FfqError::ConfigInvalid(capacity));
        }

        let layout = Layout::array::<Cell<P>>(capacity)
            .unwrap()
            .align_to(64)
            .unwrap();
        let ptr = unsafe { std::alloc::alloc(layout) as *mut Cell<P> };
        if ptr.is_null() {
            return Err(FfqError::RegionAllocFailed(layout.size()));
        }

        unsafe {
            for i in 0..capacity {
                ptr::write(ptr.add(i), Cell::new_empty());
            }
        }

        Ok(Self {
            capacity,
            head: CachePadded::new(AtomicI64::new(0)),
            tail: CachePadded::new(AtomicI64::new(0)),
            dequeued: CachePadded::new(AtomicI64::new(0)),
            buffer: ptr,
            owns_buffer: true,
        })
    }

    /// Bytes required to place this queue in a shared mapping.
    pub fn shared_size(capacity: usize) -> usize {
        let header = Layout::new::<Self>();
        let cells = Layout::array::<Cell<P>>(capacity).unwrap();
        let (layout, _) = header.extend(cells).unwrap();
        layout.pad_to_align().size()
    }

    fn cells_offset(capacity: usize) -> usize {
        let header = Layout::new::<Self>();
        let cells = Layout::array::<Cell<P>>(capacity).unwrap();
        let (_, offset) = header.extend(cells).unwrap();
        offset
    }

    /// Owner-side placement construction into `mem` (e.g. an anonymous
    /// MAP_SHARED region). All cells start EMPTY, all counters at zero.
    ///
    /// # Safety
    ///
    /// `mem` must point to at least `shared_size(capacity)` writable bytes,
    /// page-aligned, that outlive every process using the queue.
    pub unsafe fn init_in_shared(
        mem: *mut u8,
        capacity: usize,
    ) -> Result<&'static mut Self, FfqError> {
        if capacity < MIN_CAPACITY {
            return Err(FfqError::ConfigInvalid(capacity));
        }
        assert!(!mem.is_null());

        ptr::write_bytes(mem, 0, Self::shared_size(capacity));

        let queue_ptr = mem as *mut Self;
        let buf_ptr = mem.add(Self::cells_offset(capacity)) as *mut Cell<P>;

        for i in 0..capacity {
            ptr::write(buf_ptr.add(i), Cell::new_empty());
        }

        ptr::write(
            queue_ptr,
            Self {
                capacity,
                head: CachePadded::new(AtomicI64::new(0)),
                tail: CachePadded::new(AtomicI64::new(0)),
                dequeued: CachePadded::new(AtomicI64::new(0)),
                buffer: buf_ptr,
                owns_buffer: false,
            },
        );

        Ok(&mut *queue_ptr)
    }

    /// Peer-side non-owning view of a queue the owner already constructed.
    ///
    /// # Safety
    ///
    /// `mem` must be the same mapping `init_in_shared` ran on, and the
    /// construction barrier must have been crossed first.
    pub unsafe fn attach_shared(mem: *mut u8) -> &'static Self {
        &*(mem as *const Self)
    }

    #[inline]
    fn cell(&self, idx: usize) -> &Cell<P> {
        debug_assert!(idx < self.capacity);
        unsafe { &*self.buffer.add(idx) }
    }

    #[inline]
    fn claim_rank(&self) -> i64 {
        self.head.fetch_add(1, Ordering::AcqRel)
    }

    /// Ring size, immutable after construction.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ranks claimed by consumers so far. Advisory.
    pub fn claimed(&self) -> i64 {
        self.head.load(Ordering::Acquire)
    }

    /// Last value the producer mirrored for its cursor. Advisory and may lag.
    pub fn tail_hint(&self) -> i64 {
        self.tail.load(Ordering::Relaxed)
    }

    /// Number of payloads handed out. Advisory, consumer-incremented.
    pub fn dequeued_count(&self) -> i64 {
        self.dequeued.load(Ordering::Acquire)
    }

    /// Producer-only. Publishes `item` at the first free rank at or after
    /// the cursor, marking every occupied rank on the way as a gap.
    ///
    /// Never fails; completion relies on consumers eventually releasing
    /// slots. The backoff between rounds is a local sleep, never a wait on
    /// a peer lock or on one specific slot.
    pub fn enqueue(&self, state: &mut ProducerState, item: P) {
        let mut backoff = Backoff::new();
        loop {
            let rank = state.tail;
            let idx = (rank % self.capacity as i64) as usize;
            let cell = self.cell(idx);

            if cell.load_rank() == EMPTY_CELL {
                cell.publish(rank, item);
                state.tail = rank + 1;
                self.tail.store(state.tail, Ordering::Relaxed);
                trace!("producer published rank {} at cell {}", rank, idx);
                return;
            }

            // Slot still held by an unreleased payload: record the skip and
            // move on to the next rank.
            cell.mark_gap(rank);
            state.tail = rank + 1;
            self.tail.store(state.tail, Ordering::Relaxed);
            trace!("producer skipped rank {} at cell {}", rank, idx);
            backoff.snooze();
        }
    }

    /// Consumer side: claim one rank and return its payload, skipping over
    /// ranks the producer marked as gaps. `consumer_id` is used only for
    /// diagnostics.
    pub fn dequeue(&self, consumer_id: usize) -> Result<P, FfqError> {
        self.dequeue_with_retry_cap(consumer_id, Self::DEFAULT_RETRY_CAP)
    }

    /// `dequeue` with a caller-tuned advisory retry cap.
    pub fn dequeue_with_retry_cap(
        &self,
        consumer_id: usize,
        retry_cap: usize,
    ) -> Result<P, FfqError> {
        let mut rank = self.claim_rank();
        let mut idx = (rank % self.capacity as i64) as usize;
        let mut backoff = Backoff::new();
        let mut retries = 0usize;

        loop {
            let cell = self.cell(idx);

            if cell.load_rank() == rank {
                // The Acquire on rank makes the payload bytes for this rank
                // visible; the Release in release() hands the slot back.
                let item = unsafe { cell.read_payload() };
                cell.release();
                self.dequeued.fetch_add(1, Ordering::AcqRel);
                trace!(
                    "consumer {} dequeued rank {} from cell {}",
                    consumer_id,
                    rank,
                    idx
                );
                return Ok(item);
            }

            if cell.load_gap() >= rank {
                // Producer skipped this rank; claim a fresh one.
                rank = self.claim_rank();
                idx = (rank % self.capacity as i64) as usize;
                trace!("consumer {} skipped to rank {}", consumer_id, rank);
                backoff.reset();
                retries = 0;
                continue;
            }

            // Rank not yet published.
            retries += 1;
            if retries >= retry_cap {
                warn!(
                    "consumer {} giving up on rank {} after {} retries",
                    consumer_id, rank, retries
                );
                return Err(FfqError::RetryExhausted {
                    consumer_id,
                    rank,
                    retries,
                });
            }
            backoff.snooze();
        }
    }
}

impl<P: Payload> Drop for FfqQueue<P> {
    fn drop(&mut self) {
        // Payloads are Copy, so only the buffer itself needs freeing.
        if self.owns_buffer && !self.buffer.is_null() {
            let layout = Layout::array::<Cell<P>>(self.capacity)
                .unwrap()
                .align_to(64)
                .unwrap();
            unsafe { std::alloc::dealloc(self.buffer as *mut u8, layout) };
        }
    }
}

impl<P: Payload> fmt::Debug for FfqQueue<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FfqQueue")
            .field("capacity", &self.capacity)
            .field("head", &self.head.load(Ordering::Relaxed))
            .field("tail_hint", &self.tail.load(Ordering::Relaxed))
            .field("dequeued", &self.dequeued.load(Ordering::Relaxed))
            .field("owns_buffer", &self.owns_buffer)
            .finish()
    }
}
