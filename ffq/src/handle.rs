use std::time::Duration;

use log::debug;

use crate::error::FfqError;
use crate::queue::{FfqQueue, ProducerState};
use crate::shm::ShmBarrier;
use crate::Payload;

/// How long `open_owner`/`open_peer` wait for the construction barrier
/// before reporting the queue unusable.
pub const OPEN_BARRIER_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-process binding to a queue region.
///
/// Constructed once per process; it caches everything that never changes
/// (the capacity, the payload layout fixed at compile time) so no hot-path
/// call re-reads shared memory for it or rebuilds any descriptor. Exactly
/// one process opens as owner; it holds the producer cursor and is the only
/// one allowed to enqueue.
pub struct FfqHandle<P: Payload> {
    queue: &'static FfqQueue<P>,
    capacity: usize,
    producer: Option<ProducerState>,
}

impl<P: Payload> FfqHandle<P> {
    /// Owner side: placement-construct the queue into `mem`, then cross the
    /// construction barrier with every peer.
    ///
    /// # Safety
    ///
    /// `mem` must point to at least `FfqQueue::<P>::shared_size(capacity)`
    /// writable shared bytes, page-aligned, that outlive all handles, and
    /// `barrier` must be shared with every participating process.
    pub unsafe fn open_owner(
        mem: *mut u8,
        capacity: usize,
        barrier: &ShmBarrier,
    ) -> Result<Self, FfqError> {
        let queue = FfqQueue::<P>::init_in_shared(mem, capacity)?;
        if !barrier.wait_timeout(OPEN_BARRIER_TIMEOUT) {
            return Err(FfqError::BarrierTimeout(
                OPEN_BARRIER_TIMEOUT.as_millis() as u64,
            ));
        }
        debug!("owner handle open, capacity {}", capacity);
        Ok(Self {
            queue,
            capacity,
            producer: Some(ProducerState::new()),
        })
    }

    /// Peer side: wait for the owner to finish construction, then attach
    /// and cache the capacity. The capacity is read exactly once.
    ///
    /// # Safety
    ///
    /// `mem` must be the mapping the owner constructs into, and `barrier`
    /// the same barrier the owner crosses.
    pub unsafe fn open_peer(mem: *mut u8, barrier: &ShmBarrier) -> Result<Self, FfqError> {
        if !barrier.wait_timeout(OPEN_BARRIER_TIMEOUT) {
            return Err(FfqError::BarrierTimeout(
                OPEN_BARRIER_TIMEOUT.as_millis() as u64,
            ));
        }
        let queue = FfqQueue::<P>::attach_shared(mem);
        let capacity = queue.capacity();
        debug!("peer handle open, capacity {}", capacity);
        Ok(Self {
            queue,
            capacity,
            producer: None,
        })
    }

    /// Wrap an already-constructed queue without any barrier, e.g. for
    /// threads of one process. `producer` selects the owner role.
    pub fn from_queue(queue: &'static FfqQueue<P>, producer: bool) -> Self {
        Self {
            queue,
            capacity: queue.capacity(),
            producer: producer.then(ProducerState::new),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_producer(&self) -> bool {
        self.producer.is_some()
    }

    /// Producer-only; panics when called through a peer handle.
    pub fn enqueue(&mut self, item: P) {
        let state = self
            .producer
            .as_mut()
            .expect("enqueue requires the owner handle");
        self.queue.enqueue(state, item);
    }

    pub fn dequeue(&self, consumer_id: usize) -> Result<P, FfqError> {
        self.queue.dequeue(consumer_id)
    }

    pub fn dequeue_with_retry_cap(
        &self,
        consumer_id: usize,
        retry_cap: usize,
    ) -> Result<P, FfqError> {
        self.queue.dequeue_with_retry_cap(consumer_id, retry_cap)
    }

    /// Advisory delivery counter, see `FfqQueue::dequeued_count`.
    pub fn dequeued_count(&self) -> i64 {
        self.queue.dequeued_count()
    }

    /// Advisory view of claimed ranks.
    pub fn claimed(&self) -> i64 {
        self.queue.claimed()
    }

    /// Release the per-process binding. The region itself stays mapped; the
    /// owner's `SharedRegion` frees it after every handle is gone.
    pub fn close(self) {
        debug!("handle closed");
    }
}
