use thiserror::Error;

/// Errors surfaced by queue construction and by the advisory dequeue cap.
///
/// Everything else the hot paths could run into (two producers, an
/// uninitialized handle) is a precondition violation and is not detected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FfqError {
    #[error("queue capacity must be at least 2, got {0}")]
    ConfigInvalid(usize),

    #[error("failed to allocate queue region of {0} bytes")]
    RegionAllocFailed(usize),

    #[error("construction barrier not crossed within {0} ms")]
    BarrierTimeout(u64),

    /// Advisory: the consumer spun past its retry cap without observing a
    /// published rank. The caller may call dequeue again; the cap never
    /// fires while the producer keeps making progress.
    #[error("consumer {consumer_id} exhausted {retries} retries waiting on rank {rank}")]
    RetryExhausted {
        consumer_id: usize,
        rank: i64,
        retries: usize,
    },
}
