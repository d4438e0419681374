//! Fast-Forward Queue: a bounded single-producer / multiple-consumer FIFO
//! for processes sharing a memory region.
//!
//! The producer publishes ranks `0, 1, 2, ...` into a fixed ring and never
//! waits for a specific slot: a slot still held by a reader gets a
//! monotonic gap mark and the producer moves to the next rank. Consumers
//! claim ranks with one fetch-and-add on a shared head counter, skip the
//! ranks the producer marked as gaps, and hand slots back by publishing
//! EMPTY. Payload and rank writes are ordered by release/acquire pairs so
//! the protocol holds under relaxed memory.
//!
//! One process owns the region (`FfqHandle::open_owner`); forked peers
//! attach (`FfqHandle::open_peer`) after a construction barrier and cache
//! the immutable parameters locally.

pub mod backoff;
pub mod cell;
pub mod error;
pub mod handle;
pub mod queue;
pub mod shm;
pub mod weather;

pub use cell::EMPTY_CELL;
pub use error::FfqError;
pub use handle::FfqHandle;
pub use queue::{FfqQueue, ProducerState, MIN_CAPACITY};
pub use shm::{SharedRegion, ShmBarrier};
pub use weather::WeatherRecord;

/// Marker for types the queue can carry: fixed size, trivially copyable,
/// no owned heap. `Copy` is what enforces all three.
pub trait Payload: Copy + Send + 'static {}

impl<T: Copy + Send + 'static> Payload for T {}
