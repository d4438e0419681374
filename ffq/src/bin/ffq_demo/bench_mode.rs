//! Benchmark mode: fixed item count, sentinel-terminated, shared stats.

use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::info;

use ffq::{FfqHandle, WeatherRecord};

use crate::do_work;

pub const MAX_CONSUMERS: usize = 64;

const POLL_RETRY_CAP: usize = 200;

/// Shared-mapping stats block; consumers bump their own slot, the parent
/// reads everything after the run.
#[repr(C)]
pub struct StatsBlock {
    consumers: usize,
    produced: AtomicU64,
    consumed: [AtomicU64; MAX_CONSUMERS],
}

impl StatsBlock {
    pub fn shared_size() -> usize {
        std::mem::size_of::<Self>()
    }

    /// # Safety
    ///
    /// `mem` must point to `shared_size()` writable shared bytes aligned
    /// for `Self`, written before any child reads it.
    pub unsafe fn init_in_shared(mem: *mut u8, consumers: usize) -> &'static Self {
        assert!(consumers <= MAX_CONSUMERS);
        let stats_ptr = mem as *mut Self;
        ptr::write(
            stats_ptr,
            Self {
                consumers,
                produced: AtomicU64::new(0),
                consumed: [const { AtomicU64::new(0) }; MAX_CONSUMERS],
            },
        );
        &*stats_ptr
    }

    fn record_consumed(&self, consumer_id: usize) {
        self.consumed[consumer_id].fetch_add(1, Ordering::AcqRel);
    }

    fn consumed(&self, consumer_id: usize) -> u64 {
        self.consumed[consumer_id].load(Ordering::Acquire)
    }

    fn total_consumed(&self) -> u64 {
        (0..self.consumers).map(|id| self.consumed(id)).sum()
    }
}

/// Simple sequential records so the run measures the queue, not formatting.
fn benchmark_record(item_number: usize) -> WeatherRecord {
    WeatherRecord::new(
        &format!("Item-{}", item_number),
        &format!("City-{}", item_number % 100),
        (item_number as i32) % 500,
        &format!("Icon-{}", item_number % 10),
        (item_number % 100) as f32,
        (item_number as i32) % 100,
    )
}

pub fn run_producer(
    handle: &mut FfqHandle<WeatherRecord>,
    stats: &StatsBlock,
    items: usize,
    consumers: usize,
    delay_ms: u64,
) {
    info!("benchmark producer started, {} items", items);

    for i in 1..=items {
        handle.enqueue(benchmark_record(i));
        stats.produced.fetch_add(1, Ordering::Relaxed);
        if i % 1000 == 0 {
            info!("enqueued {} items", i);
        }
        do_work(delay_ms);
    }

    // One personal termination signal per consumer.
    for _ in 0..consumers {
        handle.enqueue(WeatherRecord::sentinel());
    }

    info!("benchmark producer finished");
}

pub fn run_consumer(
    handle: &FfqHandle<WeatherRecord>,
    stats: &StatsBlock,
    consumer_id: usize,
    delay_ms: u64,
) {
    info!("benchmark consumer {} started", consumer_id);

    loop {
        match handle.dequeue_with_retry_cap(consumer_id, POLL_RETRY_CAP) {
            Ok(item) if item.is_sentinel() => break,
            Ok(_) => {
                stats.record_consumed(consumer_id);
                do_work(delay_ms);
            }
            Err(_) => continue,
        }
    }

    info!(
        "benchmark consumer {} finished, consumed {} items",
        consumer_id,
        stats.consumed(consumer_id)
    );
}

pub fn report(stats: &StatsBlock, consumers: usize, elapsed: Duration) {
    let produced = stats.produced.load(Ordering::Acquire);
    let consumed = stats.total_consumed();
    let secs = elapsed.as_secs_f64();

    info!("benchmark finished in {:.3}s", secs);
    info!("produced {} items, consumed {} items", produced, consumed);
    for id in 0..consumers {
        info!("  consumer {}: {} items", id, stats.consumed(id));
    }
    if secs > 0.0 {
        info!("throughput: {:.0} items/s", consumed as f64 / secs);
    }
}
