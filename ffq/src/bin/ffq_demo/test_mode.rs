//! Test mode: synthetic records at a fixed rate; consumers stop once the
//! shared delivery counter reaches the expected total.

use log::info;

use ffq::{FfqHandle, WeatherRecord};

use crate::do_work;

// Small cap so a consumer parked on a never-published rank re-checks the
// termination condition in well under a second.
const POLL_RETRY_CAP: usize = 50;

pub fn run_producer(handle: &mut FfqHandle<WeatherRecord>, items: usize, delay_ms: u64) {
    info!("test producer started");

    for i in 0..items {
        handle.enqueue(WeatherRecord::synthetic(i + 1));
        do_work(delay_ms);
    }

    info!("test producer finished");
}

pub fn run_consumer(
    handle: &FfqHandle<WeatherRecord>,
    consumer_id: usize,
    items: usize,
    delay_ms: u64,
) {
    info!("consumer {} started", consumer_id);

    let mut processed = 0usize;
    loop {
        if handle.dequeued_count() >= items as i64 {
            break;
        }

        match handle.dequeue_with_retry_cap(consumer_id, POLL_RETRY_CAP) {
            Ok(item) => {
                info!("consumer {}: {}", consumer_id, item);
                processed += 1;
                do_work(delay_ms);
            }
            // Advisory cap fired; loop back to the termination check.
            Err(_) => continue,
        }
    }

    info!("consumer {} finished, processed {} items", consumer_id, processed);
}
