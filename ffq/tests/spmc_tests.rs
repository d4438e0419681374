use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ffq::{FfqHandle, FfqQueue, ProducerState, WeatherRecord};

fn record_with_aqi(aqi: i32) -> WeatherRecord {
    WeatherRecord::new("2025-05-23T22:01:56+07:00", "TestCity", aqi, "icon0", 1.5, 40)
}

#[test]
fn gap_is_skipped_and_every_item_still_delivered() {
    let queue = Arc::new(FfqQueue::<WeatherRecord>::with_capacity(2).unwrap());
    let mut state = ProducerState::new();

    queue.enqueue(&mut state, record_with_aqi(1));
    queue.enqueue(&mut state, record_with_aqi(2));

    // Ring full: the third enqueue can only mark gaps until a dequeue
    // releases a slot.
    let q = Arc::clone(&queue);
    let producer = thread::spawn(move || {
        q.enqueue(&mut state, record_with_aqi(3));
    });
    thread::sleep(Duration::from_millis(30));

    let mut delivered = vec![queue.dequeue(0).unwrap().aqi];
    producer.join().unwrap();
    delivered.push(queue.dequeue(0).unwrap().aqi);
    delivered.push(queue.dequeue(0).unwrap().aqi);

    delivered.sort_unstable();
    assert_eq!(delivered, vec![1, 2, 3]);

    // Three deliveries but more than three claims: at least one rank was
    // observed as a gap and re-claimed, none was delivered twice.
    assert!(queue.claimed() > 3);
    assert_eq!(queue.dequeued_count(), 3);
}

#[test]
fn three_consumers_deliver_every_rank_exactly_once() {
    const ITEMS: u64 = 1_000;
    const CONSUMERS: usize = 3;

    let queue = Arc::new(FfqQueue::<u64>::with_capacity(8).unwrap());

    let q = Arc::clone(&queue);
    let producer = thread::spawn(move || {
        let mut state = ProducerState::new();
        for i in 0..ITEMS {
            q.enqueue(&mut state, i);
        }
    });

    let mut consumers = Vec::new();
    for consumer_id in 0..CONSUMERS {
        let q = Arc::clone(&queue);
        consumers.push(thread::spawn(move || {
            let mut taken = Vec::new();
            let mut attempts = 0;
            while q.dequeued_count() < ITEMS as i64 && attempts < 100_000 {
                attempts += 1;
                if let Ok(item) = q.dequeue_with_retry_cap(consumer_id, 200) {
                    taken.push(item);
                }
            }
            taken
        }));
    }

    producer.join().unwrap();

    let mut union = HashSet::new();
    let mut total = 0usize;
    for consumer in consumers {
        for item in consumer.join().unwrap() {
            assert!(union.insert(item), "item {} delivered twice", item);
            total += 1;
        }
    }

    assert_eq!(total, ITEMS as usize);
    assert_eq!(union, (0..ITEMS).collect::<HashSet<_>>());
}

#[test]
fn consumer_waits_for_first_enqueue_instead_of_failing() {
    let queue = Arc::new(FfqQueue::<WeatherRecord>::with_capacity(4).unwrap());
    let started = Arc::new(AtomicBool::new(false));

    let q = Arc::clone(&queue);
    let s = Arc::clone(&started);
    let consumer = thread::spawn(move || {
        s.store(true, Ordering::Release);
        let begun = Instant::now();
        let item = q.dequeue(0).unwrap();
        (item, begun.elapsed())
    });

    while !started.load(Ordering::Acquire) {
        thread::yield_now();
    }
    thread::sleep(Duration::from_millis(50));

    let mut state = ProducerState::new();
    queue.enqueue(&mut state, record_with_aqi(7));

    let (item, waited) = consumer.join().unwrap();
    assert_eq!(item.aqi, 7);
    // The dequeue slept across the producer's silence instead of erroring.
    assert!(waited >= Duration::from_millis(40));
}

#[test]
fn sentinels_terminate_each_consumer_exactly_once() {
    const ITEMS: usize = 100;
    const CONSUMERS: usize = 2;

    let queue = Arc::new(FfqQueue::<WeatherRecord>::with_capacity(4).unwrap());

    let q = Arc::clone(&queue);
    let producer = thread::spawn(move || {
        let mut state = ProducerState::new();
        for i in 0..ITEMS {
            q.enqueue(&mut state, record_with_aqi(i as i32));
        }
        for _ in 0..CONSUMERS {
            q.enqueue(&mut state, WeatherRecord::sentinel());
        }
    });

    let mut consumers = Vec::new();
    for consumer_id in 0..CONSUMERS {
        let q = Arc::clone(&queue);
        consumers.push(thread::spawn(move || {
            let mut non_sentinel = 0usize;
            loop {
                match q.dequeue(consumer_id) {
                    Ok(item) if item.is_sentinel() => break,
                    Ok(_) => non_sentinel += 1,
                    Err(_) => continue,
                }
            }
            non_sentinel
        }));
    }

    producer.join().unwrap();
    let total: usize = consumers.into_iter().map(|c| c.join().unwrap()).sum();
    assert_eq!(total, ITEMS);
}

#[test]
fn handles_share_one_queue_between_roles() {
    let queue: &'static FfqQueue<u64> = Box::leak(Box::new(FfqQueue::with_capacity(4).unwrap()));

    let mut producer = FfqHandle::from_queue(queue, true);
    let consumer = FfqHandle::from_queue(queue, false);
    assert!(producer.is_producer());
    assert!(!consumer.is_producer());
    assert_eq!(consumer.capacity(), 4);

    producer.enqueue(11);
    producer.enqueue(12);
    assert_eq!(consumer.dequeue(0).unwrap(), 11);
    assert_eq!(consumer.dequeue(1).unwrap(), 12);
    assert_eq!(consumer.dequeued_count(), 2);
    assert_eq!(consumer.claimed(), 2);

    consumer.close();
    producer.close();
}

#[test]
fn contended_consumers_never_duplicate_or_lose() {
    const ITEMS: u64 = 10_000;
    const CONSUMERS: usize = 4;

    let queue = Arc::new(FfqQueue::<u64>::with_capacity(8).unwrap());

    let q = Arc::clone(&queue);
    let producer = thread::spawn(move || {
        let mut state = ProducerState::new();
        for i in 0..ITEMS {
            q.enqueue(&mut state, i);
        }
    });

    let mut consumers = Vec::new();
    for consumer_id in 0..CONSUMERS {
        let q = Arc::clone(&queue);
        consumers.push(thread::spawn(move || {
            let mut taken = Vec::new();
            let mut attempts = 0;
            while q.dequeued_count() < ITEMS as i64 && attempts < 1_000_000 {
                attempts += 1;
                if let Ok(item) = q.dequeue_with_retry_cap(consumer_id, 300) {
                    taken.push(item);
                }
            }
            taken
        }));
    }

    producer.join().unwrap();

    let mut all: Vec<u64> = consumers
        .into_iter()
        .flat_map(|c| c.join().unwrap())
        .collect();
    all.sort_unstable();
    assert_eq!(all, (0..ITEMS).collect::<Vec<_>>());
}
