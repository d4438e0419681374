use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use criterion::{criterion_group, criterion_main, Bencher, Criterion};
use nix::{
    libc,
    sys::wait::waitpid,
    unistd::{fork, ForkResult},
};

use ffq::{FfqHandle, FfqQueue, SharedRegion, ShmBarrier};

const ITEMS_PER_CONSUMER: usize = 5_000;
const CONSUMER_COUNTS_TO_TEST: &[usize] = &[1, 2, 4];
const QUEUE_SIZE: usize = 64;

// Termination marker carried through the queue like any payload.
const SENTINEL: u64 = u64::MAX;

#[repr(C)]
struct DoneSync {
    total_consumed: AtomicU64,
}

impl DoneSync {
    fn shared_size() -> usize {
        std::mem::size_of::<Self>()
    }

    unsafe fn init_in_shared(mem: *mut u8) -> &'static Self {
        let sync_ptr = mem as *mut Self;
        ptr::write(
            sync_ptr,
            Self {
                total_consumed: AtomicU64::new(0),
            },
        );
        &*sync_ptr
    }
}

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

fn fork_and_run(num_consumers: usize, items_to_produce: usize) -> Duration {
    let barrier_offset = 0;
    let done_offset = align_up(ShmBarrier::shared_size(), 64);
    let queue_offset = align_up(done_offset + DoneSync::shared_size(), 128);
    let total = queue_offset + FfqQueue::<u64>::shared_size(QUEUE_SIZE);

    let region = SharedRegion::new(total).expect("mmap failed");
    let barrier = unsafe {
        ShmBarrier::init_in_shared(region.at(barrier_offset), (num_consumers + 1) as u32)
    };
    let done_sync = unsafe { DoneSync::init_in_shared(region.at(done_offset)) };
    let queue_mem = unsafe { region.at(queue_offset) };

    let mut consumer_pids = Vec::with_capacity(num_consumers);
    for consumer_id in 0..num_consumers {
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                #[cfg(target_os = "linux")]
                unsafe {
                    use libc::{cpu_set_t, sched_setaffinity, CPU_SET, CPU_ZERO};
                    let mut set = std::mem::zeroed::<cpu_set_t>();
                    CPU_ZERO(&mut set);
                    CPU_SET(consumer_id + 1, &mut set);
                    sched_setaffinity(0, std::mem::size_of::<cpu_set_t>(), &set);
                }

                let handle = match unsafe { FfqHandle::<u64>::open_peer(queue_mem, barrier) } {
                    Ok(handle) => handle,
                    Err(_) => unsafe { libc::_exit(1) },
                };

                let mut consumed = 0u64;
                loop {
                    match handle.dequeue(consumer_id) {
                        Ok(SENTINEL) => break,
                        Ok(_) => consumed += 1,
                        Err(_) => continue,
                    }
                }

                done_sync.total_consumed.fetch_add(consumed, Ordering::AcqRel);
                unsafe { libc::_exit(0) };
            }
            Ok(ForkResult::Parent { child }) => consumer_pids.push(child),
            Err(e) => panic!("fork failed for consumer {}: {}", consumer_id, e),
        }
    }

    #[cfg(target_os = "linux")]
    unsafe {
        use libc::{cpu_set_t, sched_setaffinity, CPU_SET, CPU_ZERO};
        let mut set = std::mem::zeroed::<cpu_set_t>();
        CPU_ZERO(&mut set);
        CPU_SET(0, &mut set);
        sched_setaffinity(0, std::mem::size_of::<cpu_set_t>(), &set);
    }

    // open_owner returns once every peer has crossed the barrier.
    let mut handle = unsafe { FfqHandle::<u64>::open_owner(queue_mem, QUEUE_SIZE, barrier) }
        .expect("owner open failed");

    let start_time = Instant::now();

    for i in 0..items_to_produce {
        handle.enqueue(i as u64);
    }
    for _ in 0..num_consumers {
        handle.enqueue(SENTINEL);
    }

    for pid in consumer_pids {
        waitpid(pid, None).expect("waitpid for consumer failed");
    }

    let duration = start_time.elapsed();

    let total_consumed = done_sync.total_consumed.load(Ordering::Acquire);
    if total_consumed != items_to_produce as u64 {
        eprintln!(
            "Warning (FFQ SPMC): consumed {}/{} items with {} consumers",
            total_consumed, items_to_produce, num_consumers
        );
    }

    handle.close();
    duration
}

fn bench_ffq_spmc(c: &mut Criterion) {
    let mut group = c.benchmark_group("FfqSpmc");

    for &num_consumers in CONSUMER_COUNTS_TO_TEST {
        let items_to_produce = ITEMS_PER_CONSUMER * num_consumers;

        group.bench_function(format!("1P_{}C", num_consumers), |b: &mut Bencher| {
            b.iter_custom(|_iters| fork_and_run(num_consumers, items_to_produce))
        });
    }

    group.finish();
}

fn custom_criterion() -> Criterion {
    Criterion::default()
        .warm_up_time(Duration::from_secs(2))
        .measurement_time(Duration::from_secs(30))
        .sample_size(10)
}

criterion_group! {
    name = benches;
    config = custom_criterion();
    targets = bench_ffq_spmc
}

criterion_main!(benches);
