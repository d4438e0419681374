//! Demo embedding for the Fast-Forward Queue: one producer process (the
//! region owner) and a set of forked consumer processes sharing one
//! anonymous mapping laid out `[barrier | stats | queue]`.

mod bench_mode;
mod file_mode;
mod test_mode;

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use log::{error, info};
use nix::libc;
use nix::sys::wait::waitpid;
use nix::unistd::{fork, ForkResult};

use ffq::{FfqError, FfqHandle, FfqQueue, SharedRegion, ShmBarrier, WeatherRecord, MIN_CAPACITY};

use crate::bench_mode::StatsBlock;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Synthetic records at a fixed rate, stop after --items deliveries.
    Test,
    /// Throughput run terminated by one sentinel per consumer.
    Benchmark,
    /// Tail a CSV file and stream new rows until interrupted.
    File,
}

#[derive(Parser, Debug)]
#[command(name = "ffq-demo", about = "Fast-Forward SPMC queue demo")]
struct Cli {
    #[arg(long, value_enum, default_value = "test")]
    mode: Mode,

    /// Ring size N, at least 2.
    #[arg(long, default_value_t = 4)]
    queue_size: usize,

    /// Number of records the producer generates (test/benchmark modes).
    #[arg(long, default_value_t = 10)]
    items: usize,

    #[arg(long, default_value_t = 50)]
    producer_delay_ms: u64,

    #[arg(long, default_value_t = 200)]
    consumer_delay_ms: u64,

    /// Number of consumer processes to fork.
    #[arg(long, default_value_t = 2)]
    consumers: usize,

    /// Input for file mode.
    #[arg(long, default_value = "test_data.csv")]
    csv_file: PathBuf,
}

pub(crate) fn do_work(time_ms: u64) {
    if time_ms > 0 {
        thread::sleep(Duration::from_millis(time_ms));
    }
}

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Offsets of the three shared objects inside one mapping.
struct RegionLayout {
    barrier: usize,
    stats: usize,
    queue: usize,
    total: usize,
}

impl RegionLayout {
    fn new(queue_size: usize) -> Self {
        let barrier = 0;
        let stats = align_up(ShmBarrier::shared_size(), 128);
        let queue = align_up(stats + StatsBlock::shared_size(), 128);
        let total = queue + FfqQueue::<WeatherRecord>::shared_size(queue_size);
        Self {
            barrier,
            stats,
            queue,
            total,
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if cli.queue_size < MIN_CAPACITY {
        eprintln!("queue size must be at least {}", MIN_CAPACITY);
        return ExitCode::from(2);
    }
    if cli.items < 1 {
        eprintln!("number of items must be at least 1");
        return ExitCode::from(2);
    }
    if cli.consumers < 1 || cli.consumers > bench_mode::MAX_CONSUMERS {
        eprintln!(
            "number of consumers must be between 1 and {}",
            bench_mode::MAX_CONSUMERS
        );
        return ExitCode::from(2);
    }

    info!(
        "mode {:?}, queue size {}, items {}, consumers {}, delays {}ms/{}ms",
        cli.mode,
        cli.queue_size,
        cli.items,
        cli.consumers,
        cli.producer_delay_ms,
        cli.consumer_delay_ms
    );

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("init failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), FfqError> {
    let layout = RegionLayout::new(cli.queue_size);
    let region = SharedRegion::new(layout.total)?;

    let barrier = unsafe {
        ShmBarrier::init_in_shared(region.at(layout.barrier), (cli.consumers + 1) as u32)
    };
    let stats = unsafe { StatsBlock::init_in_shared(region.at(layout.stats), cli.consumers) };
    let queue_mem = unsafe { region.at(layout.queue) };

    let mut children = Vec::with_capacity(cli.consumers);
    for consumer_id in 0..cli.consumers {
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                let code = consumer_process(cli, queue_mem, barrier, stats, consumer_id);
                unsafe { libc::_exit(code) };
            }
            Ok(ForkResult::Parent { child }) => children.push(child),
            Err(e) => panic!("fork failed for consumer {}: {}", consumer_id, e),
        }
    }

    let mut handle =
        unsafe { FfqHandle::<WeatherRecord>::open_owner(queue_mem, cli.queue_size, barrier)? };

    let started = Instant::now();
    match cli.mode {
        Mode::Test => test_mode::run_producer(&mut handle, cli.items, cli.producer_delay_ms),
        Mode::Benchmark => {
            bench_mode::run_producer(&mut handle, stats, cli.items, cli.consumers, cli.producer_delay_ms)
        }
        Mode::File => file_mode::run_producer(&mut handle, &cli.csv_file, cli.producer_delay_ms),
    }

    // Teardown crossing: the mapping is released only after every process
    // is done with the queue.
    barrier.wait();

    for child in children {
        if let Err(e) = waitpid(child, None) {
            error!("waitpid failed: {}", e);
        }
    }

    if cli.mode == Mode::Benchmark {
        bench_mode::report(stats, cli.consumers, started.elapsed());
    }

    handle.close();
    Ok(())
}

fn consumer_process(
    cli: &Cli,
    queue_mem: *mut u8,
    barrier: &ShmBarrier,
    stats: &StatsBlock,
    consumer_id: usize,
) -> i32 {
    let handle = match unsafe { FfqHandle::<WeatherRecord>::open_peer(queue_mem, barrier) } {
        Ok(handle) => handle,
        Err(e) => {
            error!("consumer {}: open failed: {}", consumer_id, e);
            return 1;
        }
    };

    match cli.mode {
        Mode::Test => {
            test_mode::run_consumer(&handle, consumer_id, cli.items, cli.consumer_delay_ms)
        }
        Mode::Benchmark => {
            bench_mode::run_consumer(&handle, stats, consumer_id, cli.consumer_delay_ms)
        }
        Mode::File => file_mode::run_consumer(&handle, consumer_id, cli.consumer_delay_ms),
    }

    barrier.wait();
    handle.close();
    0
}
