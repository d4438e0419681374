//! File mode: tail a CSV file and stream appended rows through the queue
//! until the process is interrupted.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use log::{info, warn};

use ffq::{FfqHandle, WeatherRecord};

use crate::do_work;

const POLL_RETRY_CAP: usize = 200;
const MISSING_FILE_WAIT_MS: u64 = 1_000;
const IDLE_WAIT_MS: u64 = 500;

pub fn run_producer(handle: &mut FfqHandle<WeatherRecord>, csv_file: &Path, delay_ms: u64) {
    info!("file producer started on {}", csv_file.display());

    let mut reader: Option<BufReader<File>> = None;
    let mut current_ino = 0u64;
    let mut file_pos = 0u64;
    let mut last_len = 0u64;
    let mut last_mtime = 0i64;

    loop {
        let meta = match std::fs::metadata(csv_file) {
            Ok(meta) => meta,
            Err(_) => {
                warn!("cannot stat {}, waiting", csv_file.display());
                reader = None;
                do_work(MISSING_FILE_WAIT_MS);
                continue;
            }
        };

        // Reopen when the file appeared or was replaced.
        if reader.is_none() || meta.ino() != current_ino {
            match File::open(csv_file) {
                Ok(file) => {
                    info!("opened {}", csv_file.display());
                    reader = Some(BufReader::new(file));
                    current_ino = meta.ino();
                    file_pos = 0;
                    last_len = 0;
                    last_mtime = 0;
                }
                Err(_) => {
                    warn!("cannot open {}, waiting", csv_file.display());
                    do_work(MISSING_FILE_WAIT_MS);
                    continue;
                }
            }
        }

        if meta.len() == last_len && meta.mtime() == last_mtime {
            do_work(IDLE_WAIT_MS);
            continue;
        }

        let r = reader.as_mut().unwrap();
        if r.seek(SeekFrom::Start(file_pos)).is_err() {
            reader = None;
            continue;
        }

        let mut line = String::new();
        loop {
            line.clear();
            match r.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    file_pos += n as u64;
                    if let Some(record) = WeatherRecord::parse_csv(&line) {
                        handle.enqueue(record);
                        info!("enqueued {}", record);
                    }
                    do_work(delay_ms);
                }
            }
        }

        last_len = meta.len();
        last_mtime = meta.mtime();
    }
}

pub fn run_consumer(handle: &FfqHandle<WeatherRecord>, consumer_id: usize, delay_ms: u64) {
    info!("file consumer {} started", consumer_id);

    loop {
        match handle.dequeue_with_retry_cap(consumer_id, POLL_RETRY_CAP) {
            Ok(item) => {
                info!("consumer {}: {}", consumer_id, item);
                do_work(delay_ms);
            }
            Err(_) => continue,
        }
    }
}
