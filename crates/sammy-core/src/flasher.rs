//! Progress reporting, chunk sizing, and cooperative cancellation for the
//! `set-total-bytes -> send-chunk -> ack` partition flash loop implemented
//! on [`crate::session::Session`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Default chunk size for outbound `FLASH_SEND_DATA` frames.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// The enumerated chunk sizes the flasher accepts.
pub const VALID_CHUNK_SIZES: &[usize] = &[
    512 * 1024,
    1024 * 1024,
    2 * 1024 * 1024,
    4 * 1024 * 1024,
    8 * 1024 * 1024,
];

/// A validated chunk size, restricted to the set the device is expected to
/// tolerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSize(usize);

impl ChunkSize {
    pub fn new(bytes: usize) -> Option<Self> {
        VALID_CHUNK_SIZES.contains(&bytes).then_some(Self(bytes))
    }

    pub fn bytes(self) -> usize {
        self.0
    }
}

impl Default for ChunkSize {
    fn default() -> Self {
        Self(DEFAULT_CHUNK_SIZE)
    }
}

impl std::str::FromStr for ChunkSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let bytes = match normalized.as_str() {
            "512k" | "512kib" => 512 * 1024,
            "1m" | "1mib" => 1024 * 1024,
            "2m" | "2mib" => 2 * 1024 * 1024,
            "4m" | "4mib" => 4 * 1024 * 1024,
            "8m" | "8mib" => 8 * 1024 * 1024,
            other => {
                return Err(format!(
                    "invalid chunk size '{other}', expected one of 512k, 1m, 2m, 4m, 8m"
                ));
            }
        };
        Ok(ChunkSize(bytes))
    }
}

/// A progress update emitted during a partition flash.
#[derive(Debug, Clone)]
pub struct Progress {
    pub current_bytes: u64,
    pub total_bytes: u64,
    pub current_file: String,
    pub stage: String,
    pub percentage: f32,
}

/// A single-method sink for progress updates. Simple enough to be a plain
/// closure target; a GUI or a progress bar both implement this the same
/// way.
pub trait ProgressSink {
    fn on_progress(&mut self, progress: &Progress);
}

/// A sink that discards every update.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&mut self, _progress: &Progress) {}
}

impl<F: FnMut(&Progress)> ProgressSink for F {
    fn on_progress(&mut self, progress: &Progress) {
        self(progress)
    }
}

/// A cooperative cancellation flag, checked between chunks. Mid-chunk
/// cancellation is not supported; the smallest cancellation granularity is
/// one chunk.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Computes `ceil(total / chunk_size)`, the number of `FLASH_SEND_DATA`
/// frames a flash of `total` bytes will emit. `total == 0` still performs
/// the `FLASH_SET_TOTAL_BYTES` round trip but emits zero chunks.
pub fn chunk_count(total: usize, chunk_size: usize) -> usize {
    if total == 0 {
        0
    } else {
        total.div_ceil(chunk_size)
    }
}
