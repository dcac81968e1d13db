//! Atomic counters shared across contexts.

use portable_atomic::{AtomicU32, AtomicU64, Ordering};
use urtp_icd::BLOCK_DURATION_MS;

/// Per-send budget in microseconds; staying under it on average is what
/// keeps the ring from filling.
const SEND_BUDGET_US: u64 = BLOCK_DURATION_MS as u64 * 1000;

/// What one recorded send looked like against the running statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SendRecord {
    pub new_peak: bool,
    pub over_budget: bool,
}

/// Running send statistics, written by the sender, read everywhere.
#[derive(Debug)]
pub struct SendStats {
    total_duration_us: AtomicU64,
    send_count: AtomicU64,
    peak_duration_us: AtomicU64,
    over_budget_count: AtomicU32,
    failure_count: AtomicU32,
    bytes_sent: AtomicU64,
}

impl SendStats {
    pub const fn new() -> Self {
        Self {
            total_duration_us: AtomicU64::new(0),
            send_count: AtomicU64::new(0),
            peak_duration_us: AtomicU64::new(0),
            over_budget_count: AtomicU32::new(0),
            failure_count: AtomicU32::new(0),
            bytes_sent: AtomicU64::new(0),
        }
    }

    /// Record a completed send of `bytes` that took `duration_us`.
    pub fn record_send(&self, duration_us: u64, bytes: usize) -> SendRecord {
        self.total_duration_us.fetch_add(duration_us, Ordering::Relaxed);
        self.send_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);

        let over_budget = duration_us > SEND_BUDGET_US;
        if over_budget {
            self.over_budget_count.fetch_add(1, Ordering::Relaxed);
        }

        let new_peak =
            self.peak_duration_us.fetch_max(duration_us, Ordering::Relaxed)
                < duration_us;

        SendRecord { new_peak, over_budget }
    }

    pub fn record_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn average_duration_us(&self) -> u64 {
        let count = self.send_count.load(Ordering::Relaxed);
        if count == 0 {
            0
        } else {
            self.total_duration_us.load(Ordering::Relaxed) / count
        }
    }

    pub fn peak_duration_us(&self) -> u64 {
        self.peak_duration_us.load(Ordering::Relaxed)
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::Relaxed)
    }

    pub fn over_budget_count(&self) -> u32 {
        self.over_budget_count.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

impl Default for SendStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Diagnostic counters owned by the capture/encode side.
#[derive(Debug)]
pub struct PipelineCounters {
    possible_bad_audio: AtomicU32,
    dma_unknown: AtomicU32,
    overflows: AtomicU32,
}

impl PipelineCounters {
    pub const fn new() -> Self {
        Self {
            possible_bad_audio: AtomicU32::new(0),
            dma_unknown: AtomicU32::new(0),
            overflows: AtomicU32::new(0),
        }
    }

    pub fn note_possible_bad_audio(&self) {
        self.possible_bad_audio.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_dma_unknown(&self) {
        self.dma_unknown.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_overflow(&self) {
        self.overflows.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames whose filler byte deviated; indicates I²S bit slip.
    pub fn possible_bad_audio(&self) -> u32 {
        self.possible_bad_audio.load(Ordering::Relaxed)
    }

    pub fn dma_unknown(&self) -> u32 {
        self.dma_unknown.load(Ordering::Relaxed)
    }

    pub fn overflows(&self) -> u32 {
        self.overflows.load(Ordering::Relaxed)
    }
}

impl Default for PipelineCounters {
    fn default() -> Self {
        Self::new()
    }
}
