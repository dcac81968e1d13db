//! Monotonic microsecond clock for log entries and datagram timestamps.

use std::time::Instant;

/// Microseconds since the process started streaming.
///
/// Cheap to copy; every task carries one. Session epochs are expressed
/// as offsets on this clock so datagram timestamps restart near zero
/// with each pipeline.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    epoch: Instant,
}

impl Clock {
    pub fn start() -> Self {
        Self { epoch: Instant::now() }
    }

    pub fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }
}
