//! 1 Hz throughput reporting into the event log.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use urtp_pipeline::{LogEvent, SendStats};

use crate::clock::Clock;
use crate::session::AppEventLog;

pub async fn throughput_task(
    stats: Arc<SendStats>,
    log: Arc<AppEventLog>,
    clock: Clock,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = interval(Duration::from_secs(1));
    ticker.tick().await;
    let mut last_bytes = stats.bytes_sent();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
                continue;
            }
        }

        let bytes = stats.bytes_sent();
        log.record(
            clock.now_us(),
            LogEvent::ThroughputBitsPerSecond,
            ((bytes - last_bytes) * 8) as i32,
        );
        last_bytes = bytes;
    }
}
