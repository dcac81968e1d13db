//! The endpoint's tasks: capture (producer), sender (consumer),
//! indicators, throughput, and the stop button.

pub mod capture;
pub mod indicator;
pub mod sender;
pub mod throughput;

pub use capture::*;
pub use indicator::*;
pub use sender::*;
pub use throughput::*;

use std::sync::Arc;

use portable_atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use urtp_pipeline::LogEvent;

use crate::clock::Clock;
use crate::session::AppEventLog;

/// The user button, pressed once to request a graceful stop.
///
/// On the host the button is Ctrl-C. The pressed flag is shared state
/// between the button context and the supervisor; the notify wakes any
/// supervisor wait.
pub struct Button {
    pressed: AtomicBool,
    notify: Notify,
}

impl Button {
    pub fn new() -> Self {
        Self { pressed: AtomicBool::new(false), notify: Notify::new() }
    }

    pub fn pressed(&self) -> bool {
        self.pressed.load(Ordering::Acquire)
    }

    pub fn press(&self) {
        self.pressed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Resolve once the button has been pressed.
    pub async fn wait(&self) {
        while !self.pressed() {
            self.notify.notified().await;
        }
    }
}

impl Default for Button {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for Ctrl-C and flag the stop request.
pub async fn button_task(
    button: Arc<Button>,
    log: Arc<AppEventLog>,
    clock: Clock,
    indicators: IndicatorHandle,
) {
    if tokio::signal::ctrl_c().await.is_ok() {
        log.record(clock.now_us(), LogEvent::ButtonPressed, 0);
        indicators.send(IndicatorEvent::Event);
        button.press();
    }
}
