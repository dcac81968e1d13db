//! The three status indicators.
//!
//! Green toggles once per successful send, red marks errors, blue marks
//! a datagram overflow in progress. The real endpoint drives LEDs; here
//! a task renders the state transitions to the process log. Producers
//! use `try_send` and drop updates rather than ever waiting on the
//! renderer.

use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorEvent {
    /// Steady green: up and streaming.
    Good,
    /// Red: something failed.
    Bad,
    /// Blue on: an event (overflow run, button) began.
    Event,
    /// Blue off: the event passed.
    EventOver,
    /// Flip green, one successful send.
    ToggleGreen,
    /// Everything off, clean shutdown.
    AllOff,
}

#[derive(Clone)]
pub struct IndicatorHandle {
    tx: mpsc::Sender<IndicatorEvent>,
}

impl IndicatorHandle {
    pub fn send(&self, event: IndicatorEvent) {
        // Dropped updates are fine; the indicators are a lossy display.
        let _ = self.tx.try_send(event);
    }
}

pub fn channel() -> (IndicatorHandle, mpsc::Receiver<IndicatorEvent>) {
    let (tx, rx) = mpsc::channel(32);
    (IndicatorHandle { tx }, rx)
}

pub async fn indicator_task(mut rx: mpsc::Receiver<IndicatorEvent>) {
    let (mut green, mut red, mut blue) = (false, false, false);

    while let Some(event) = rx.recv().await {
        match event {
            IndicatorEvent::Good => (green, red, blue) = (true, false, false),
            IndicatorEvent::Bad => (green, red, blue) = (false, true, false),
            IndicatorEvent::Event => {
                (green, red, blue) = (false, false, true)
            }
            IndicatorEvent::EventOver => blue = false,
            IndicatorEvent::ToggleGreen => green = !green,
            IndicatorEvent::AllOff => (green, red, blue) = (false, false, false),
        }
        log::debug!("indicators: green={green} red={red} blue={blue}");
    }
}
