//! The capture task: the producer context of the pipeline.
//!
//! On hardware the encode step runs in the I²S DMA callback. Here a
//! paced task plays the driver's part: every 20 ms it fills the next
//! half of the ping-pong buffer from a frame source and delivers the
//! half/full event to the pipeline. The task never blocks on the
//! consumer and its per-block work is far under the block duration.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use urtp_icd::{Coding, GainSetting, BLOCK_DURATION_MS};
use urtp_pipeline::{
    frame_from_mono, CaptureError, CaptureMode, CaptureSettings,
    FrameProtocol, Half, LogEvent, Pipeline, PipelineCounters,
    RawCaptureBuffer, RxEvent, RX_COMPLETE, RX_HALF_COMPLETE,
};

use crate::clock::Clock;
use crate::session::{AppEventLog, SessionShared};
use crate::tasks::indicator::{IndicatorEvent, IndicatorHandle};

/// Source of stereo frames, standing in for the microphone.
pub trait FrameSource: Send {
    /// Fill one block's worth of frames in the capture layout.
    fn fill(&mut self, frames: &mut [[u32; 2]]);
}

/// An open microphone in a quiet room.
pub struct SilenceSource;

impl FrameSource for SilenceSource {
    fn fill(&mut self, frames: &mut [[u32; 2]]) {
        frames.fill(frame_from_mono(0));
    }
}

/// The simulated I²S peripheral.
///
/// Start accepts exactly the settings the real microphone needs —
/// Philips alignment, master receive, 24-bit data in 32-bit frames at
/// 16 kHz — and refuses anything else, stage by stage, the way the
/// hardware driver does.
pub struct SimI2s;

impl SimI2s {
    pub fn start(settings: CaptureSettings) -> Result<Self, CaptureError> {
        if settings.protocol != FrameProtocol::Philips {
            return Err(CaptureError::Protocol);
        }
        if settings.mode != CaptureMode::MasterReceive {
            return Err(CaptureError::Mode);
        }
        if settings.data_bits != 24 || settings.frame_bits != 32 {
            return Err(CaptureError::Format);
        }
        if settings.frequency_hz != urtp_icd::SAMPLING_FREQUENCY_HZ {
            return Err(CaptureError::Frequency);
        }
        Ok(Self)
    }
}

/// Per-session parameters for the encode step.
pub struct CaptureParams {
    pub coding: Coding,
    pub gain: GainSetting,
    pub fixed_tone: bool,
    /// Session origin on the shared clock; datagram timestamps count
    /// from here.
    pub epoch_us: u64,
}

pub async fn capture_task(
    shared: Arc<SessionShared>,
    log: Arc<AppEventLog>,
    counters: Arc<PipelineCounters>,
    clock: Clock,
    params: CaptureParams,
    mut source: Box<dyn FrameSource>,
    mut stop: watch::Receiver<bool>,
    indicators: IndicatorHandle,
) {
    let mut pipeline = match Pipeline::new(
        &shared.ring,
        log.as_ref(),
        counters.as_ref(),
        params.coding,
        params.gain,
        params.fixed_tone,
        params.epoch_us,
    ) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            log::error!("pipeline refused to start: {e}");
            indicators.send(IndicatorEvent::Bad);
            return;
        }
    };

    let mut rcb = Box::new(RawCaptureBuffer::new());
    let mut ticker =
        interval(Duration::from_millis(BLOCK_DURATION_MS as u64));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    let mut half = Half::First;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        if *stop.borrow() {
            break;
        }

        source.fill(rcb.half_mut(half));
        let mask = match half {
            Half::First => RX_HALF_COMPLETE,
            Half::Second => RX_COMPLETE,
        };
        let outcome =
            pipeline.handle_rx_event(RxEvent(mask), &rcb, clock.now_us());

        if outcome.datagram_ready {
            shared.ready.signal(());
        }
        if outcome.overflow_started {
            indicators.send(IndicatorEvent::Event);
        }
        if outcome.overflow_ended.is_some() {
            indicators.send(IndicatorEvent::EventOver);
        }
        if outcome.unknown_event {
            indicators.send(IndicatorEvent::Bad);
        }

        half = match half {
            Half::First => Half::Second,
            Half::Second => Half::First,
        };
    }

    log.record(clock.now_us(), LogEvent::I2sStop, 0);
}
