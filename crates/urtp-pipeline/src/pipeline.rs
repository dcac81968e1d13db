//! The encode step: DMA event in, published datagram out.
//!
//! [`Pipeline::handle_rx_event`] is the body of the I²S callback. It must
//! finish well inside one block duration: extract and gain-adjust 320
//! samples, run the codec straight into the next ring slot, stamp the
//! header, and publish. The caller — still in producer context — then
//! signals the sender and drives the indicators from the returned
//! [`EncodeOutcome`].

use embassy_sync::blocking_mutex::raw::RawMutex;
use urtp_icd::{
    Coding, DatagramHeader, GainSetting, SAMPLES_PER_BLOCK, URTP_HEADER_SIZE,
};

use crate::capture::{Half, RawCaptureBuffer, RxEvent};
use crate::codec::{arithmetic_shift_is_sign_preserving, encode_block};
use crate::error::PipelineError;
use crate::extract::mono_from_stereo;
use crate::gain::{GainController, AUDIO_MAX_SHIFT_BITS};
use crate::log::{EventLog, LogEvent};
use crate::ring::DatagramRing;
use crate::stats::PipelineCounters;
use crate::tone::ToneGenerator;

/// What one DMA event produced, for the caller to act on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EncodeOutcome {
    /// A datagram was published; wake the sender.
    pub datagram_ready: bool,
    /// This encode began a run of ring overflows.
    pub overflow_started: bool,
    /// A run of overflows ended; the run length.
    pub overflow_ended: Option<u32>,
    /// The event mask was neither half- nor full-complete.
    pub unknown_event: bool,
}

/// Producer-side state machine: extractor, gain, codec, sequencing.
pub struct Pipeline<'a, M: RawMutex, const N: usize> {
    ring: &'a DatagramRing<N>,
    log: &'a EventLog<M>,
    counters: &'a PipelineCounters,
    gain: GainController,
    coding: Coding,
    tone: Option<ToneGenerator>,
    sequence: u16,
    epoch_us: u64,
    overflow_run: u32,
}

impl<'a, M: RawMutex, const N: usize> Pipeline<'a, M, N> {
    /// Build the encode step for one streaming session.
    ///
    /// `epoch_us` is the session origin on the caller's monotonic clock;
    /// datagram timestamps count from it. Sequence numbers restart at
    /// zero with each pipeline.
    pub fn new(
        ring: &'a DatagramRing<N>,
        log: &'a EventLog<M>,
        counters: &'a PipelineCounters,
        coding: Coding,
        gain: GainSetting,
        fixed_tone: bool,
        epoch_us: u64,
    ) -> Result<Self, PipelineError> {
        if coding.sample_width_bits().is_some()
            && !arithmetic_shift_is_sign_preserving()
        {
            return Err(PipelineError::ArithmeticShiftUnsupported);
        }

        let gain = match gain {
            GainSetting::Auto => GainController::auto(),
            GainSetting::Fixed(shift) => {
                if u32::from(shift) > AUDIO_MAX_SHIFT_BITS {
                    return Err(PipelineError::FixedShiftOutOfRange(shift));
                }
                GainController::fixed(shift.into())
            }
        };

        Ok(Self {
            ring,
            log,
            counters,
            gain,
            coding,
            tone: fixed_tone.then(ToneGenerator::new),
            sequence: 0,
            epoch_us,
            overflow_run: 0,
        })
    }

    pub fn coding(&self) -> Coding {
        self.coding
    }

    /// Next sequence number to be assigned.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// The I²S driver callback body.
    pub fn handle_rx_event(
        &mut self,
        event: RxEvent,
        rcb: &RawCaptureBuffer,
        now_us: u64,
    ) -> EncodeOutcome {
        if event.is_half_complete() {
            self.log.record(now_us, LogEvent::I2sDmaRxHalfFull, 0);
            self.encode_half(rcb.half(Half::First), now_us)
        } else if event.is_complete() {
            self.log.record(now_us, LogEvent::I2sDmaRxFull, 0);
            self.encode_half(rcb.half(Half::Second), now_us)
        } else {
            self.log.record(now_us, LogEvent::I2sDmaUnknown, event.0 as i32);
            self.counters.note_dma_unknown();
            EncodeOutcome { unknown_event: true, ..Default::default() }
        }
    }

    fn encode_half(
        &mut self,
        frames: &[[u32; 2]],
        now_us: u64,
    ) -> EncodeOutcome {
        debug_assert_eq!(frames.len(), SAMPLES_PER_BLOCK);
        let timestamp_us = now_us - self.epoch_us;

        let mut samples = [0i32; SAMPLES_PER_BLOCK];
        let mut bad_frames = 0;
        for (frame, out) in frames.iter().zip(samples.iter_mut()) {
            let (mut mono, filler_ok) = mono_from_stereo(frame);
            if !filler_ok {
                bad_frames += 1;
            }
            if let Some(tone) = &mut self.tone {
                mono = tone.next_sample();
            }
            *out = self.gain.process(mono);
        }

        // A bad filler byte means suspect samples, not a droppable
        // block; count it and carry on.
        if bad_frames > 0 {
            self.counters.note_possible_bad_audio();
            self.log.record(now_us, LogEvent::PossibleBadAudio, bad_frames);
        }

        if let Some(report) = self.gain.take_boundary_report() {
            self.log.record(
                now_us,
                LogEvent::MonoSampleUnusedBitsMin,
                report.min_unused as i32,
            );
            self.log.record(
                now_us,
                LogEvent::MonoSampleAudioShift,
                report.shift as i32,
            );
        }

        let sequence = self.sequence;
        let coding = self.coding;
        let outcome = self.ring.produce(|datagram| {
            let body_length =
                encode_block(coding, &samples, &mut datagram[URTP_HEADER_SIZE..]);
            DatagramHeader {
                coding,
                sequence,
                timestamp_us,
                body_length: body_length as u16,
            }
            .write_to(datagram);
        });
        self.sequence = self.sequence.wrapping_add(1);

        let mut overflow_started = false;
        let mut overflow_ended = None;
        if outcome.overflowed {
            self.counters.note_overflow();
            if self.overflow_run == 0 {
                self.log.record(
                    now_us,
                    LogEvent::DatagramOverflowBegins,
                    sequence as i32,
                );
                overflow_started = true;
            }
            self.overflow_run += 1;
        } else if self.overflow_run > 0 {
            self.log.record(
                now_us,
                LogEvent::DatagramNumOverflows,
                self.overflow_run as i32,
            );
            overflow_ended = Some(self.overflow_run);
            self.overflow_run = 0;
        }

        self.log.record(now_us, LogEvent::DatagramAlloc, sequence as i32);
        self.log.record(
            now_us,
            LogEvent::NumDatagramsFree,
            outcome.free_count as i32,
        );
        self.log.record(now_us, LogEvent::DatagramReadyToSend, sequence as i32);

        EncodeOutcome {
            datagram_ready: true,
            overflow_started,
            overflow_ended,
            unknown_event: false,
        }
    }
}
