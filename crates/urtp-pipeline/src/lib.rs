#![cfg_attr(not(test), no_std)]
//! The real-time half of the URTP streaming endpoint.
//!
//! # Architecture
//!
//! ```text
//! I²S DMA ─▶ RawCaptureBuffer ─▶ extract ─▶ gain ─▶ codec ─▶ DatagramRing ─▶ sender
//!             (ping-pong)          (per half-complete event, producer context)
//! ```
//!
//! Everything in this crate runs, or may run, in the producer (DMA
//! callback) context: nothing here blocks, allocates, or takes a lock
//! longer than a critical section. The [`DatagramRing`] is the only
//! structure shared with the consumer side and is lock-free; the
//! [`EventLog`] is shared with every context behind a blocking
//! critical-section mutex.
//!
//! The crate is `no_std` and host-testable; the `tests/` directory
//! exercises it on the build host.

mod capture;
mod codec;
mod error;
mod extract;
mod gain;
mod log;
mod pipeline;
mod ring;
mod stats;
mod tone;

pub use capture::{
    CaptureError, CaptureMode, CaptureSettings, FrameProtocol, Half,
    RawCaptureBuffer, RxEvent, RX_COMPLETE, RX_HALF_COMPLETE,
};
pub use codec::{
    arithmetic_shift_is_sign_preserving, decode_block, encode_block,
    unicam_shift_codes,
};
pub use error::PipelineError;
pub use extract::{frame_from_mono, mono_from_stereo, MONO_SAMPLE_FILLER};
pub use gain::{
    unused_bits, BoundaryReport, GainController, AUDIO_DESIRED_UNUSED_BITS,
    AUDIO_MAX_SHIFT_BITS,
};
pub use log::{EventLog, LogEntry, LogEvent, MAX_LOG_ENTRIES};
pub use pipeline::{EncodeOutcome, Pipeline};
pub use ring::{DatagramRing, ProduceOutcome};
pub use stats::{PipelineCounters, SendRecord, SendStats};
pub use tone::{ToneGenerator, TONE_400_HZ_24BIT};
