#![cfg_attr(not(test), no_std)]
//! Interface definitions shared between the URTP pipeline and its hosts.
//!
//! This crate pins down everything both sides of the system must agree on:
//! the audio block geometry, the byte-exact URTP datagram header, and the
//! runtime configuration types. It carries no behavior beyond encoding and
//! decoding those agreements.

mod config;
mod wire;

pub use config::*;
pub use wire::*;

/// Audio sampling frequency on the I²S interface, in Hz.
pub const SAMPLING_FREQUENCY_HZ: u32 = 16_000;

/// Duration of one audio block in milliseconds.
pub const BLOCK_DURATION_MS: u32 = 20;

/// Mono samples in one block (20 ms at 16 kHz).
pub const SAMPLES_PER_BLOCK: usize =
    (SAMPLING_FREQUENCY_HZ as usize * BLOCK_DURATION_MS as usize) / 1000;

/// Samples in one UNICAM companding sub-block (1 ms).
pub const SAMPLES_PER_UNICAM_BLOCK: usize = 16;

/// UNICAM sub-blocks per datagram body.
pub const UNICAM_BLOCKS_PER_DATAGRAM: usize =
    SAMPLES_PER_BLOCK / SAMPLES_PER_UNICAM_BLOCK;
