//! The URTP streaming endpoint.
//!
//! Captures 16 kHz stereo PCM (here: a simulated I²S driver on the
//! 20 ms DMA cadence), reduces it to mono with adaptive gain, encodes
//! each block as one URTP datagram, and streams the datagrams to a
//! server over UDP or TCP — or into a local file — in near real time.
//!
//! The three contexts of the real device map onto tasks: the capture
//! task is the producer and never blocks, the sender task drains the
//! datagram ring, and the supervisor brings the link up, watches for
//! link death and re-establishes it, and tears everything down on the
//! stop signal.

pub mod clock;
pub mod config;
pub mod link;
pub mod net;
pub mod session;
pub mod tap;
pub mod tasks;

pub use clock::Clock;
pub use session::{run, SessionShared, RING_SLOTS};
