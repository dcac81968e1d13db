//! Runtime configuration for a streaming session.
//!
//! Every compile-time switch of the original endpoint is a first-class
//! option here: transport, link, coding, debug tone, gain mode, stream
//! duration and the stream sink.

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::Coding;

/// Maximum length of a server host name.
pub const MAX_HOST_LEN: usize = 64;

/// Maximum length of a local file path.
pub const MAX_PATH_LEN: usize = 128;

/// Maximum length of a cellular credential field.
pub const MAX_CREDENTIAL_LEN: usize = 32;

/// Transport used for the URTP stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Transport {
    Udp,
    Tcp,
}

/// Network link the stream rides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Link {
    Ethernet,
    CellularPpp,
}

/// Gain applied before coding: adaptive, or a fixed left shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GainSetting {
    Auto,
    Fixed(u8),
}

impl Default for GainSetting {
    fn default() -> Self {
        GainSetting::Auto
    }
}

/// Where the encoded stream goes.
///
/// A server and a local file are mutually exclusive; there is not enough
/// time in the send budget to do both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamSink {
    Server { host: String<MAX_HOST_LEN>, port: u16 },
    LocalFile { path: String<MAX_PATH_LEN> },
}

/// Credentials for a cellular PPP link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CellularConfig {
    pub apn: Option<String<MAX_CREDENTIAL_LEN>>,
    pub username: Option<String<MAX_CREDENTIAL_LEN>>,
    pub password: Option<String<MAX_CREDENTIAL_LEN>>,
    pub pin: Option<String<8>>,
}

/// Full configuration of one streaming run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StreamConfig {
    pub transport: Transport,
    pub link: Link,
    pub coding: Coding,
    /// Substitute a canned 400 Hz tone for the captured audio.
    pub fixed_tone: bool,
    pub gain: GainSetting,
    /// Stream duration in milliseconds; 0 streams until the stop signal.
    pub duration_ms: u32,
    pub sink: StreamSink,
    pub cellular: CellularConfig,
}

impl StreamConfig {
    /// A UDP/Ethernet/PCM-16 configuration pointed at `host:port`.
    pub fn to_server(host: String<MAX_HOST_LEN>, port: u16) -> Self {
        Self {
            transport: Transport::Udp,
            link: Link::Ethernet,
            coding: Coding::Pcm16,
            fixed_tone: false,
            gain: GainSetting::Auto,
            duration_ms: 0,
            sink: StreamSink::Server { host, port },
            cellular: CellularConfig::default(),
        }
    }
}
