//! Command-line configuration.
//!
//! Everything the original gated behind compile-time switches is a
//! runtime option here; parsing produces the shared
//! [`StreamConfig`](urtp_icd::StreamConfig).

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, ValueEnum};
use urtp_icd::{
    CellularConfig, Coding, GainSetting, Link, StreamConfig, StreamSink,
    Transport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TransportArg {
    #[default]
    Udp,
    Tcp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LinkArg {
    #[default]
    Ethernet,
    CellularPpp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CodingArg {
    #[default]
    Pcm16,
    Unicam8,
    Unicam10,
}

/// Stream captured audio to a URTP server.
#[derive(Debug, Parser)]
#[command(name = "urtp-streamer")]
pub struct Cli {
    /// Server to stream to (host name or address).
    #[arg(long, conflicts_with = "local_file")]
    pub server: Option<String>,

    /// Server port.
    #[arg(long, default_value_t = 5065)]
    pub port: u16,

    /// Write the audio stream (bodies only) to this file instead of a
    /// server.
    #[arg(long)]
    pub local_file: Option<String>,

    #[arg(long, value_enum, default_value_t)]
    pub transport: TransportArg,

    #[arg(long, value_enum, default_value_t)]
    pub link: LinkArg,

    #[arg(long, value_enum, default_value_t)]
    pub coding: CodingArg,

    /// Substitute a fixed 400 Hz tone for the captured audio.
    #[arg(long)]
    pub fixed_tone: bool,

    /// Pin the gain left shift instead of adapting it.
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=12))]
    pub gain_shift: Option<u8>,

    /// Stream duration in milliseconds; 0 streams until Ctrl-C.
    #[arg(long, default_value_t = 0)]
    pub duration_ms: u32,

    /// Cellular APN (cellular-ppp link only).
    #[arg(long)]
    pub apn: Option<String>,

    #[arg(long)]
    pub username: Option<String>,

    #[arg(long)]
    pub password: Option<String>,

    /// SIM PIN (cellular-ppp link only).
    #[arg(long)]
    pub pin: Option<String>,
}

fn bounded<const N: usize>(
    value: &str,
    what: &str,
) -> Result<heapless::String<N>> {
    heapless::String::try_from(value)
        .map_err(|_| anyhow!("{what} longer than {N} characters: {value:?}"))
}

impl Cli {
    pub fn into_config(self) -> Result<StreamConfig> {
        let sink = match (&self.server, &self.local_file) {
            (Some(host), None) => StreamSink::Server {
                host: bounded(host, "server host")?,
                port: self.port,
            },
            (None, Some(path)) => {
                StreamSink::LocalFile { path: bounded(path, "file path")? }
            }
            (None, None) => bail!("either --server or --local-file is required"),
            (Some(_), Some(_)) => unreachable!("clap enforces exclusivity"),
        };

        let cellular = CellularConfig {
            apn: self
                .apn
                .as_deref()
                .map(|v| bounded(v, "APN"))
                .transpose()
                .context("invalid --apn")?,
            username: self
                .username
                .as_deref()
                .map(|v| bounded(v, "username"))
                .transpose()?,
            password: self
                .password
                .as_deref()
                .map(|v| bounded(v, "password"))
                .transpose()?,
            pin: self
                .pin
                .as_deref()
                .map(|v| bounded(v, "PIN"))
                .transpose()?,
        };

        Ok(StreamConfig {
            transport: match self.transport {
                TransportArg::Udp => Transport::Udp,
                TransportArg::Tcp => Transport::Tcp,
            },
            link: match self.link {
                LinkArg::Ethernet => Link::Ethernet,
                LinkArg::CellularPpp => Link::CellularPpp,
            },
            coding: match self.coding {
                CodingArg::Pcm16 => Coding::Pcm16,
                CodingArg::Unicam8 => Coding::Unicam8,
                CodingArg::Unicam10 => Coding::Unicam10,
            },
            fixed_tone: self.fixed_tone,
            gain: match self.gain_shift {
                None => GainSetting::Auto,
                Some(shift) => GainSetting::Fixed(shift),
            },
            duration_ms: self.duration_ms,
            sink,
            cellular,
        })
    }
}
