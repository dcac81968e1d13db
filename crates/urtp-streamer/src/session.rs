//! The supervisor: link bring-up, session lifecycle, retry, shutdown.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use portable_atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tokio::time::timeout;
use urtp_icd::{GainSetting, StreamConfig, StreamSink};
use urtp_pipeline::{
    arithmetic_shift_is_sign_preserving, CaptureSettings, DatagramRing,
    EventLog, LogEvent, PipelineCounters, SendStats, AUDIO_MAX_SHIFT_BITS,
};

use crate::clock::Clock;
use crate::link;
use crate::net;
use crate::tap::FileTap;
use crate::tasks::{
    button_task, capture_task, indicator, indicator_task, sender_task,
    throughput_task, Button, CaptureParams, IndicatorEvent, IndicatorHandle,
    SenderExit, SilenceSource, SimI2s, SinkIo,
};

/// Datagram slots in the ring: two seconds of audio.
pub const RING_SLOTS: usize = 100;

/// Wait before re-establishing a dead link.
pub const RETRY_WAIT: Duration = Duration::from_secs(5);

/// Window for the sender to finish in-flight slots at shutdown.
pub const DRAIN_WAIT: Duration = Duration::from_secs(2);

/// The event log type every context shares.
pub type AppEventLog = EventLog<CriticalSectionRawMutex>;

/// State shared between the producer, the sender and the supervisor
/// for the lifetime of one streaming session.
pub struct SessionShared {
    pub ring: DatagramRing<RING_SLOTS>,
    /// One-bit level-triggered datagram-ready flag.
    pub ready: Signal<CriticalSectionRawMutex, ()>,
    stop: AtomicBool,
    network_connected: AtomicBool,
}

impl SessionShared {
    pub fn new(datagram_len: usize) -> Self {
        Self {
            ring: DatagramRing::new(datagram_len),
            ready: Signal::new(),
            stop: AtomicBool::new(false),
            network_connected: AtomicBool::new(true),
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn network_connected(&self) -> bool {
        self.network_connected.load(Ordering::Acquire)
    }

    pub fn set_network_connected(&self, connected: bool) {
        self.network_connected.store(connected, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Stopped,
    LinkDown,
}

/// Run the endpoint until the stop signal, the configured duration, or
/// an unrecoverable setup failure; re-establish the link as needed.
pub async fn run(config: StreamConfig) -> Result<()> {
    if let GainSetting::Fixed(shift) = config.gain {
        if u32::from(shift) > AUDIO_MAX_SHIFT_BITS {
            anyhow::bail!(
                "fixed gain shift {shift} outside 0..={AUDIO_MAX_SHIFT_BITS}"
            );
        }
    }
    if config.coding.sample_width_bits().is_some()
        && !arithmetic_shift_is_sign_preserving()
    {
        anyhow::bail!(
            "arithmetic right shift is not sign-preserving on this \
             platform; the companded codings cannot run"
        );
    }

    let clock = Clock::start();
    let log = Arc::new(AppEventLog::new());
    let stats = Arc::new(SendStats::new());
    let counters = Arc::new(PipelineCounters::new());
    log.record(clock.now_us(), LogEvent::LogStart, 0);

    let (indicators, indicator_rx) = indicator::channel();
    tokio::spawn(indicator_task(indicator_rx));

    let button = Arc::new(Button::new());
    tokio::spawn(button_task(
        button.clone(),
        log.clone(),
        clock,
        indicators.clone(),
    ));

    let deadline = (config.duration_ms > 0).then(|| {
        tokio::time::Instant::now()
            + Duration::from_millis(config.duration_ms as u64)
    });

    indicators.send(IndicatorEvent::Good);
    let mut min_free = RING_SLOTS;

    loop {
        if button.pressed() || past(deadline) {
            break;
        }

        match run_session(
            &config,
            clock,
            &log,
            &stats,
            &counters,
            &button,
            &indicators,
            deadline,
        )
        .await
        {
            Ok((end, session_min_free)) => {
                min_free = min_free.min(session_min_free);
                match end {
                    SessionEnd::Stopped => break,
                    SessionEnd::LinkDown => {
                        log::warn!(
                            "link lost, re-establishing in {}s",
                            RETRY_WAIT.as_secs()
                        );
                        wait_before_retry(&button, deadline).await;
                    }
                }
            }
            Err(e) => {
                log.record(clock.now_us(), LogEvent::NetworkStartFailure, 0);
                indicators.send(IndicatorEvent::Bad);
                log::warn!(
                    "session setup failed: {e:#}; retrying in {}s",
                    RETRY_WAIT.as_secs()
                );
                wait_before_retry(&button, deadline).await;
            }
        }
    }

    log.record(clock.now_us(), LogEvent::LogStop, 0);
    indicators.send(IndicatorEvent::AllOff);
    print_log(&log);
    print_stats(&stats, &counters, min_free);
    Ok(())
}

fn past(deadline: Option<tokio::time::Instant>) -> bool {
    deadline.is_some_and(|d| tokio::time::Instant::now() >= d)
}

async fn wait_before_retry(
    button: &Arc<Button>,
    deadline: Option<tokio::time::Instant>,
) {
    let wait = tokio::time::sleep(RETRY_WAIT);
    tokio::select! {
        _ = wait => {}
        _ = button.wait() => {}
        _ = async { tokio::time::sleep_until(deadline.unwrap()).await },
            if deadline.is_some() => {}
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_session(
    config: &StreamConfig,
    clock: Clock,
    log: &Arc<AppEventLog>,
    stats: &Arc<SendStats>,
    counters: &Arc<PipelineCounters>,
    button: &Arc<Button>,
    indicators: &IndicatorHandle,
    deadline: Option<tokio::time::Instant>,
) -> Result<(SessionEnd, usize)> {
    link::bring_up(config.link, &config.cellular)?;

    let is_network = matches!(config.sink, StreamSink::Server { .. });
    let sink = match &config.sink {
        StreamSink::Server { host, port } => {
            let server = net::resolve(host.as_str(), *port).await?;
            log::info!("streaming to {server} ({:?})", config.transport);
            let socket =
                net::connect(config.transport, server, log, clock).await?;
            log.record(clock.now_us(), LogEvent::NetworkStart, 0);
            SinkIo::Net(socket)
        }
        StreamSink::LocalFile { path } => {
            match FileTap::create(
                Path::new(path.as_str()),
                config.coding.body_size(),
            ) {
                Ok(tap) => {
                    log.record(clock.now_us(), LogEvent::FileOpen, 0);
                    SinkIo::File(tap)
                }
                Err(e) => {
                    log.record(
                        clock.now_us(),
                        LogEvent::FileOpenFailure,
                        e.raw_os_error().unwrap_or(-1),
                    );
                    return Err(e).with_context(|| {
                        format!("unable to open file {}", path.as_str())
                    });
                }
            }
        }
    };

    SimI2s::start(CaptureSettings::urtp_default())
        .map_err(|e| anyhow!("unable to start reading from I2S: {e:?}"))?;
    log.record(clock.now_us(), LogEvent::I2sStart, 0);

    let shared = Arc::new(SessionShared::new(config.coding.datagram_size()));
    let session_epoch_us = clock.now_us();
    let (stop_capture, capture_stop_rx) = watch::channel(false);

    let mut sender = tokio::spawn(sender_task(
        shared.clone(),
        log.clone(),
        stats.clone(),
        clock,
        sink,
        indicators.clone(),
    ));
    let capture = tokio::spawn(capture_task(
        shared.clone(),
        log.clone(),
        counters.clone(),
        clock,
        CaptureParams {
            coding: config.coding,
            gain: config.gain,
            fixed_tone: config.fixed_tone,
            epoch_us: session_epoch_us,
        },
        Box::new(SilenceSource),
        capture_stop_rx.clone(),
        indicators.clone(),
    ));
    tokio::spawn(throughput_task(
        stats.clone(),
        log.clone(),
        clock,
        capture_stop_rx,
    ));

    let end = tokio::select! {
        _ = button.wait() => SessionEnd::Stopped,
        _ = async { tokio::time::sleep_until(deadline.unwrap()).await },
            if deadline.is_some() => SessionEnd::Stopped,
        exit = &mut sender => match exit {
            Ok(SenderExit::LinkDown) => SessionEnd::LinkDown,
            Ok(SenderExit::Stopped) => SessionEnd::Stopped,
            Err(_) => SessionEnd::LinkDown,
        },
    };

    // Stop the producer first: no more encode events.
    let _ = stop_capture.send(true);
    let _ = capture.await;

    // Give the sender its drain window, then terminate it. It may be
    // stuck in a blocking socket call, so an unclean join is tolerated.
    if end == SessionEnd::Stopped && !sender.is_finished() {
        tokio::time::sleep(DRAIN_WAIT).await;
    }
    shared.request_stop();
    shared.ready.signal(());
    if !sender.is_finished()
        && timeout(Duration::from_secs(1), &mut sender).await.is_err()
    {
        sender.abort();
    }

    if is_network {
        log.record(clock.now_us(), LogEvent::NetworkStop, 0);
    }

    Ok((end, shared.ring.free_count_min()))
}

fn print_log(log: &AppEventLog) {
    println!("------------- Log starts -------------");
    log.for_each(|entry| {
        let marker = if entry.event.is_error() { "* " } else { "  " };
        println!(
            "{:10.3}: {}{} {} ({:#x})",
            entry.timestamp_us as f64 / 1000.0,
            marker,
            entry.event.name(),
            entry.parameter,
            entry.parameter,
        );
    });
    println!("-------------- Log ends --------------");
}

fn print_stats(
    stats: &SendStats,
    counters: &PipelineCounters,
    min_free: usize,
) {
    if stats.send_count() == 0 {
        return;
    }
    println!("Stats:");
    println!(
        "Worst case time to perform a send: {} us.",
        stats.peak_duration_us()
    );
    println!(
        "Average time to perform a send: {} us.",
        stats.average_duration_us()
    );
    println!(
        "Sends that took longer than a block duration: {}.",
        stats.over_budget_count()
    );
    println!("Send failures: {}.", stats.failure_count());
    println!("Minimum number of datagram(s) free: {}.", min_free);
    println!("Datagram overflows: {}.", counters.overflows());
    if counters.possible_bad_audio() > 0 {
        println!(
            "Blocks with possible bad audio: {}.",
            counters.possible_bad_audio()
        );
    }
}
