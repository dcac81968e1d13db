//! The sender task: the consumer context of the pipeline.
//!
//! Woken by the datagram-ready signal or a one-second keep-alive,
//! whichever comes first, then drains the ring. A failed send retains
//! the head slot for the next wakeup; errors from the fatal class, or a
//! full second of continuous bad sends, mark the network down and hand
//! control back to the supervisor.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::time::{timeout, timeout_at};
use urtp_icd::{peek_sequence, URTP_HEADER_SIZE, URTP_MAX_DATAGRAM_SIZE};
use urtp_pipeline::{LogEvent, SendStats};

use crate::clock::Clock;
use crate::net::{is_link_down, NetSocket};
use crate::session::{AppEventLog, SessionShared};
use crate::tap::FileTap;
use crate::tasks::indicator::{IndicatorEvent, IndicatorHandle};

/// Keep-alive: drain even if no ready signal arrived.
pub const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Per-datagram deadline for the TCP partial-send loop.
pub const TCP_SEND_TIMEOUT: Duration = Duration::from_millis(1500);

/// Continuous bad sends for this long count as a dead link.
pub const MAX_DURATION_SOCKET_ERRORS: Duration = Duration::from_millis(1000);

/// Where the datagrams go.
pub enum SinkIo {
    Net(NetSocket),
    File(FileTap),
}

/// Why the sender returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderExit {
    /// The supervisor requested a stop.
    Stopped,
    /// The link died; the supervisor should re-establish it.
    LinkDown,
}

/// The datagram currently being sent, copied out of its slot so a TCP
/// partial send can resume mid-datagram across wakeups.
struct Pending {
    buf: [u8; URTP_MAX_DATAGRAM_SIZE],
    len: usize,
    offset: usize,
    sequence: u16,
}

enum SendOutcome {
    Sent,
    /// Retry on the next wakeup; parameter for the failure log.
    Transient(i32),
    /// Fatal error class; parameter for the log.
    LinkDown(i32),
}

pub async fn sender_task(
    shared: Arc<SessionShared>,
    log: Arc<AppEventLog>,
    stats: Arc<SendStats>,
    clock: Clock,
    mut sink: SinkIo,
    indicators: IndicatorHandle,
) -> SenderExit {
    let mut expected_seq: Option<u16> = None;
    let mut pending: Option<Pending> = None;
    let mut bad_since: Option<Instant> = None;

    let exit = 'run: loop {
        if shared.stop_requested() {
            break 'run SenderExit::Stopped;
        }
        let _ = timeout(KEEP_ALIVE_TIMEOUT, shared.ready.wait()).await;

        // Drain everything pending.
        loop {
            if shared.stop_requested() {
                break 'run SenderExit::Stopped;
            }

            if pending.is_none() {
                let mut buf = [0u8; URTP_MAX_DATAGRAM_SIZE];
                let Some(len) = shared.ring.read_head(&mut buf) else {
                    break;
                };
                let sequence = peek_sequence(&buf[..len]).unwrap_or(0);
                if let Some(expected) = expected_seq {
                    if sequence != expected {
                        log.record(
                            clock.now_us(),
                            LogEvent::SendSeqSkip,
                            sequence as i32,
                        );
                    }
                }
                expected_seq = Some(sequence.wrapping_add(1));
                pending = Some(Pending { buf, len, offset: 0, sequence });
            }
            let (len, sequence) = {
                let datagram = pending.as_ref().unwrap();
                (datagram.len, datagram.sequence)
            };

            log.record(clock.now_us(), LogEvent::SendStart, sequence as i32);
            let started = Instant::now();

            let outcome =
                send_step(&mut sink, pending.as_mut().unwrap(), &log, clock)
                    .await;
            match outcome {
                SendOutcome::Sent => {
                    let duration_us = started.elapsed().as_micros() as u64;
                    let record = stats.record_send(duration_us, len);

                    log.record(
                        clock.now_us(),
                        LogEvent::SendStop,
                        sequence as i32,
                    );
                    let duration_event = if record.over_budget {
                        LogEvent::SendDurationGreaterThanBlockDuration
                    } else {
                        LogEvent::SendDuration
                    };
                    log.record(
                        clock.now_us(),
                        duration_event,
                        duration_us as i32,
                    );
                    if record.new_peak {
                        log.record(
                            clock.now_us(),
                            LogEvent::NewPeakSendDuration,
                            duration_us as i32,
                        );
                    }

                    shared.ring.release_head();
                    log.record(
                        clock.now_us(),
                        LogEvent::DatagramFree,
                        sequence as i32,
                    );
                    log.record(
                        clock.now_us(),
                        LogEvent::NumDatagramsFree,
                        shared.ring.free_count() as i32,
                    );
                    indicators.send(IndicatorEvent::ToggleGreen);

                    pending = None;
                    bad_since = None;
                }
                SendOutcome::Transient(parameter) => {
                    stats.record_failure();
                    log.record(clock.now_us(), LogEvent::SendFailure, parameter);
                    indicators.send(IndicatorEvent::Bad);

                    // The window opens when the first failure is
                    // observed, not when its attempt began: a TCP
                    // attempt blocks for up to the send deadline
                    // before it reports, and a single deadline
                    // overrun is transient.
                    let now = Instant::now();
                    let since = *bad_since.get_or_insert(now);
                    if now.duration_since(since) >= MAX_DURATION_SOCKET_ERRORS
                    {
                        log.record(
                            clock.now_us(),
                            LogEvent::SocketErrorsForTooLong,
                            now.duration_since(since).as_millis() as i32,
                        );
                        shared.set_network_connected(false);
                        break 'run SenderExit::LinkDown;
                    }
                    // Slot retained; retry on the next wakeup.
                    break;
                }
                SendOutcome::LinkDown(parameter) => {
                    stats.record_failure();
                    log.record(clock.now_us(), LogEvent::SendFailure, parameter);
                    log.record(clock.now_us(), LogEvent::SocketBad, parameter);
                    indicators.send(IndicatorEvent::Bad);
                    shared.set_network_connected(false);
                    break 'run SenderExit::LinkDown;
                }
            }
        }
    };

    if let SinkIo::File(tap) = &mut sink {
        match tap.finish() {
            Ok(()) => log.record(clock.now_us(), LogEvent::FileClose, 0),
            Err(e) => log.record(
                clock.now_us(),
                LogEvent::FileWriteFailure,
                e.raw_os_error().unwrap_or(-1),
            ),
        }
    }

    exit
}

async fn send_step(
    sink: &mut SinkIo,
    datagram: &mut Pending,
    log: &Arc<AppEventLog>,
    clock: Clock,
) -> SendOutcome {
    match sink {
        SinkIo::Net(NetSocket::Udp(socket)) => {
            match socket.send(&datagram.buf[..datagram.len]).await {
                Ok(n) if n == datagram.len => SendOutcome::Sent,
                Ok(n) => SendOutcome::Transient(n as i32),
                Err(e) => classify(e),
            }
        }
        SinkIo::Net(NetSocket::Tcp(stream)) => {
            let deadline = tokio::time::Instant::now() + TCP_SEND_TIMEOUT;
            while datagram.offset < datagram.len {
                let write = stream
                    .write(&datagram.buf[datagram.offset..datagram.len]);
                match timeout_at(deadline, write).await {
                    Ok(Ok(0)) => return SendOutcome::LinkDown(0),
                    Ok(Ok(n)) => datagram.offset += n,
                    Ok(Err(e)) => return classify(e),
                    Err(_) => {
                        log.record(
                            clock.now_us(),
                            LogEvent::TcpSendTimeout,
                            datagram.offset as i32,
                        );
                        // Bytes already written stay written; resume
                        // from the offset next wakeup.
                        return SendOutcome::Transient(datagram.offset as i32);
                    }
                }
            }
            datagram.offset = 0;
            SendOutcome::Sent
        }
        SinkIo::File(tap) => {
            log.record(
                clock.now_us(),
                LogEvent::FileWriteStart,
                datagram.sequence as i32,
            );
            let body = &datagram.buf[URTP_HEADER_SIZE..datagram.len];
            match tap.push(body) {
                Ok(_) => {
                    log.record(
                        clock.now_us(),
                        LogEvent::FileWriteStop,
                        datagram.sequence as i32,
                    );
                }
                Err(e) => {
                    // Best-effort sink: log and keep streaming.
                    log.record(
                        clock.now_us(),
                        LogEvent::FileWriteFailure,
                        e.raw_os_error().unwrap_or(-1),
                    );
                }
            }
            SendOutcome::Sent
        }
    }
}

fn classify(error: io::Error) -> SendOutcome {
    let parameter = error.raw_os_error().unwrap_or(-1);
    if is_link_down(&error) {
        SendOutcome::LinkDown(parameter)
    } else {
        SendOutcome::Transient(parameter)
    }
}
