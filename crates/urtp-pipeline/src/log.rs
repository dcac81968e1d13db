//! Fixed-capacity RAM event log.
//!
//! Every context — the DMA callback, the sender, the supervisor — writes
//! timestamped events here through a short critical section; the log is
//! printed once at shutdown. When full it wraps, keeping the most recent
//! [`MAX_LOG_ENTRIES`] entries.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

/// Capacity of the event log.
pub const MAX_LOG_ENTRIES: usize = 5000;

/// Everything the endpoint records in its RAM log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LogEvent {
    None,
    LogStart,
    LogStop,
    FileOpen,
    FileOpenFailure,
    FileClose,
    NetworkStart,
    NetworkStartFailure,
    NetworkStop,
    TcpConnected,
    TcpConnectionProblem,
    TcpConfigured,
    TcpConfigurationProblem,
    I2sStart,
    I2sStop,
    ButtonPressed,
    I2sDmaRxHalfFull,
    I2sDmaRxFull,
    I2sDmaUnknown,
    DatagramAlloc,
    DatagramReadyToSend,
    DatagramFree,
    DatagramOverflowBegins,
    DatagramNumOverflows,
    MonoSampleUnusedBitsMin,
    MonoSampleAudioShift,
    PossibleBadAudio,
    SendStart,
    SendStop,
    SendFailure,
    SocketBad,
    SocketErrorsForTooLong,
    TcpSendTimeout,
    SendSeqSkip,
    FileWriteStart,
    FileWriteStop,
    FileWriteFailure,
    SendDurationGreaterThanBlockDuration,
    SendDuration,
    NewPeakSendDuration,
    NumDatagramsFree,
    ThroughputBitsPerSecond,
}

impl LogEvent {
    pub fn name(self) -> &'static str {
        match self {
            LogEvent::None => "EMPTY",
            LogEvent::LogStart => "LOG_START",
            LogEvent::LogStop => "LOG_STOP",
            LogEvent::FileOpen => "FILE_OPEN",
            LogEvent::FileOpenFailure => "FILE_OPEN_FAILURE",
            LogEvent::FileClose => "FILE_CLOSE",
            LogEvent::NetworkStart => "NETWORK_START",
            LogEvent::NetworkStartFailure => "NETWORK_START_FAILURE",
            LogEvent::NetworkStop => "NETWORK_STOP",
            LogEvent::TcpConnected => "TCP_CONNECTED",
            LogEvent::TcpConnectionProblem => "TCP_CONNECTION_PROBLEM",
            LogEvent::TcpConfigured => "TCP_CONFIGURED",
            LogEvent::TcpConfigurationProblem => "TCP_CONFIGURATION_PROBLEM",
            LogEvent::I2sStart => "I2S_START",
            LogEvent::I2sStop => "I2S_STOP",
            LogEvent::ButtonPressed => "BUTTON_PRESSED",
            LogEvent::I2sDmaRxHalfFull => "I2S_DMA_RX_HALF_FULL",
            LogEvent::I2sDmaRxFull => "I2S_DMA_RX_FULL",
            LogEvent::I2sDmaUnknown => "I2S_DMA_UNKNOWN",
            LogEvent::DatagramAlloc => "DATAGRAM_ALLOC",
            LogEvent::DatagramReadyToSend => "DATAGRAM_READY_TO_SEND",
            LogEvent::DatagramFree => "DATAGRAM_FREE",
            LogEvent::DatagramOverflowBegins => "DATAGRAM_OVERFLOW_BEGINS",
            LogEvent::DatagramNumOverflows => "DATAGRAM_NUM_OVERFLOWS",
            LogEvent::MonoSampleUnusedBitsMin => "MONO_SAMPLE_UNUSED_BITS_MIN",
            LogEvent::MonoSampleAudioShift => "MONO_SAMPLE_AUDIO_SHIFT",
            LogEvent::PossibleBadAudio => "POSSIBLE_BAD_AUDIO",
            LogEvent::SendStart => "SEND_START",
            LogEvent::SendStop => "SEND_STOP",
            LogEvent::SendFailure => "SEND_FAILURE",
            LogEvent::SocketBad => "SOCKET_BAD",
            LogEvent::SocketErrorsForTooLong => "SOCKET_ERRORS_FOR_TOO_LONG",
            LogEvent::TcpSendTimeout => "TCP_SEND_TIMEOUT",
            LogEvent::SendSeqSkip => "SEND_SEQ_SKIP",
            LogEvent::FileWriteStart => "FILE_WRITE_START",
            LogEvent::FileWriteStop => "FILE_WRITE_STOP",
            LogEvent::FileWriteFailure => "FILE_WRITE_FAILURE",
            LogEvent::SendDurationGreaterThanBlockDuration => {
                "SEND_DURATION_GREATER_THAN_BLOCK_DURATION"
            }
            LogEvent::SendDuration => "SEND_DURATION",
            LogEvent::NewPeakSendDuration => "NEW_PEAK_SEND_DURATION",
            LogEvent::NumDatagramsFree => "NUM_DATAGRAMS_FREE",
            LogEvent::ThroughputBitsPerSecond => "THROUGHPUT_BITS_S",
        }
    }

    /// Events worth a `*` marker when the log is printed.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            LogEvent::FileOpenFailure
                | LogEvent::NetworkStartFailure
                | LogEvent::TcpConnectionProblem
                | LogEvent::TcpConfigurationProblem
                | LogEvent::I2sDmaUnknown
                | LogEvent::DatagramOverflowBegins
                | LogEvent::PossibleBadAudio
                | LogEvent::SendFailure
                | LogEvent::SocketBad
                | LogEvent::SocketErrorsForTooLong
                | LogEvent::TcpSendTimeout
                | LogEvent::SendSeqSkip
                | LogEvent::FileWriteFailure
                | LogEvent::SendDurationGreaterThanBlockDuration
        )
    }
}

/// One record in the RAM log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LogEntry {
    pub timestamp_us: u64,
    pub event: LogEvent,
    pub parameter: i32,
}

impl LogEntry {
    const EMPTY: Self =
        Self { timestamp_us: 0, event: LogEvent::None, parameter: 0 };
}

struct LogInner<const N: usize> {
    entries: [LogEntry; N],
    next: usize,
    count: usize,
}

/// The RAM event log, shared by every context.
///
/// `M` picks the locking discipline: `CriticalSectionRawMutex` when the
/// producer runs in interrupt context, `NoopRawMutex` in single-threaded
/// tests.
pub struct EventLog<M: RawMutex, const N: usize = MAX_LOG_ENTRIES> {
    inner: Mutex<M, RefCell<LogInner<N>>>,
}

impl<M: RawMutex, const N: usize> EventLog<M, N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(LogInner {
                entries: [LogEntry::EMPTY; N],
                next: 0,
                count: 0,
            })),
        }
    }

    /// Append one event, overwriting the oldest once full.
    pub fn record(&self, timestamp_us: u64, event: LogEvent, parameter: i32) {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            let next = inner.next;
            inner.entries[next] =
                LogEntry { timestamp_us, event, parameter };
            inner.next = (next + 1) % N;
            if inner.count < N {
                inner.count += 1;
            }
        });
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.inner.lock(|inner| inner.borrow().count)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit the retained entries, oldest first.
    pub fn for_each(&self, mut f: impl FnMut(&LogEntry)) {
        self.inner.lock(|inner| {
            let inner = inner.borrow();
            let start = (inner.next + N - inner.count) % N;
            for i in 0..inner.count {
                f(&inner.entries[(start + i) % N]);
            }
        });
    }
}

impl<M: RawMutex, const N: usize> Default for EventLog<M, N> {
    fn default() -> Self {
        Self::new()
    }
}
