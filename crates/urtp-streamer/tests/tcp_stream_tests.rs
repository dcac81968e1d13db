//! TCP streaming and link-death recovery.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpSocket};
use tokio::time::timeout;
use urtp_icd::{
    Coding, DatagramHeader, StreamConfig, Transport, URTP_SYNC_BYTE,
};
use urtp_pipeline::{LogEvent, SendStats};
use urtp_streamer::net::NetSocket;
use urtp_streamer::session::AppEventLog;
use urtp_streamer::tasks::{indicator, sender_task, SenderExit, SinkIo};
use urtp_streamer::{run, Clock, SessionShared};

fn config_for(port: u16, duration_ms: u32) -> StreamConfig {
    let mut config = StreamConfig::to_server(
        heapless::String::try_from("127.0.0.1").unwrap(),
        port,
    );
    config.transport = Transport::Tcp;
    config.duration_ms = duration_ms;
    config
}

#[tokio::test(flavor = "multi_thread")]
async fn tcp_stream_is_contiguous_fixed_size_datagrams() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let reader = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut bytes = Vec::new();
        // Read until the endpoint closes the connection at shutdown.
        let _ = timeout(
            Duration::from_secs(10),
            stream.read_to_end(&mut bytes),
        )
        .await;
        bytes
    });

    run(config_for(port, 400)).await.unwrap();

    let bytes = reader.await.unwrap();
    let size = Coding::Pcm16.datagram_size();
    assert!(bytes.len() >= 5 * size, "got only {} bytes", bytes.len());
    assert_eq!(bytes.len() % size, 0, "stream must be whole datagrams");

    for (i, datagram) in bytes.chunks_exact(size).enumerate() {
        assert_eq!(datagram[0], URTP_SYNC_BYTE);
        let header = DatagramHeader::parse(datagram).unwrap();
        assert_eq!(header.sequence, i as u16);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn tcp_link_drop_restarts_the_session_with_sequence_zero() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        // First session: take a few datagrams, then kill the
        // connection hard so the next send sees a reset.
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 3 * Coding::Pcm16.datagram_size()];
        stream.read_exact(&mut buf).await.unwrap();
        let last_before_drop =
            DatagramHeader::parse(&buf[2 * Coding::Pcm16.datagram_size()..])
                .unwrap();
        stream.set_linger(Some(Duration::ZERO)).unwrap();
        drop(stream);

        // The supervisor waits five seconds, then brings a new
        // session up; its first datagram restarts the counters.
        let accept = timeout(Duration::from_secs(9), listener.accept())
            .await
            .expect("endpoint never re-established the link");
        let (mut stream, _) = accept.unwrap();
        let mut first = vec![0u8; Coding::Pcm16.datagram_size()];
        stream.read_exact(&mut first).await.unwrap();
        (last_before_drop, DatagramHeader::parse(&first).unwrap())
    });

    run(config_for(port, 8_000)).await.unwrap();

    let (last_before_drop, first_after) = server.await.unwrap();
    assert!(last_before_drop.sequence >= 2);
    assert_eq!(first_after.sequence, 0, "new session restarts at zero");
    assert!(
        first_after.timestamp_us < 1_000_000,
        "new session restarts its timestamps, got {}",
        first_after.timestamp_us
    );
}

fn has_event(log: &AppEventLog, event: LogEvent) -> bool {
    let mut found = false;
    log.for_each(|e| found |= e.event == event);
    found
}

#[tokio::test(flavor = "multi_thread")]
async fn tcp_send_deadline_is_transient_until_the_window_elapses() {
    // A peer that accepts and then stalls: the connection stays up but
    // nothing is ever read, so once the socket buffers fill the
    // sender's writes hit the per-datagram deadline instead of an
    // error. Small buffers on both ends make that happen within a few
    // datagrams.
    let server_socket = TcpSocket::new_v4().unwrap();
    let _ = server_socket.set_recv_buffer_size(4096);
    server_socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let listener = server_socket.listen(8).unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        // Hold the connection open, reading nothing.
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(stream);
    });

    let client = TcpSocket::new_v4().unwrap();
    let _ = client.set_send_buffer_size(4096);
    let stream = client.connect(addr).await.unwrap();
    stream.set_nodelay(true).unwrap();

    let shared = Arc::new(SessionShared::new(Coding::Pcm16.datagram_size()));
    let log = Arc::new(AppEventLog::new());
    let stats = Arc::new(SendStats::new());
    let clock = Clock::start();
    let (indicators, _indicator_rx) = indicator::channel();

    // Far more audio than the socket buffers can absorb.
    for sequence in 0..80u16 {
        shared.ring.produce(|buf| {
            DatagramHeader {
                coding: Coding::Pcm16,
                sequence,
                timestamp_us: sequence as u64 * 20_000,
                body_length: Coding::Pcm16.body_size() as u16,
            }
            .write_to(buf);
        });
    }
    shared.ready.signal(());

    let mut sender = tokio::spawn(sender_task(
        shared.clone(),
        log.clone(),
        stats,
        clock,
        SinkIo::Net(NetSocket::Tcp(stream)),
        indicators,
    ));

    // Wait for the first deadline overrun.
    let mut waited = Duration::ZERO;
    while !has_event(&log, LogEvent::TcpSendTimeout) {
        assert!(
            waited < Duration::from_secs(4),
            "sender never hit the TCP send deadline"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        waited += Duration::from_millis(50);
    }

    // One overrun is transient: the sender keeps running and the
    // network still counts as connected.
    assert!(!sender.is_finished());
    assert!(shared.network_connected());

    // The peer stays stalled, so the bad sends become continuous and
    // the sender gives the link up.
    let exit = timeout(Duration::from_secs(10), &mut sender)
        .await
        .expect("sender did not give up on the stalled link")
        .unwrap();
    assert_eq!(exit, SenderExit::LinkDown);
    assert!(!shared.network_connected());
    assert!(has_event(&log, LogEvent::SocketErrorsForTooLong));
}
