//! Loopback UDP streaming: wire invariants end to end.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use urtp_icd::{Coding, DatagramHeader, StreamConfig, URTP_SYNC_BYTE};
use urtp_streamer::run;

fn config_for(port: u16, coding: Coding, duration_ms: u32) -> StreamConfig {
    let mut config = StreamConfig::to_server(
        heapless::String::try_from("127.0.0.1").unwrap(),
        port,
    );
    config.coding = coding;
    config.duration_ms = duration_ms;
    config
}

/// Bind a receiver and collect datagrams in the background.
async fn spawn_receiver() -> (u16, Arc<Mutex<Vec<Vec<u8>>>>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    let received = Arc::new(Mutex::new(Vec::new()));

    let sink = received.clone();
    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        while let Ok((n, _)) = socket.recv_from(&mut buf).await {
            sink.lock().await.push(buf[..n].to_vec());
        }
    });

    (port, received)
}

#[tokio::test(flavor = "multi_thread")]
async fn udp_pcm16_stream_keeps_the_wire_invariants() {
    let (port, received) = spawn_receiver().await;

    run(config_for(port, Coding::Pcm16, 400)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let datagrams = received.lock().await;
    assert!(
        datagrams.len() >= 5,
        "expected a steady stream, got {} datagrams",
        datagrams.len()
    );

    let mut last_timestamp = 0u64;
    for (i, datagram) in datagrams.iter().enumerate() {
        assert_eq!(datagram.len(), Coding::Pcm16.datagram_size());
        assert_eq!(datagram[0], URTP_SYNC_BYTE);

        let header = DatagramHeader::parse(datagram).unwrap();
        assert_eq!(header.coding, Coding::Pcm16);
        assert_eq!(header.sequence, i as u16, "lossless loopback sequence");
        assert_eq!(header.body_length as usize, Coding::Pcm16.body_size());
        assert!(
            header.timestamp_us >= last_timestamp,
            "timestamps must be monotone"
        );
        last_timestamp = header.timestamp_us;

        // The simulated microphone hears silence.
        assert!(datagram[14..].iter().all(|&b| b == 0));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn udp_unicam8_datagrams_have_the_companded_size() {
    let (port, received) = spawn_receiver().await;

    run(config_for(port, Coding::Unicam8, 300)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let datagrams = received.lock().await;
    assert!(!datagrams.is_empty());
    for datagram in datagrams.iter() {
        assert_eq!(datagram.len(), Coding::Unicam8.datagram_size());
        assert_eq!(datagram[1], Coding::Unicam8.wire_byte());
        let header = DatagramHeader::parse(datagram).unwrap();
        assert_eq!(header.body_length as usize, Coding::Unicam8.body_size());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn fixed_tone_puts_audio_on_the_wire() {
    let (port, received) = spawn_receiver().await;

    let mut config = config_for(port, Coding::Pcm16, 300);
    config.fixed_tone = true;
    config.gain = urtp_icd::GainSetting::Fixed(8);
    run(config).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let datagrams = received.lock().await;
    assert!(!datagrams.is_empty());
    assert!(
        datagrams
            .iter()
            .any(|d| d[14..].iter().any(|&b| b != 0)),
        "the debug tone must be audible in the bodies"
    );
}
