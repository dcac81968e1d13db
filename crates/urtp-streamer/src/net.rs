//! Socket bring-up and the error classes the sender reacts to.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tokio::time::timeout;
use urtp_icd::Transport;
use urtp_pipeline::LogEvent;

use crate::clock::Clock;
use crate::session::AppEventLog;

/// DNS and connect budget during setup.
pub const SETUP_TIMEOUT: Duration = Duration::from_secs(10);

/// The connected socket the sender drains into.
pub enum NetSocket {
    Udp(UdpSocket),
    Tcp(TcpStream),
}

/// Resolve the server, bounded by [`SETUP_TIMEOUT`].
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let mut addrs = timeout(SETUP_TIMEOUT, lookup_host((host, port)))
        .await
        .map_err(|_| anyhow!("timed out resolving {host}"))?
        .with_context(|| format!("unable to locate server {host}"))?;
    addrs.next().ok_or_else(|| anyhow!("no addresses for {host}"))
}

/// Open and connect the streaming socket.
///
/// TCP gets `TCP_NODELAY` immediately after connect; a datagram must
/// not sit in Nagle's buffer for longer than it took to record.
pub async fn connect(
    transport: Transport,
    server: SocketAddr,
    log: &Arc<AppEventLog>,
    clock: Clock,
) -> Result<NetSocket> {
    match transport {
        Transport::Udp => {
            let bind_addr: SocketAddr = if server.is_ipv4() {
                "0.0.0.0:0".parse().unwrap()
            } else {
                "[::]:0".parse().unwrap()
            };
            let socket = UdpSocket::bind(bind_addr)
                .await
                .context("unable to open a UDP socket")?;
            socket
                .connect(server)
                .await
                .with_context(|| format!("unable to connect to {server}"))?;
            Ok(NetSocket::Udp(socket))
        }
        Transport::Tcp => {
            let stream =
                match timeout(SETUP_TIMEOUT, TcpStream::connect(server)).await
                {
                    Ok(Ok(stream)) => stream,
                    Ok(Err(e)) => {
                        log.record(
                            clock.now_us(),
                            LogEvent::TcpConnectionProblem,
                            e.raw_os_error().unwrap_or(-1),
                        );
                        return Err(e).with_context(|| {
                            format!("unable to connect to {server}")
                        });
                    }
                    Err(_) => {
                        log.record(
                            clock.now_us(),
                            LogEvent::TcpConnectionProblem,
                            0,
                        );
                        return Err(anyhow!(
                            "timed out connecting to {server}"
                        ));
                    }
                };
            log.record(clock.now_us(), LogEvent::TcpConnected, 0);

            match stream.set_nodelay(true) {
                Ok(()) => {
                    log.record(clock.now_us(), LogEvent::TcpConfigured, 0)
                }
                Err(e) => {
                    log.record(
                        clock.now_us(),
                        LogEvent::TcpConfigurationProblem,
                        e.raw_os_error().unwrap_or(-1),
                    );
                    return Err(e)
                        .context("unable to set TCP_NODELAY on the socket");
                }
            }

            Ok(NetSocket::Tcp(stream))
        }
    }
}

/// Errors that mean the link itself is gone, as opposed to one bad
/// send. The sender surfaces these to the supervisor.
pub fn is_link_down(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::NotConnected
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}
