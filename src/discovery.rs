//! LAN discovery over UDP.
//!
//! Clients send [`DISCOVERY_REQUEST`] to a multicast group; the server
//! answers each request with the game address as `ip:port` text.

use derive_more::{Display, Error, From};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info, instrument, warn};

/// Payload a client sends to find servers.
pub const DISCOVERY_REQUEST: &str = "DISCOVER_SERVER";

/// Default number of requests a client sends before giving up.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Default time a client waits for a reply to each request.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(2);

const BUFFER_SIZE: usize = 1024;

/// Errors raised by the discovery responder and client.
#[derive(Debug, Display, Error, From)]
pub enum DiscoveryError {
    /// Socket setup or I/O failed.
    #[display("Discovery I/O error: {}", _0)]
    Io(std::io::Error),
    /// A reply was not an `ip:port` address.
    #[display("Malformed discovery reply: '{}'", _0)]
    #[from(skip)]
    MalformedAnnouncement(#[error(not(source))] String),
    /// No server replied.
    #[display("No server answered after {} attempt(s)", _0)]
    #[from(skip)]
    NotFound(#[error(not(source))] u32),
}

/// Answers discovery requests with the game server's address.
#[derive(Debug)]
pub struct DiscoveryResponder {
    socket: UdpSocket,
    announcement: String,
}

impl DiscoveryResponder {
    /// Binds `port` on all interfaces and joins the multicast `group`.
    #[instrument(skip(game_addr), fields(%game_addr))]
    pub async fn bind_multicast(
        port: u16,
        group: Ipv4Addr,
        game_addr: SocketAddr,
    ) -> Result<Self, DiscoveryError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?;
        info!(port, %group, "Discovery responder listening");
        Ok(Self::from_socket(socket, game_addr))
    }

    /// Wraps an already bound socket.
    pub fn from_socket(socket: UdpSocket, game_addr: SocketAddr) -> Self {
        Self {
            socket,
            announcement: game_addr.to_string(),
        }
    }

    /// Address the responder is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, DiscoveryError> {
        Ok(self.socket.local_addr()?)
    }

    /// Text sent in reply to each request.
    pub fn announcement(&self) -> &str {
        &self.announcement
    }

    /// Answers requests until the task is cancelled.
    ///
    /// Individual send or receive failures are logged and skipped.
    pub async fn serve(self) {
        let mut buf = [0u8; BUFFER_SIZE];
        loop {
            let (len, from) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(err) => {
                    warn!(error = %err, "Discovery receive failed");
                    continue;
                }
            };
            if !is_discovery_request(&buf[..len]) {
                debug!(%from, len, "Ignoring unrelated datagram");
                continue;
            }
            match self
                .socket
                .send_to(self.announcement.as_bytes(), from)
                .await
            {
                Ok(_) => debug!(%from, announcement = %self.announcement, "Answered discovery request"),
                Err(err) => warn!(%from, error = %err, "Discovery reply failed"),
            }
        }
    }
}

/// Returns true if `payload` is a discovery request.
pub fn is_discovery_request(payload: &[u8]) -> bool {
    std::str::from_utf8(payload)
        .map(|text| text.trim() == DISCOVERY_REQUEST)
        .unwrap_or(false)
}

/// Parses a responder's `ip:port` reply.
pub fn parse_announcement(payload: &[u8]) -> Result<SocketAddr, DiscoveryError> {
    let text = String::from_utf8_lossy(payload);
    text.trim()
        .parse()
        .map_err(|_| DiscoveryError::MalformedAnnouncement(text.trim().to_string()))
}

/// Asks `target` (a multicast group or a single host) for a game server.
///
/// Sends up to `attempts` requests, waiting `wait` for a reply to each.
/// Malformed replies are skipped.
#[instrument]
pub async fn discover(
    target: SocketAddr,
    attempts: u32,
    wait: Duration,
) -> Result<SocketAddr, DiscoveryError> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    if let IpAddr::V4(ip) = target.ip() {
        if ip.is_multicast() {
            socket.set_multicast_ttl_v4(1)?;
        }
    }

    let mut buf = [0u8; BUFFER_SIZE];
    for attempt in 1..=attempts {
        debug!(attempt, "Sending discovery request");
        socket.send_to(DISCOVERY_REQUEST.as_bytes(), target).await?;
        let reply = tokio::time::timeout(wait, socket.recv_from(&mut buf)).await;
        match reply {
            Ok(Ok((len, from))) => match parse_announcement(&buf[..len]) {
                Ok(addr) => {
                    info!(%addr, %from, "Server discovered");
                    return Ok(addr);
                }
                Err(err) => warn!(%from, error = %err, "Skipping reply"),
            },
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => debug!(attempt, "No reply"),
        }
    }
    Err(DiscoveryError::NotFound(attempts))
}

/// Address of the interface used for outbound traffic.
///
/// Connecting a UDP socket sends nothing; it only selects a route.
/// Falls back to loopback when no route exists.
pub fn outbound_ip() -> IpAddr {
    let probe = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
            socket.local_addr()
        });
    match probe {
        Ok(addr) if !addr.ip().is_unspecified() => addr.ip(),
        Ok(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Err(err) => {
            debug!(error = %err, "No outbound route, using loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn loopback_responder(game_addr: SocketAddr) -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let responder = DiscoveryResponder::from_socket(socket, game_addr);
        let addr = responder.local_addr().unwrap();
        (addr, tokio::spawn(responder.serve()))
    }

    #[tokio::test]
    async fn test_discover_over_loopback() {
        let game_addr: SocketAddr = "192.168.1.20:5050".parse().unwrap();
        let (addr, task) = loopback_responder(game_addr).await;

        let found = discover(addr, 3, Duration::from_millis(500)).await.unwrap();
        assert_eq!(found, game_addr);
        task.abort();
    }

    #[tokio::test]
    async fn test_unrelated_datagram_gets_no_reply() {
        let (addr, task) = loopback_responder("10.0.0.2:5050".parse().unwrap()).await;
        let client = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        client.send_to(b"HELLO", addr).await.unwrap();

        let mut buf = [0u8; 64];
        let reply =
            tokio::time::timeout(Duration::from_millis(200), client.recv_from(&mut buf)).await;
        assert!(reply.is_err());
        task.abort();
    }

    #[tokio::test]
    async fn test_silence_is_not_found() {
        // Bound but never read, so requests go unanswered.
        let silent = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = silent.local_addr().unwrap();

        let err = discover(addr, 2, Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::NotFound(2)));
    }

    #[test]
    fn test_request_matching() {
        assert!(is_discovery_request(b"DISCOVER_SERVER"));
        assert!(is_discovery_request(b"DISCOVER_SERVER\n"));
        assert!(!is_discovery_request(b"discover_server"));
        assert!(!is_discovery_request(&[0xff, 0xfe]));
    }

    #[test]
    fn test_parse_announcement() {
        assert_eq!(
            parse_announcement(b"127.0.0.1:5050").unwrap(),
            SocketAddr::from(([127, 0, 0, 1], 5050))
        );
        assert!(matches!(
            parse_announcement(b"not an address"),
            Err(DiscoveryError::MalformedAnnouncement(_))
        ));
    }

    #[test]
    fn test_io_failures_convert_with_question_mark() {
        fn bind_failed() -> Result<(), DiscoveryError> {
            Err::<(), _>(std::io::Error::other("address in use"))?;
            Ok(())
        }
        let err = bind_failed().unwrap_err();
        assert!(matches!(err, DiscoveryError::Io(_)));
        assert_eq!(err.to_string(), "Discovery I/O error: address in use");
    }
}
