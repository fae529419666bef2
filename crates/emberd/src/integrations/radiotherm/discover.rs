//! Discovery of Radio Thermostats on the local network.
//!
//! Thermostats answer a `WM-DISCOVER` probe sent to the SSDP multicast group
//! with a reply carrying `LOCATION: http://<address>/sys/`.

use std::net::Ipv4Addr;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::debug;

const MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
const MULTICAST_PORT: u16 = 1900;

const PROBE: &[u8] =
    b"TYPE: WM-DISCOVER\r\nVERSION: 1.0\r\n\r\nservices: com.marvell.wm.system*\r\n\r\n";

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Discovery socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No Radio Thermostats detected")]
    NotFound,
}

/// Extract the thermostat address from a discovery reply
pub fn parse_location(reply: &str) -> Option<String> {
    reply.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if !key.trim().eq_ignore_ascii_case("location") {
            return None;
        }
        let value = value.trim();
        let without_scheme = value
            .strip_prefix("http://")
            .or_else(|| value.strip_prefix("https://"))
            .unwrap_or(value);
        let address = without_scheme.split('/').next()?.trim();
        (!address.is_empty()).then(|| address.to_string())
    })
}

/// Probe the network and collect the addresses of every thermostat that
/// answers within `timeout`.
pub async fn discover_addresses(timeout: Duration) -> Result<Vec<String>, DiscoveryError> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.set_multicast_ttl_v4(2)?;

    let target = SocketAddr::from((MULTICAST_ADDR, MULTICAST_PORT));
    socket.send_to(PROBE, target).await?;
    debug!("Sent Radio Thermostat discovery probe to {}", target);

    let deadline = Instant::now() + timeout;
    let mut addresses = Vec::new();
    let mut buf = [0u8; 1024];

    loop {
        let received = tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await;
        let (len, from) = match received {
            Ok(result) => result?,
            Err(_) => break,
        };

        let reply = String::from_utf8_lossy(&buf[..len]);
        match parse_location(&reply) {
            Some(address) if !addresses.contains(&address) => {
                debug!("Radio Thermostat answered from {}: {}", from, address);
                addresses.push(address);
            }
            Some(_) => {}
            None => debug!("Ignoring discovery reply from {}", from),
        }
    }

    if addresses.is_empty() {
        Err(DiscoveryError::NotFound)
    } else {
        Ok(addresses)
    }
}
