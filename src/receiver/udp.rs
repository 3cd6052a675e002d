//! UDP listener. Each datagram carries whole frames.

use super::Bridge;
use crate::core::{BridgeError, Result};
use crate::metrics::ErrorStage;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

/// Largest datagram we accept
const MAX_DATAGRAM_SIZE: usize = 65536;

/// Bind the UDP socket.
pub async fn bind(addr: SocketAddr) -> Result<UdpSocket> {
    let socket = UdpSocket::bind(addr).await.map_err(|e| {
        BridgeError::network(format!("Failed to bind UDP listener to {}: {}", addr, e))
    })?;
    tracing::info!("UDP listener bound to {}", socket.local_addr()?);
    Ok(socket)
}

/// Receive datagrams until the task is cancelled.
///
/// A failed receive is counted as a frame error; the socket keeps going.
pub async fn serve(socket: UdpSocket, bridge: Bridge) -> Result<()> {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, peer)) => {
                tracing::trace!("Received {} byte datagram from {}", len, peer);
                bridge.process_datagram(&buf[..len], peer);
            },
            Err(e) => {
                tracing::warn!("UDP receive error: {}", e);
                bridge.metrics().record_error(ErrorStage::Frame);
            },
        }
    }
}
