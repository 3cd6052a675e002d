//! TCP listener. Each connection is a frame stream handled by its own task.

use super::Bridge;
use crate::core::{BridgeError, Result};
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Bind the TCP listener.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        BridgeError::network(format!("Failed to bind TCP listener to {}: {}", addr, e))
    })?;
    tracing::info!("TCP listener bound to {}", listener.local_addr()?);
    Ok(listener)
}

/// Accept connections until the task is cancelled.
pub async fn serve(listener: TcpListener, bridge: Bridge) -> Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!("Failed to accept TCP connection: {}", e);
                continue;
            },
        };

        let bridge = bridge.clone();
        tokio::spawn(async move {
            tracing::debug!("Connection opened from {}", peer);
            match bridge.process_stream(stream, peer).await {
                Ok(frames) => {
                    tracing::debug!("Connection from {} closed after {} frames", peer, frames);
                },
                Err(e) => tracing::warn!("Connection from {} failed: {}", peer, e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Config, Message, MetricConfig, MetricKind};
    use crate::protocol::encode_frame;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn test_connection_stream() {
        let mut config = Config::default();
        let mut rule = MetricConfig::new("by_logger_total", MetricKind::Counter);
        rule.labels.insert("logger".to_string(), "@logger".to_string());
        config.metrics.push(rule);
        let bridge = Bridge::new(&config).unwrap();

        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(serve(listener, bridge.clone()));

        // One frame split across two writes
        let frame = encode_frame(&Message::new().with_logger("tcp"));
        let (head, tail) = frame.split_at(frame.len() / 2);
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(head).await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        stream.write_all(tail).await.unwrap();
        stream.write_all(&frame).await.unwrap();
        stream.shutdown().await.unwrap();

        for _ in 0..100 {
            if bridge.metrics().messages_total() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        task.abort();

        assert_eq!(
            bridge.registry().value("by_logger_total", &[("logger", "tcp")]),
            Some(2.0)
        );
    }
}
