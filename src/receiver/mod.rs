//! Ingestion: listeners, per-connection loops and the scrape server.
//!
//! Every bound UDP socket and every accepted TCP connection gets its own
//! task running the same pipeline: split frames, decode, dispatch to the
//! rule engine. A broken connection only ends its own task.

pub mod http;
pub mod tcp;
pub mod udp;

use crate::core::{BridgeError, Config, IngestConfig, Message, Result, ServerConfig};
use crate::metrics::{BridgeMetrics, ErrorStage, MetricsRegistry};
use crate::protocol::{self, Frame, FrameReader, FrameSplitter, SplitRecord};
use crate::rules::{Dispatch, RuleEngine};
use bytes::BytesMut;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncRead;
use tokio::net::{TcpListener, UdpSocket};

/// Record pipeline shared by every listener task.
#[derive(Clone)]
pub struct Bridge {
    engine: Arc<RuleEngine>,
    registry: MetricsRegistry,
    metrics: BridgeMetrics,
    ingest: IngestConfig,
}

impl Bridge {
    /// Build the pipeline with a fresh registry.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_registry(config, MetricsRegistry::new())
    }

    /// Build the pipeline, registering every metric in `registry`.
    pub fn with_registry(config: &Config, registry: MetricsRegistry) -> Result<Self> {
        let metrics = BridgeMetrics::register(&registry)?;
        let engine = RuleEngine::from_config(&config.metrics, &registry)?;
        Ok(Self {
            engine: Arc::new(engine),
            registry,
            metrics,
            ingest: config.ingest.clone(),
        })
    }

    /// Registry every rule writes to.
    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    /// Operational metrics.
    pub fn metrics(&self) -> &BridgeMetrics {
        &self.metrics
    }

    /// Loaded rules.
    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    /// Framing settings.
    pub fn ingest(&self) -> &IngestConfig {
        &self.ingest
    }

    /// Handle one record from the splitter. Corrupt records are counted and
    /// their frame, if any, is dropped.
    pub fn handle_record(&self, record: SplitRecord, peer: SocketAddr) {
        if record.is_corrupt() {
            tracing::warn!(
                "Stream corruption from {}: consumed {} bytes, discarded {}",
                peer,
                record.consumed,
                record.discarded()
            );
            self.metrics.record_error(ErrorStage::Frame);
            return;
        }

        if let Some(frame) = record.frame {
            self.handle_frame(&frame, peer);
        }
    }

    /// Decode and dispatch one clean frame.
    pub fn handle_frame(&self, frame: &Frame, peer: SocketAddr) {
        let started = Instant::now();

        let message = match protocol::decode_frame(frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Failed to decode message from {}: {}", peer, e);
                self.metrics.record_error(ErrorStage::Unmarshal);
                return;
            },
        };

        if self.handle_message(&message).is_ok() {
            self.metrics.observe_duration(started.elapsed());
        }
    }

    /// Dispatch a decoded message to every rule.
    pub fn handle_message(&self, message: &Message) -> Dispatch {
        self.metrics.message_decoded();
        let dispatch = self.engine.process(message);
        if !dispatch.is_ok() {
            self.metrics
                .record_errors(ErrorStage::Process, dispatch.failures.len() as u64);
            for (rule, e) in &dispatch.failures {
                tracing::debug!("Rule {} failed: {}", rule, e);
            }
        }
        dispatch
    }

    /// Run the pipeline over a byte stream until it closes.
    ///
    /// Returns the number of clean frames seen. A read error is counted as a
    /// frame error and ends the stream.
    pub async fn process_stream<R: AsyncRead + Unpin>(
        &self,
        source: R,
        peer: SocketAddr,
    ) -> Result<u64> {
        let mut reader =
            FrameReader::new(source, self.ingest.max_message_size, self.ingest.read_buffer_size);
        let mut frames = 0;

        loop {
            match reader.next_record().await {
                Ok(Some(record)) => {
                    if !record.is_corrupt() {
                        frames += 1;
                    }
                    self.handle_record(record, peer);
                },
                Ok(None) => return Ok(frames),
                Err(e) => {
                    self.metrics.record_error(ErrorStage::Frame);
                    return Err(e.into());
                },
            }
        }
    }

    /// Run the pipeline over one datagram. Frames never span datagrams, so
    /// leftover bytes count as corruption.
    pub fn process_datagram(&self, datagram: &[u8], peer: SocketAddr) {
        let mut buf = BytesMut::from(datagram);
        let mut splitter = FrameSplitter::new(self.ingest.max_message_size);

        while let Some(record) = splitter.split(&mut buf) {
            self.handle_record(record, peer);
        }
        if let Some(record) = splitter.finish(&mut buf) {
            self.handle_record(record, peer);
        }
    }
}

/// Bound sockets, ready to serve.
pub struct Listeners {
    udp: Option<UdpSocket>,
    tcp: Option<TcpListener>,
    http: TcpListener,
}

impl Listeners {
    /// Bind every configured address.
    pub async fn bind(server: &ServerConfig) -> Result<Self> {
        let udp = match server.udp_address {
            Some(addr) => Some(udp::bind(addr).await?),
            None => None,
        };
        let tcp = match server.tcp_address {
            Some(addr) => Some(tcp::bind(addr).await?),
            None => None,
        };
        let http = TcpListener::bind(server.http_address).await.map_err(|e| {
            BridgeError::network(format!(
                "Failed to bind HTTP server to {}: {}",
                server.http_address, e
            ))
        })?;

        Ok(Self { udp, tcp, http })
    }

    /// Bound UDP address, if any.
    pub fn udp_addr(&self) -> Option<SocketAddr> {
        self.udp.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Bound TCP address, if any.
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.tcp.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Bound scrape address.
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http.local_addr().ok()
    }

    /// Serve until Ctrl-C or until a listener stops.
    pub async fn serve(self, bridge: Bridge) -> Result<()> {
        self.serve_until(bridge, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Received shutdown signal, stopping listeners");
        })
        .await
    }

    /// Serve until `shutdown` resolves or until a listener stops.
    pub async fn serve_until<F>(self, bridge: Bridge, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut names = Vec::new();
        let mut tasks = Vec::new();

        if let Some(socket) = self.udp {
            names.push("UDP");
            tasks.push(tokio::spawn(udp::serve(socket, bridge.clone())));
        }
        if let Some(listener) = self.tcp {
            names.push("TCP");
            tasks.push(tokio::spawn(tcp::serve(listener, bridge.clone())));
        }
        names.push("HTTP");
        tasks.push(tokio::spawn(http::serve(self.http, bridge)));

        let stopped = tokio::select! {
            () = shutdown => None,
            (result, index, _) = futures::future::select_all(tasks.iter_mut()) => Some((index, result)),
        };

        for task in &tasks {
            task.abort();
        }

        match stopped {
            None => Ok(()),
            Some((index, result)) => {
                let name = names[index];
                match result {
                    Ok(Ok(())) => {
                        tracing::warn!("{} listener stopped unexpectedly", name);
                        Err(BridgeError::network(format!(
                            "{} listener stopped",
                            name
                        )))
                    },
                    Ok(Err(e)) => {
                        tracing::error!("{} listener failed: {}", name, e);
                        Err(e)
                    },
                    Err(e) => Err(e.into()),
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MetricConfig, MetricKind};
    use crate::protocol::encode_frame;

    fn bridge() -> Bridge {
        let mut config = Config::default();
        let mut rule = MetricConfig::new("status_total", MetricKind::Counter);
        rule.labels.insert("code".to_string(), "status".to_string());
        config.metrics.push(rule);
        Bridge::new(&config).unwrap()
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:5565".parse().unwrap()
    }

    fn frame(status: i64) -> bytes::Bytes {
        encode_frame(&Message::new().with_field("status", status))
    }

    #[test]
    fn test_datagram_with_several_frames() {
        let bridge = bridge();
        let mut datagram = frame(200).to_vec();
        datagram.extend_from_slice(&frame(500));
        bridge.process_datagram(&datagram, peer());

        let registry = bridge.registry();
        assert_eq!(registry.value("status_total", &[("code", "200")]), Some(1.0));
        assert_eq!(registry.value("status_total", &[("code", "500")]), Some(1.0));
        assert_eq!(bridge.metrics().messages_total(), 2);
        assert_eq!(bridge.metrics().durations_observed(), 2);
    }

    #[test]
    fn test_truncated_datagram_counts_frame_error() {
        let bridge = bridge();
        let bytes = frame(200);
        bridge.process_datagram(&bytes[..bytes.len() - 1], peer());

        assert_eq!(bridge.metrics().errors(ErrorStage::Frame), 1);
        assert_eq!(bridge.metrics().messages_total(), 0);
    }

    #[test]
    fn test_undecodable_payload_counts_unmarshal_error() {
        let bridge = bridge();
        // Valid framing around a payload that is not a protobuf message
        let mut datagram = vec![0x1E, 2, 0x08, 3, 0x1F];
        datagram.extend_from_slice(&[0x0A, 0x10, 0x01]);
        bridge.process_datagram(&datagram, peer());

        assert_eq!(bridge.metrics().errors(ErrorStage::Unmarshal), 1);
        assert_eq!(bridge.metrics().errors(ErrorStage::Frame), 0);
    }

    #[tokio::test]
    async fn test_stream_recovers_after_corruption() {
        let bridge = bridge();
        let mut stream = frame(500).to_vec();
        stream.extend_from_slice(b"garbage");
        stream.extend_from_slice(&frame(500));
        stream.extend_from_slice(&frame(404));

        let frames = bridge.process_stream(&stream[..], peer()).await.unwrap();
        assert_eq!(frames, 2);

        let metrics = bridge.metrics();
        assert_eq!(metrics.errors(ErrorStage::Frame), 1);
        assert_eq!(
            bridge.registry().value("status_total", &[("code", "500")]),
            Some(1.0)
        );
        assert_eq!(
            bridge.registry().value("status_total", &[("code", "404")]),
            Some(1.0)
        );
    }

    #[tokio::test]
    async fn test_stream_truncated_frame_swallows_next() {
        let bridge = bridge();
        // The declared length runs 10 bytes into the 404 frame; the decoded
        // mix fails to unmarshal and the 503 frame is lost to resynchronization.
        let truncated = frame(500);
        let mut stream = truncated[..truncated.len() - 10].to_vec();
        stream.extend_from_slice(&frame(404));
        stream.extend_from_slice(&frame(503));
        stream.extend_from_slice(&frame(200));

        let frames = bridge.process_stream(&stream[..], peer()).await.unwrap();
        assert_eq!(frames, 2);

        let metrics = bridge.metrics();
        assert_eq!(metrics.errors(ErrorStage::Unmarshal), 1);
        assert_eq!(metrics.errors(ErrorStage::Frame), 1);
        assert_eq!(metrics.messages_total(), 1);

        let registry = bridge.registry();
        assert_eq!(registry.value("status_total", &[("code", "200")]), Some(1.0));
        for code in ["500", "404", "503"] {
            assert_eq!(registry.value("status_total", &[("code", code)]), None);
        }
    }

    #[test]
    fn test_process_errors_counted_per_rule() {
        let mut config = Config::default();
        for name in ["a", "b"] {
            let mut rule = MetricConfig::new(name, MetricKind::Gauge);
            rule.value = Some("missing".to_string());
            config.metrics.push(rule);
        }
        let bridge = Bridge::new(&config).unwrap();
        bridge.process_datagram(&frame(1), peer());

        assert_eq!(bridge.metrics().errors(ErrorStage::Process), 2);
        assert_eq!(bridge.metrics().messages_total(), 1);
        assert_eq!(bridge.metrics().durations_observed(), 0);
    }
}
