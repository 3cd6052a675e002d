//! Common test utilities and fixtures.

#![allow(dead_code)]

use bytes::Bytes;
use heka_exporter::core::{Config, FieldValue, Message, MetricConfig, ServerConfig};
use heka_exporter::protocol::encode_frame;
use std::time::Duration;

/// Test fixture builder for records with sensible defaults.
pub struct TestMessageBuilder {
    message: Message,
}

impl TestMessageBuilder {
    pub fn new() -> Self {
        Self {
            message: Message::new()
                .with_type("nginx.access")
                .with_logger("nginx")
                .with_hostname("web-01")
                .with_severity(6)
                .with_pid(4242)
                .with_timestamp(1_700_000_000_000_000_000),
        }
    }

    pub fn hostname(mut self, hostname: &str) -> Self {
        self.message = self.message.with_hostname(hostname);
        self
    }

    pub fn logger(mut self, logger: &str) -> Self {
        self.message = self.message.with_logger(logger);
        self
    }

    pub fn severity(mut self, severity: i32) -> Self {
        self.message = self.message.with_severity(severity);
        self
    }

    pub fn status(self, status: i64) -> Self {
        self.field("status", status)
    }

    pub fn field<V: Into<FieldValue>>(mut self, name: &str, value: V) -> Self {
        self.message = self.message.with_field(name, value);
        self
    }

    pub fn build(self) -> Message {
        self.message
    }

    /// The record, framed for the wire.
    pub fn frame(self) -> Bytes {
        encode_frame(&self.message)
    }
}

/// Concatenate framed records into one buffer.
pub fn frames(messages: &[Message]) -> Vec<u8> {
    messages.iter().flat_map(|m| encode_frame(m).to_vec()).collect()
}

/// Configuration with the given rules and every listener on an ephemeral
/// loopback port.
pub fn loopback_config(metrics: Vec<MetricConfig>) -> Config {
    Config {
        server: ServerConfig {
            udp_address: Some("127.0.0.1:0".parse().unwrap()),
            tcp_address: Some("127.0.0.1:0".parse().unwrap()),
            http_address: "127.0.0.1:0".parse().unwrap(),
        },
        metrics,
        ..Config::default()
    }
}

/// Poll `condition` until it holds or a couple of seconds pass.
pub async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
