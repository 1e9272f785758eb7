use crate::nats::trace_context::inject_trace_context;
use crate::nats::traits::JetStreamPublisher;
use anyhow::{Context, Result};
use async_nats::jetstream::{self, stream};
use async_nats::HeaderMap;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// Acknowledgement events are notifications, not a ledger
const EVENT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Connected NATS client with its JetStream context
pub struct NatsClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl NatsClient {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        info!(url = %url, timeout_ms = timeout.as_millis(), "Connecting to NATS");

        let client = async_nats::ConnectOptions::new()
            .connection_timeout(timeout)
            .connect(url)
            .await
            .with_context(|| format!("Failed to connect to NATS at {}", url))?;

        info!("Connected to NATS");
        Ok(Self {
            jetstream: jetstream::new(client.clone()),
            client,
        })
    }

    /// Get or create the stream capturing `{name}.*`
    pub async fn ensure_stream(&self, name: &str, description: &str) -> Result<()> {
        let stream = self
            .jetstream
            .get_or_create_stream(stream_config(name, description))
            .await
            .with_context(|| format!("Failed to ensure stream {}", name))?;

        info!(stream = %stream.cached_info().config.name, "Stream ready");
        Ok(())
    }

    pub fn create_publisher_client(&self) -> Arc<dyn JetStreamPublisher> {
        Arc::new(NatsJetStreamPublisher::new(self.jetstream.clone()))
    }

    /// Flush buffered publishes; the connection closes when the last handle drops
    pub async fn close(&self) -> Result<()> {
        info!("Closing NATS connection");
        self.client
            .flush()
            .await
            .context("Failed to flush NATS connection")
    }
}

fn stream_config(name: &str, description: &str) -> stream::Config {
    stream::Config {
        name: name.to_string(),
        subjects: vec![format!("{}.*", name)],
        description: Some(description.to_string()),
        max_age: EVENT_RETENTION,
        ..Default::default()
    }
}

/// JetStreamPublisher backed by async-nats; awaits the stream ack
pub struct NatsJetStreamPublisher {
    context: jetstream::Context,
}

impl NatsJetStreamPublisher {
    pub fn new(context: jetstream::Context) -> Self {
        Self { context }
    }
}

#[async_trait]
impl JetStreamPublisher for NatsJetStreamPublisher {
    #[instrument(skip(self, payload), fields(subject = %subject, payload_size = payload.len()))]
    async fn publish(&self, subject: String, payload: bytes::Bytes) -> Result<()> {
        let mut headers = HeaderMap::new();
        inject_trace_context(&mut headers);

        self.context
            .publish_with_headers(subject, headers, payload)
            .await
            .context("Failed to publish to JetStream")?
            .await
            .context("JetStream did not acknowledge publish")?;

        Ok(())
    }
}
