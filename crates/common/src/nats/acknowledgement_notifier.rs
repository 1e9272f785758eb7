use crate::domain::{AcknowledgementNotifier, CommandAcknowledgedEvent, DomainError, DomainResult};
use crate::nats::JetStreamPublisher;
use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Publishes acknowledgement events to `{base_subject}.{operator_id}`
pub struct NatsAcknowledgementNotifier {
    jetstream: Arc<dyn JetStreamPublisher>,
    base_subject: String,
}

impl NatsAcknowledgementNotifier {
    pub fn new(jetstream: Arc<dyn JetStreamPublisher>, base_subject: String) -> Self {
        info!(base_subject = %base_subject, "Created NatsAcknowledgementNotifier");
        Self {
            jetstream,
            base_subject,
        }
    }

    fn subject_for(&self, event: &CommandAcknowledgedEvent) -> String {
        format!("{}.{}", self.base_subject, event.operator_id)
    }
}

#[async_trait]
impl AcknowledgementNotifier for NatsAcknowledgementNotifier {
    async fn notify(&self, event: &CommandAcknowledgedEvent) -> DomainResult<()> {
        let payload = serde_json::to_vec(event)
            .context("Failed to serialize acknowledgement event")
            .map_err(DomainError::RepositoryError)?;

        let subject = self.subject_for(event);

        debug!(
            subject = %subject,
            command_log_id = event.command_log_id,
            size_bytes = payload.len(),
            "Publishing acknowledgement event"
        );

        self.jetstream
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish acknowledgement event")
            .map_err(DomainError::RepositoryError)?;

        Ok(())
    }
}
