use chrono::Utc;
use common::domain::{
    AccountRepository, AcknowledgementNotifier, CommandAcknowledgedEvent, CommandLogRepository,
    DeliverCommandLogInput, DomainError, DomainResult, JsonMap,
};
use garde::Validate;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

// Devices only learn whether a matching record exists
const UNMATCHED_DEVICE: &str = "no matching device";
const UNMATCHED_COMMAND: &str = "no matching sent command";

/// Device callback confirming it executed a command
#[derive(Debug, Clone, Validate)]
pub struct AcknowledgeCommandRequest {
    /// Serial number, IMEI-1 or IMEI-2
    #[garde(length(min = 1))]
    pub device_id: String,
    /// Wire command name, e.g. `REQUEST_LOCATION`
    #[garde(length(min = 1))]
    pub command: String,
    #[garde(skip)]
    pub data: Option<JsonMap>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcknowledgementResult {
    pub success: bool,
    pub command_log_id: i64,
}

/// Reconciles device acknowledgements with the command log
pub struct AcknowledgementService {
    account_repository: Arc<dyn AccountRepository>,
    command_log_repository: Arc<dyn CommandLogRepository>,
    notifier: Arc<dyn AcknowledgementNotifier>,
}

impl AcknowledgementService {
    pub fn new(
        account_repository: Arc<dyn AccountRepository>,
        command_log_repository: Arc<dyn CommandLogRepository>,
        notifier: Arc<dyn AcknowledgementNotifier>,
    ) -> Self {
        Self {
            account_repository,
            command_log_repository,
            notifier,
        }
    }

    /// Mark the newest `sent` log for the device's account and command as
    /// `delivered`. Older `sent` logs for the same command are left alone.
    #[instrument(skip(self, request), fields(device_id = %request.device_id, command = %request.command))]
    pub async fn acknowledge(
        &self,
        request: AcknowledgeCommandRequest,
    ) -> DomainResult<AcknowledgementResult> {
        common::garde::validate_struct(&request)?;

        let command = request.command.trim().to_string();

        let account = self
            .account_repository
            .find_by_device_identifier(request.device_id.trim())
            .await?
            .ok_or_else(|| {
                debug!("no account registered for acknowledging device");
                DomainError::DeviceNotFound(UNMATCHED_DEVICE.to_string())
            })?;

        debug!(account_id = %account.account_id, "resolved acknowledging device");

        let log = self
            .command_log_repository
            .deliver_latest_sent(DeliverCommandLogInput {
                account_id: account.account_id.clone(),
                command: command.clone(),
                metadata: request.data.unwrap_or_default(),
            })
            .await?
            .ok_or_else(|| {
                debug!(account_id = %account.account_id, "no sent command awaiting acknowledgement");
                DomainError::CommandLogNotFound(UNMATCHED_COMMAND.to_string())
            })?;

        info!(log_id = log.id, account_id = %log.account_id, "command delivered");

        let event = CommandAcknowledgedEvent::from_delivered_log(&log, Utc::now());
        if let Err(e) = self.notifier.notify(&event).await {
            warn!(log_id = log.id, error = %e, "failed to publish acknowledgement event");
        }

        Ok(AcknowledgementResult {
            success: true,
            command_log_id: log.id,
        })
    }
}
