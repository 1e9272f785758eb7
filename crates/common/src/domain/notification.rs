use crate::domain::command::JsonMap;
use crate::domain::command_log::{CommandLog, CommandStatus};
use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Real-time event emitted to the initiating operator after a device
/// acknowledged a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandAcknowledgedEvent {
    pub command_log_id: i64,
    pub account_id: String,
    pub command: String,
    pub status: CommandStatus,
    pub response_data: JsonMap,
    pub timestamp: DateTime<Utc>,
    /// Routing key; not part of the published body
    #[serde(skip)]
    pub operator_id: String,
}

impl CommandAcknowledgedEvent {
    pub fn from_delivered_log(log: &CommandLog, timestamp: DateTime<Utc>) -> Self {
        Self {
            command_log_id: log.id,
            account_id: log.account_id.clone(),
            command: log.command.clone(),
            status: log.status,
            response_data: log.metadata.clone().unwrap_or_default(),
            timestamp,
            operator_id: log.initiated_by.clone(),
        }
    }
}

/// Best-effort side channel for acknowledgement events
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AcknowledgementNotifier: Send + Sync {
    async fn notify(&self, event: &CommandAcknowledgedEvent) -> DomainResult<()>;
}
