use crate::domain::command::CommandPayload;
use async_trait::async_trait;

/// Result of handing a command to the push channel.
///
/// A failed send is an ordinary outcome, not an error: it ends up as a
/// `failed` command log.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    Accepted {
        message_id: Option<String>,
        raw_response: Option<serde_json::Value>,
    },
    Failed {
        error: String,
        raw_response: Option<serde_json::Value>,
    },
}

impl PushOutcome {
    pub fn failed(error: impl Into<String>, raw_response: Option<serde_json::Value>) -> Self {
        PushOutcome::Failed {
            error: error.into(),
            raw_response,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, PushOutcome::Accepted { .. })
    }
}

/// Push messaging channel to financed devices.
///
/// Implementations enforce their own send timeout and report it as
/// [`PushOutcome::Failed`].
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, push_token: &str, payload: &CommandPayload) -> PushOutcome;
}
