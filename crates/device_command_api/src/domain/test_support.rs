use chrono::{DateTime, Duration, Utc};
use common::auth::{OperatorContext, OperatorRole};
use common::domain::{Account, AccountStatus, CommandLog, CommandStatus, JsonMap};

pub const OWNER_ID: &str = "op-owner";

pub fn owner() -> OperatorContext {
    OperatorContext {
        operator_id: OWNER_ID.to_string(),
        role: OperatorRole::Operator,
    }
}

pub fn stranger() -> OperatorContext {
    OperatorContext {
        operator_id: "op-stranger".to_string(),
        role: OperatorRole::Operator,
    }
}

/// Active account with a push token, managed by [`OWNER_ID`]
pub fn eligible_account(account_id: &str) -> Account {
    Account {
        account_id: account_id.to_string(),
        operator_id: OWNER_ID.to_string(),
        name: "Adaeze Okafor".to_string(),
        serial_number: Some(format!("SN-{}", account_id)),
        imei_1: Some(format!("35693803564{}", account_id.len())),
        imei_2: None,
        push_token: Some("fcm-token-1".to_string()),
        status: AccountStatus::Active,
        is_device_locked: false,
        is_camera_disabled: false,
        is_bluetooth_disabled: false,
        is_app_hidden: false,
        has_password: false,
        custom_wallpaper_url: None,
        last_command_sent_at: None,
        created_at: Some(Utc::now()),
        updated_at: Some(Utc::now()),
    }
}

pub fn command_log(
    id: i64,
    account_id: &str,
    command: &str,
    status: CommandStatus,
    created_at: DateTime<Utc>,
) -> CommandLog {
    CommandLog {
        id,
        account_id: account_id.to_string(),
        command: command.to_string(),
        params: JsonMap::new(),
        status,
        response: None,
        metadata: None,
        error_message: None,
        sent_at: (status != CommandStatus::Pending).then_some(created_at),
        initiated_by: OWNER_ID.to_string(),
        created_at,
        updated_at: created_at,
    }
}

pub fn minutes_ago(minutes: i64) -> DateTime<Utc> {
    Utc::now() - Duration::minutes(minutes)
}
