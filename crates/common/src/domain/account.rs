use crate::domain::result::{DomainError, DomainResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a financed-device account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    Pending,
    Suspended,
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Pending => "pending",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "pending" => Ok(AccountStatus::Pending),
            "suspended" => Ok(AccountStatus::Suspended),
            "closed" => Ok(AccountStatus::Closed),
            other => Err(DomainError::RepositoryError(anyhow::anyhow!(
                "unknown account status: {}",
                other
            ))),
        }
    }
}

/// Financed-device owner record.
///
/// Device-state flags mirror the last command successfully handed to the
/// push channel, not a confirmed device state.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub account_id: String,
    /// Operator (retailer) managing this account
    pub operator_id: String,
    pub name: String,
    pub serial_number: Option<String>,
    pub imei_1: Option<String>,
    pub imei_2: Option<String>,
    pub push_token: Option<String>,
    pub status: AccountStatus,
    pub is_device_locked: bool,
    pub is_camera_disabled: bool,
    pub is_bluetooth_disabled: bool,
    pub is_app_hidden: bool,
    pub has_password: bool,
    pub custom_wallpaper_url: Option<String>,
    pub last_command_sent_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Push address, if one is registered and non-blank
    pub fn registered_push_token(&self) -> Option<&str> {
        self.push_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    pub fn is_eligible_for_commands(&self) -> bool {
        self.status == AccountStatus::Active && self.registered_push_token().is_some()
    }

    /// Whether `identifier` matches the serial number or either IMEI
    pub fn matches_device_identifier(&self, identifier: &str) -> bool {
        self.device_identifier_rank(identifier).is_some()
    }

    /// Lookup precedence of the field `identifier` matches: serial number 0,
    /// IMEI-1 1, IMEI-2 2
    pub fn device_identifier_rank(&self, identifier: &str) -> Option<u8> {
        [&self.serial_number, &self.imei_1, &self.imei_2]
            .into_iter()
            .position(|field| field.as_deref() == Some(identifier))
            .map(|rank| rank as u8)
    }

    pub fn apply_state_change(&mut self, change: &DeviceStateChange) {
        match change {
            DeviceStateChange::DeviceLocked(value) => self.is_device_locked = *value,
            DeviceStateChange::CameraDisabled(value) => self.is_camera_disabled = *value,
            DeviceStateChange::BluetoothDisabled(value) => self.is_bluetooth_disabled = *value,
            DeviceStateChange::AppHidden(value) => self.is_app_hidden = *value,
            DeviceStateChange::HasPassword(value) => self.has_password = *value,
            DeviceStateChange::CustomWallpaper(url) => self.custom_wallpaper_url = url.clone(),
        }
    }
}

/// Local mirror of a device setting, applied after a successful dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceStateChange {
    DeviceLocked(bool),
    CameraDisabled(bool),
    BluetoothDisabled(bool),
    AppHidden(bool),
    HasPassword(bool),
    CustomWallpaper(Option<String>),
}

/// Account fields written at the end of a dispatch unit of work
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateAccountAfterDispatchInput {
    pub account_id: String,
    pub last_command_sent_at: DateTime<Utc>,
    /// Only set when the push send succeeded
    pub state_change: Option<DeviceStateChange>,
}

/// Read side of the device registry
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Get an account by its id
    async fn get_account(&self, account_id: &str) -> DomainResult<Option<Account>>;

    /// Find the account owning a device by serial number, IMEI-1 or IMEI-2
    async fn find_by_device_identifier(&self, identifier: &str) -> DomainResult<Option<Account>>;
}
