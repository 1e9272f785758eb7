use crate::domain::{Account, AccountRepository, AccountStatus, DomainError, DomainResult};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

pub(crate) const ACCOUNT_SELECT_COLUMNS: &str = "account_id, operator_id, name, serial_number, imei_1, imei_2, push_token, status, is_device_locked, is_camera_disabled, is_bluetooth_disabled, is_app_hidden, has_password, custom_wallpaper_url, last_command_sent_at, created_at, updated_at";

/// Account row for PostgreSQL storage
#[derive(Debug, Clone)]
pub struct AccountRow {
    pub account_id: String,
    pub operator_id: String,
    pub name: String,
    pub serial_number: Option<String>,
    pub imei_1: Option<String>,
    pub imei_2: Option<String>,
    pub push_token: Option<String>,
    pub status: String,
    pub is_device_locked: bool,
    pub is_camera_disabled: bool,
    pub is_bluetooth_disabled: bool,
    pub is_app_hidden: bool,
    pub has_password: bool,
    pub custom_wallpaper_url: Option<String>,
    pub last_command_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountRow {
    fn from_row(row: &tokio_postgres::Row) -> Self {
        AccountRow {
            account_id: row.get("account_id"),
            operator_id: row.get("operator_id"),
            name: row.get("name"),
            serial_number: row.get("serial_number"),
            imei_1: row.get("imei_1"),
            imei_2: row.get("imei_2"),
            push_token: row.get("push_token"),
            status: row.get("status"),
            is_device_locked: row.get("is_device_locked"),
            is_camera_disabled: row.get("is_camera_disabled"),
            is_bluetooth_disabled: row.get("is_bluetooth_disabled"),
            is_app_hidden: row.get("is_app_hidden"),
            has_password: row.get("has_password"),
            custom_wallpaper_url: row.get("custom_wallpaper_url"),
            last_command_sent_at: row.get("last_command_sent_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

impl TryFrom<AccountRow> for Account {
    type Error = DomainError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Account {
            account_id: row.account_id,
            operator_id: row.operator_id,
            name: row.name,
            serial_number: row.serial_number,
            imei_1: row.imei_1,
            imei_2: row.imei_2,
            push_token: row.push_token,
            status: row.status.parse::<AccountStatus>()?,
            is_device_locked: row.is_device_locked,
            is_camera_disabled: row.is_camera_disabled,
            is_bluetooth_disabled: row.is_bluetooth_disabled,
            is_app_hidden: row.is_app_hidden,
            has_password: row.has_password,
            custom_wallpaper_url: row.custom_wallpaper_url,
            last_command_sent_at: row.last_command_sent_at,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        })
    }
}

/// PostgreSQL implementation of AccountRepository trait
#[derive(Clone)]
pub struct PostgresAccountRepository {
    client: PostgresClient,
}

impl PostgresAccountRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    #[instrument(skip(self), fields(account_id = %account_id))]
    async fn get_account(&self, account_id: &str) -> DomainResult<Option<Account>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                &format!(
                    "SELECT {} FROM accounts WHERE account_id = $1",
                    ACCOUNT_SELECT_COLUMNS
                ),
                &[&account_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        row.map(|row| AccountRow::from_row(&row).try_into())
            .transpose()
    }

    #[instrument(skip(self), fields(identifier = %identifier))]
    async fn find_by_device_identifier(&self, identifier: &str) -> DomainResult<Option<Account>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        // Serial number matches take precedence over IMEI-1, then IMEI-2
        let row = conn
            .query_opt(
                &format!(
                    "SELECT {} FROM accounts
                     WHERE serial_number = $1 OR imei_1 = $1 OR imei_2 = $1
                     ORDER BY CASE
                         WHEN serial_number = $1 THEN 0
                         WHEN imei_1 = $1 THEN 1
                         ELSE 2
                     END, created_at ASC
                     LIMIT 1",
                    ACCOUNT_SELECT_COLUMNS
                ),
                &[&identifier],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        match row {
            Some(row) => {
                let account_row = AccountRow::from_row(&row);
                debug!(account_id = %account_row.account_id, "resolved device identifier");
                Ok(Some(account_row.try_into()?))
            }
            None => Ok(None),
        }
    }
}
