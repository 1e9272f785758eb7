use crate::domain::{
    CommandLog, CommandLogRepository, CommandStatus, CreateCommandLogInput,
    DeliverCommandLogInput, DeviceStateChange, DispatchOutcome, DispatchUnitOfWork, DomainError,
    DomainResult, JsonMap, ListCommandLogsInput, RecordDispatchOutcomeInput,
    UpdateAccountAfterDispatchInput,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_postgres::types::Json;
use tracing::{debug, instrument, warn};

const COMMAND_LOG_SELECT_COLUMNS: &str = "id, account_id, command, params, status, response, metadata, error_message, sent_at, initiated_by, created_at, updated_at";

/// Command log row for PostgreSQL storage
#[derive(Debug, Clone)]
pub struct CommandLogRow {
    pub id: i64,
    pub account_id: String,
    pub command: String,
    pub params: Value,
    pub status: String,
    pub response: Option<Value>,
    pub metadata: Option<Value>,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub initiated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommandLogRow {
    fn from_row(row: &tokio_postgres::Row) -> Self {
        CommandLogRow {
            id: row.get("id"),
            account_id: row.get("account_id"),
            command: row.get("command"),
            params: row.get("params"),
            status: row.get("status"),
            response: row.get("response"),
            metadata: row.get("metadata"),
            error_message: row.get("error_message"),
            sent_at: row.get("sent_at"),
            initiated_by: row.get("initiated_by"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

fn into_map(value: Value) -> JsonMap {
    match value {
        Value::Object(map) => map,
        _ => JsonMap::new(),
    }
}

impl TryFrom<CommandLogRow> for CommandLog {
    type Error = DomainError;

    fn try_from(row: CommandLogRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<CommandStatus>()
            .map_err(|e| DomainError::RepositoryError(anyhow::anyhow!(e.to_string())))?;

        Ok(CommandLog {
            id: row.id,
            account_id: row.account_id,
            command: row.command,
            params: into_map(row.params),
            status,
            response: row.response,
            metadata: row.metadata.map(into_map),
            error_message: row.error_message,
            sent_at: row.sent_at,
            initiated_by: row.initiated_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn log_from_row(row: &tokio_postgres::Row) -> DomainResult<CommandLog> {
    CommandLogRow::from_row(row).try_into()
}

/// Boolean account column mirrored by a device state change
fn flag_column(change: &DeviceStateChange) -> Option<(&'static str, bool)> {
    match change {
        DeviceStateChange::DeviceLocked(v) => Some(("is_device_locked", *v)),
        DeviceStateChange::CameraDisabled(v) => Some(("is_camera_disabled", *v)),
        DeviceStateChange::BluetoothDisabled(v) => Some(("is_bluetooth_disabled", *v)),
        DeviceStateChange::AppHidden(v) => Some(("is_app_hidden", *v)),
        DeviceStateChange::HasPassword(v) => Some(("has_password", *v)),
        DeviceStateChange::CustomWallpaper(_) => None,
    }
}

fn account_update_sql(column: &str) -> String {
    format!(
        "UPDATE accounts SET last_command_sent_at = $2, updated_at = $2, {} = $3 WHERE account_id = $1",
        column
    )
}

/// PostgreSQL implementation of CommandLogRepository trait
#[derive(Clone)]
pub struct PostgresCommandLogRepository {
    client: PostgresClient,
}

impl PostgresCommandLogRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CommandLogRepository for PostgresCommandLogRepository {
    #[instrument(skip(self))]
    async fn begin_dispatch(&self) -> DomainResult<Box<dyn DispatchUnitOfWork>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        conn.batch_execute("BEGIN")
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(Box::new(PostgresDispatchUnitOfWork { conn: Some(conn) }))
    }

    #[instrument(skip(self, input), fields(account_id = %input.account_id, command = %input.command))]
    async fn deliver_latest_sent(
        &self,
        input: DeliverCommandLogInput,
    ) -> DomainResult<Option<CommandLog>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        // Row lock on the candidate makes concurrent acknowledgements of the
        // same log resolve to exactly one winner; the loser re-checks status.
        let row = conn
            .query_opt(
                &format!(
                    "UPDATE command_logs
                     SET status = 'delivered', metadata = $3, updated_at = $4
                     WHERE id = (
                         SELECT id FROM command_logs
                         WHERE account_id = $1 AND command = $2 AND status = 'sent'
                         ORDER BY created_at DESC, id DESC
                         LIMIT 1
                         FOR UPDATE
                     ) AND status = 'sent'
                     RETURNING {}",
                    COMMAND_LOG_SELECT_COLUMNS
                ),
                &[
                    &input.account_id,
                    &input.command,
                    &Json(&input.metadata),
                    &Utc::now(),
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        match row {
            Some(row) => {
                let log = log_from_row(&row)?;
                debug!(log_id = log.id, "command log delivered");
                Ok(Some(log))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(log_id = log_id))]
    async fn get_command_log(&self, log_id: i64) -> DomainResult<Option<CommandLog>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                &format!(
                    "SELECT {} FROM command_logs WHERE id = $1",
                    COMMAND_LOG_SELECT_COLUMNS
                ),
                &[&log_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        row.as_ref().map(log_from_row).transpose()
    }

    #[instrument(skip(self, input), fields(account_id = %input.account_id, limit = input.limit))]
    async fn list_command_logs(
        &self,
        input: ListCommandLogsInput,
    ) -> DomainResult<Vec<CommandLog>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM command_logs
                     WHERE account_id = $1 AND ($2::TEXT IS NULL OR command = $2)
                     ORDER BY created_at DESC, id DESC
                     LIMIT $3",
                    COMMAND_LOG_SELECT_COLUMNS
                ),
                &[&input.account_id, &input.command, &input.limit],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let logs = rows
            .iter()
            .map(log_from_row)
            .collect::<DomainResult<Vec<_>>>()?;

        debug!(count = logs.len(), "listed command logs");
        Ok(logs)
    }

    #[instrument(skip(self))]
    async fn latest_delivered_with_metadata(
        &self,
        account_id: &str,
        command: &str,
    ) -> DomainResult<Option<CommandLog>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                &format!(
                    "SELECT {} FROM command_logs
                     WHERE account_id = $1 AND command = $2 AND status = 'delivered'
                       AND metadata IS NOT NULL AND metadata <> '{{}}'::jsonb
                     ORDER BY created_at DESC, id DESC
                     LIMIT 1",
                    COMMAND_LOG_SELECT_COLUMNS
                ),
                &[&account_id, &command],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        row.as_ref().map(log_from_row).transpose()
    }
}

/// One dispatch attempt running inside an explicit transaction on a pooled
/// connection. A unit of work dropped while still open detaches its
/// connection from the pool, so the server aborts the transaction.
pub struct PostgresDispatchUnitOfWork {
    conn: Option<deadpool_postgres::Client>,
}

impl PostgresDispatchUnitOfWork {
    fn conn(&self) -> DomainResult<&deadpool_postgres::Client> {
        self.conn.as_ref().ok_or_else(|| {
            DomainError::RepositoryError(anyhow::anyhow!("dispatch transaction already finished"))
        })
    }

    async fn finish(mut self: Box<Self>, statement: &str) -> DomainResult<()> {
        let conn = self.conn.take().ok_or_else(|| {
            DomainError::RepositoryError(anyhow::anyhow!("dispatch transaction already finished"))
        })?;

        match conn.batch_execute(statement).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Never hand a connection in an unknown transaction state back to the pool
                drop(deadpool_postgres::Client::take(conn));
                Err(DomainError::RepositoryError(e.into()))
            }
        }
    }
}

impl Drop for PostgresDispatchUnitOfWork {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!("dispatch transaction dropped without commit, discarding connection");
            drop(deadpool_postgres::Client::take(conn));
        }
    }
}

#[async_trait]
impl DispatchUnitOfWork for PostgresDispatchUnitOfWork {
    #[instrument(skip(self, input), fields(account_id = %input.account_id, command = %input.command))]
    async fn create_pending_log(
        &mut self,
        input: CreateCommandLogInput,
    ) -> DomainResult<CommandLog> {
        let row = self
            .conn()?
            .query_one(
                &format!(
                    "INSERT INTO command_logs (account_id, command, params, status, initiated_by, created_at, updated_at)
                     VALUES ($1, $2, $3, 'pending', $4, $5, $5)
                     RETURNING {}",
                    COMMAND_LOG_SELECT_COLUMNS
                ),
                &[
                    &input.account_id,
                    &input.command,
                    &Json(&input.params),
                    &input.initiated_by,
                    &Utc::now(),
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let log = log_from_row(&row)?;
        debug!(log_id = log.id, "created pending command log");
        Ok(log)
    }

    #[instrument(skip(self, input), fields(log_id = input.log_id, status = %input.outcome.status()))]
    async fn record_outcome(
        &mut self,
        input: RecordDispatchOutcomeInput,
    ) -> DomainResult<CommandLog> {
        let status = input.outcome.status();
        let (sent_at, error_message, response) = match &input.outcome {
            DispatchOutcome::Sent { sent_at, response } => (Some(*sent_at), None, response.as_ref()),
            DispatchOutcome::Failed {
                error_message,
                response,
            } => (None, Some(error_message.as_str()), response.as_ref()),
        };

        let row = self
            .conn()?
            .query_opt(
                &format!(
                    "UPDATE command_logs
                     SET status = $2, sent_at = $3, error_message = $4, response = $5, updated_at = $6
                     WHERE id = $1 AND status = 'pending'
                     RETURNING {}",
                    COMMAND_LOG_SELECT_COLUMNS
                ),
                &[
                    &input.log_id,
                    &status.as_str(),
                    &sent_at,
                    &error_message,
                    &response.map(Json),
                    &Utc::now(),
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        match row {
            Some(row) => log_from_row(&row),
            None => Err(DomainError::RepositoryError(anyhow::anyhow!(
                "command log {} is not pending",
                input.log_id
            ))),
        }
    }

    #[instrument(skip(self, input), fields(account_id = %input.account_id))]
    async fn update_account(&mut self, input: UpdateAccountAfterDispatchInput) -> DomainResult<()> {
        let conn = self.conn()?;

        let result = match &input.state_change {
            None => {
                conn.execute(
                    "UPDATE accounts SET last_command_sent_at = $2, updated_at = $2 WHERE account_id = $1",
                    &[&input.account_id, &input.last_command_sent_at],
                )
                .await
            }
            Some(DeviceStateChange::CustomWallpaper(url)) => {
                conn.execute(
                    &account_update_sql("custom_wallpaper_url"),
                    &[&input.account_id, &input.last_command_sent_at, url],
                )
                .await
            }
            Some(change) => {
                let Some((column, value)) = flag_column(change) else {
                    return Err(DomainError::RepositoryError(anyhow::anyhow!(
                        "unmapped device state change {:?}",
                        change
                    )));
                };
                conn.execute(
                    &account_update_sql(column),
                    &[&input.account_id, &input.last_command_sent_at, &value],
                )
                .await
            }
        };

        let rows_affected = result.map_err(|e| DomainError::RepositoryError(e.into()))?;
        if rows_affected == 0 {
            return Err(DomainError::AccountNotFound(input.account_id));
        }

        Ok(())
    }

    async fn commit(self: Box<Self>) -> DomainResult<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> DomainResult<()> {
        self.finish("ROLLBACK").await
    }
}
