use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use common::auth::OperatorContext;
use common::domain::{CommandLog, CommandStatus, DomainError, JsonMap};
use common::http::ApiError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::domain::{
    AcknowledgeCommandRequest, AcknowledgementResult, DeviceLocation, DispatchCommandRequest,
    DispatchResult, GetCommandLogRequest, LatestLocationRequest, ListCommandLogsRequest,
};
use crate::http::DeviceCommandApiServices;

/// Command log as returned to operators
#[derive(Debug, Clone, Serialize)]
pub struct CommandLogResponse {
    pub id: i64,
    pub account_id: String,
    pub command: String,
    pub params: JsonMap,
    pub status: CommandStatus,
    pub response: Option<Value>,
    pub metadata: Option<JsonMap>,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub initiated_by: String,
    pub has_location_response: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CommandLog> for CommandLogResponse {
    fn from(log: CommandLog) -> Self {
        let has_location_response = log.has_location_response();
        Self {
            id: log.id,
            account_id: log.account_id,
            command: log.command,
            params: log.params,
            status: log.status,
            response: log.response,
            metadata: log.metadata,
            error_message: log.error_message,
            sent_at: log.sent_at,
            initiated_by: log.initiated_by,
            has_location_response,
            created_at: log.created_at,
            updated_at: log.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CommandLogListResponse {
    pub data: Vec<CommandLogResponse>,
}

#[derive(Debug, Deserialize)]
pub struct ListCommandLogsQuery {
    pub command: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AcknowledgeCommandBody {
    pub device_id: String,
    pub command: String,
    pub data: Option<JsonMap>,
}

/// Command parameters from an optional JSON object body
fn params_from_body(body: &Bytes) -> Result<JsonMap, DomainError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(JsonMap::new());
    }

    let mut params: JsonMap = serde_json::from_slice(body).map_err(|e| {
        DomainError::ValidationError(format!("request body must be a JSON object: {}", e))
    })?;

    // Path segments are authoritative for the target and the command
    params.remove("account_id");
    params.remove("command");
    Ok(params)
}

pub async fn healthz() -> &'static str {
    "ok"
}

#[instrument(name = "DispatchCommand", skip(services, operator, body), fields(account_id = %account_id, action = %action))]
pub async fn dispatch_command(
    State(services): State<Arc<DeviceCommandApiServices>>,
    Extension(operator): Extension<OperatorContext>,
    Path((account_id, action)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<DispatchResult>, ApiError> {
    let params = params_from_body(&body)?;

    let result = services
        .dispatch_service
        .dispatch(DispatchCommandRequest {
            operator,
            account_id,
            command: action,
            params,
        })
        .await?;

    debug!(log_id = result.log_id, success = result.success, "dispatch finished");
    Ok(Json(result))
}

#[instrument(name = "ListCommandLogs", skip(services, operator, query), fields(account_id = %account_id))]
pub async fn list_command_logs(
    State(services): State<Arc<DeviceCommandApiServices>>,
    Extension(operator): Extension<OperatorContext>,
    Path(account_id): Path<String>,
    Query(query): Query<ListCommandLogsQuery>,
) -> Result<Json<CommandLogListResponse>, ApiError> {
    let logs = services
        .command_log_service
        .list_command_logs(ListCommandLogsRequest {
            operator,
            account_id,
            command: query.command,
            limit: query.limit,
        })
        .await?;

    Ok(Json(CommandLogListResponse {
        data: logs.into_iter().map(CommandLogResponse::from).collect(),
    }))
}

#[instrument(name = "GetCommandLog", skip(services, operator), fields(log_id = log_id))]
pub async fn get_command_log(
    State(services): State<Arc<DeviceCommandApiServices>>,
    Extension(operator): Extension<OperatorContext>,
    Path(log_id): Path<i64>,
) -> Result<Json<CommandLogResponse>, ApiError> {
    let log = services
        .command_log_service
        .get_command_log(GetCommandLogRequest { operator, log_id })
        .await?;

    Ok(Json(log.into()))
}

#[instrument(name = "LatestLocation", skip(services, operator), fields(account_id = %account_id))]
pub async fn latest_location(
    State(services): State<Arc<DeviceCommandApiServices>>,
    Extension(operator): Extension<OperatorContext>,
    Path(account_id): Path<String>,
) -> Result<Json<DeviceLocation>, ApiError> {
    let location = services
        .command_log_service
        .latest_location(LatestLocationRequest {
            operator,
            account_id,
        })
        .await?;

    Ok(Json(location))
}

/// Unauthenticated: devices identify themselves by serial number or IMEI
#[instrument(name = "AcknowledgeCommand", skip(services, payload))]
pub async fn acknowledge_command(
    State(services): State<Arc<DeviceCommandApiServices>>,
    payload: Result<Json<AcknowledgeCommandBody>, JsonRejection>,
) -> Result<Json<AcknowledgementResult>, ApiError> {
    let Json(body) = payload.map_err(|rejection| {
        DomainError::ValidationError(format!("invalid acknowledgement body: {}", rejection.body_text()))
    })?;

    let result = services
        .acknowledgement_service
        .acknowledge(AcknowledgeCommandRequest {
            device_id: body.device_id,
            command: body.command,
            data: body.data,
        })
        .await?;

    Ok(Json(result))
}
