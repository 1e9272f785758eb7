use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use common::auth::AuthTokenProvider;
use std::sync::Arc;

use crate::domain::{AcknowledgementService, CommandDispatchService, CommandLogService};
use crate::http::{
    acknowledge_command, dispatch_command, get_command_log, healthz, latest_location,
    list_command_logs, require_operator,
};

/// Everything the HTTP surface needs, shared across handlers
pub struct DeviceCommandApiServices {
    pub dispatch_service: Arc<CommandDispatchService>,
    pub acknowledgement_service: Arc<AcknowledgementService>,
    pub command_log_service: Arc<CommandLogService>,
    pub auth_token_provider: Arc<dyn AuthTokenProvider>,
}

pub fn build_router(services: DeviceCommandApiServices) -> Router {
    let state = Arc::new(services);

    let operator_routes = Router::new()
        .route(
            "/api/v1/accounts/:account_id/commands/:action",
            post(dispatch_command),
        )
        .route(
            "/api/v1/accounts/:account_id/command-logs",
            get(list_command_logs),
        )
        .route("/api/v1/accounts/:account_id/location", get(latest_location))
        .route("/api/v1/command-logs/:log_id", get(get_command_log))
        .layer(middleware::from_fn_with_state(state.clone(), require_operator));

    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/api/v1/device/command-acknowledgements",
            post(acknowledge_command),
        )
        .merge(operator_routes)
        .with_state(state)
}
