use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use common::auth::extract_operator_context;
use common::http::ApiError;
use std::sync::Arc;
use tracing::debug;

use crate::http::DeviceCommandApiServices;

/// Reject requests without a valid operator bearer token and expose the
/// operator to handlers as an `Extension<OperatorContext>`
pub async fn require_operator(
    State(services): State<Arc<DeviceCommandApiServices>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let operator =
        extract_operator_context(request.headers(), services.auth_token_provider.as_ref())?;

    debug!(operator_id = %operator.operator_id, role = %operator.role, "authenticated operator");
    request.extensions_mut().insert(operator);

    Ok(next.run(request).await)
}
