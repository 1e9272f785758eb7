use crate::http::{build_router, DeviceCommandApiServices};
use common::http::{run_http_server, HttpServerConfig};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Operator and device HTTP surface for remote device commands
pub struct DeviceCommandApi {
    services: DeviceCommandApiServices,
    config: HttpServerConfig,
}

impl DeviceCommandApi {
    pub fn new(services: DeviceCommandApiServices, config: HttpServerConfig) -> Self {
        debug!(port = config.port, "Initializing device command API module");
        Self { services, config }
    }

    pub fn into_runner_process(
        self,
    ) -> impl FnOnce(
        CancellationToken,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
    > {
        move |ctx| {
            Box::pin(async move {
                run_http_server(self.config, build_router(self.services), ctx).await
            })
        }
    }
}
