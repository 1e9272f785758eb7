mod config;

use common::auth::{AccountOwnershipAuthorizer, JwtAuthTokenProvider, JwtConfig};
use common::domain::PushSender;
use common::fcm::{
    FcmAccessTokenProvider, FcmConfig, FcmPushSender, ServiceAccountKey,
    ServiceAccountTokenProvider, StaticAccessTokenProvider,
};
use common::nats::{NatsAcknowledgementNotifier, NatsClient};
use common::postgres::{PostgresAccountRepository, PostgresClient, PostgresCommandLogRepository};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryProviders};
use crate::config::ServiceConfig;
use device_command_api::{
    AcknowledgementService, CommandDispatchService, CommandLogService, DeviceCommandApi,
    DeviceCommandApiServices,
};
use emi_runner::Runner;
use goose::MigrationRunner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&config.telemetry())
    {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        otel_enabled = config.otel_enabled,
        http_port = config.http_port,
        "Starting emi-all-in-one service"
    );
    debug!(
        postgres_host = %config.postgres_host,
        nats_url = %config.nats_url,
        fcm_project_id = %config.fcm_project_id,
        "Loaded configuration"
    );

    let dependencies = match initialize_dependencies(&config).await {
        Ok(deps) => deps,
        Err(e) => {
            error!("Failed to initialize dependencies: {:#}", e);
            std::process::exit(1);
        }
    };

    let authorizer = Arc::new(AccountOwnershipAuthorizer::new());
    let notifier = Arc::new(NatsAcknowledgementNotifier::new(
        dependencies.nats.create_publisher_client(),
        config.nats_acknowledgements_stream.clone(),
    ));

    let services = DeviceCommandApiServices {
        dispatch_service: Arc::new(CommandDispatchService::new(
            dependencies.accounts.clone(),
            dependencies.command_logs.clone(),
            dependencies.push_sender,
            authorizer.clone(),
        )),
        acknowledgement_service: Arc::new(AcknowledgementService::new(
            dependencies.accounts.clone(),
            dependencies.command_logs.clone(),
            notifier,
        )),
        command_log_service: Arc::new(CommandLogService::new(
            dependencies.accounts,
            dependencies.command_logs,
            authorizer,
        )),
        auth_token_provider: Arc::new(JwtAuthTokenProvider::new(JwtConfig::new(
            config.jwt_secret.clone(),
            config.jwt_expiration_hours,
        ))),
    };

    let device_command_api = DeviceCommandApi::new(services, config.http_server());

    let nats_for_close = dependencies.nats;
    Runner::new()
        .with_named_process("device_command_api", device_command_api.into_runner_process())
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            if let Err(e) = nats_for_close.close().await {
                error!("Failed to close NATS connection: {:#}", e);
            }

            shutdown_telemetry(telemetry_providers);
            info!("Cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(config.closer_timeout_secs))
        .run()
        .await;
}

struct Dependencies {
    accounts: Arc<PostgresAccountRepository>,
    command_logs: Arc<PostgresCommandLogRepository>,
    nats: Arc<NatsClient>,
    push_sender: Arc<dyn PushSender>,
}

async fn initialize_dependencies(config: &ServiceConfig) -> anyhow::Result<Dependencies> {
    info!("Initializing PostgreSQL...");
    let postgres_config = config.postgres();
    MigrationRunner::new(
        config.postgres_goose_binary_path.clone(),
        config.postgres_migrations_dir.clone(),
        "postgres".to_string(),
        postgres_config.dsn(),
    )
    .run_migrations()
    .await?;

    let postgres_client = PostgresClient::from_config(&postgres_config)?;
    postgres_client.ping().await?;

    info!("Initializing NATS...");
    let nats = NatsClient::connect(
        &config.nats_url,
        Duration::from_secs(config.startup_timeout_secs),
    )
    .await?;
    nats.ensure_stream(
        &config.nats_acknowledgements_stream,
        "Device command acknowledgement events, one subject per operator",
    )
    .await?;

    info!("Initializing FCM push sender...");
    let push_sender = create_push_sender(&config.fcm())?;

    Ok(Dependencies {
        accounts: Arc::new(PostgresAccountRepository::new(postgres_client.clone())),
        command_logs: Arc::new(PostgresCommandLogRepository::new(postgres_client)),
        nats: Arc::new(nats),
        push_sender,
    })
}

fn create_push_sender(config: &FcmConfig) -> anyhow::Result<Arc<dyn PushSender>> {
    if config.project_id.trim().is_empty() {
        anyhow::bail!("EMI_FCM_PROJECT_ID must be set");
    }

    let http = FcmPushSender::http_client(config)?;

    let tokens: Arc<dyn FcmAccessTokenProvider> =
        match (&config.service_account_key_path, &config.access_token) {
            (Some(path), _) => {
                info!(path = %path, "Using FCM service account credentials");
                Arc::new(ServiceAccountTokenProvider::new(
                    ServiceAccountKey::from_file(path)?,
                    http.clone(),
                ))
            }
            (None, Some(token)) => {
                info!("Using static FCM access token");
                Arc::new(StaticAccessTokenProvider::new(token.clone()))
            }
            (None, None) => anyhow::bail!(
                "either EMI_FCM_SERVICE_ACCOUNT_KEY_PATH or EMI_FCM_ACCESS_TOKEN must be set"
            ),
        };

    Ok(Arc::new(FcmPushSender::new(http, tokens, config.send_url())))
}
