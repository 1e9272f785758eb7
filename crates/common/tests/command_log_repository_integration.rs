#![cfg(feature = "integration-tests")]

use common::domain::{
    AccountRepository, CommandLogRepository, CommandStatus, CreateCommandLogInput,
    DeliverCommandLogInput, DeviceStateChange, DispatchOutcome, DomainError, JsonMap,
    ListCommandLogsInput, RecordDispatchOutcomeInput, UpdateAccountAfterDispatchInput,
};
use common::postgres::{PostgresAccountRepository, PostgresClient, PostgresCommandLogRepository};
use goose::MigrationRunner;
use serde_json::json;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;

struct TestDb {
    _container: ContainerAsync<Postgres>,
    client: PostgresClient,
}

async fn setup_test_db() -> TestDb {
    let postgres = Postgres::default().start().await.unwrap();
    let host = postgres.get_host().await.unwrap();
    let port = postgres.get_host_port_ipv4(5432).await.unwrap();

    let migrations_dir = format!(
        "{}/../emi_all_in_one/migrations/postgres",
        env!("CARGO_MANIFEST_DIR")
    );
    let dsn = format!(
        "postgres://postgres:postgres@{}:{}/postgres?sslmode=disable",
        host, port
    );
    let goose_path = which::which("goose").expect("goose binary not found");

    MigrationRunner::new(
        goose_path.to_string_lossy().to_string(),
        migrations_dir,
        "postgres".to_string(),
        dsn,
    )
    .run_migrations()
    .await
    .expect("Migrations failed");

    let client = PostgresClient::new(&host.to_string(), port, "postgres", "postgres", "postgres", 5)
        .expect("Failed to create client");

    TestDb {
        _container: postgres,
        client,
    }
}

async fn insert_account(client: &PostgresClient, account_id: &str, serial: &str, imei_1: &str) {
    let conn = client.get_connection().await.unwrap();
    conn.execute(
        "INSERT INTO accounts (account_id, operator_id, name, serial_number, imei_1, push_token, status)
         VALUES ($1, 'op-1', 'Amaka Obi', $2, $3, 'fcm-token-1', 'active')",
        &[&account_id, &serial, &imei_1],
    )
    .await
    .unwrap();
}

fn pending(account_id: &str, command: &str) -> CreateCommandLogInput {
    let mut params = JsonMap::new();
    params.insert("state".to_string(), json!(true));
    CreateCommandLogInput {
        account_id: account_id.to_string(),
        command: command.to_string(),
        params,
        initiated_by: "op-1".to_string(),
    }
}

/// Commit a dispatch that ends in `sent`, returning the log id
async fn committed_sent_log(repo: &PostgresCommandLogRepository, account_id: &str, command: &str) -> i64 {
    let mut uow = repo.begin_dispatch().await.unwrap();
    let log = uow.create_pending_log(pending(account_id, command)).await.unwrap();
    uow.record_outcome(RecordDispatchOutcomeInput {
        log_id: log.id,
        outcome: DispatchOutcome::Sent {
            sent_at: chrono::Utc::now(),
            response: Some(json!({"name": "projects/emi/messages/1"})),
        },
    })
    .await
    .unwrap();
    uow.commit().await.unwrap();
    log.id
}

#[tokio::test]
async fn test_find_account_by_any_device_identifier() {
    let db = setup_test_db().await;
    insert_account(&db.client, "acc-1", "R58N12ABCDE", "356938035643809").await;
    let repo = PostgresAccountRepository::new(db.client.clone());

    let by_serial = repo.find_by_device_identifier("R58N12ABCDE").await.unwrap();
    let by_imei = repo.find_by_device_identifier("356938035643809").await.unwrap();
    let missing = repo.find_by_device_identifier("000000000000000").await.unwrap();

    assert_eq!(by_serial.unwrap().account_id, "acc-1");
    assert_eq!(by_imei.unwrap().account_id, "acc-1");
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_committed_dispatch_updates_log_and_account() {
    let db = setup_test_db().await;
    insert_account(&db.client, "acc-1", "R58N12ABCDE", "356938035643809").await;
    let logs = PostgresCommandLogRepository::new(db.client.clone());
    let accounts = PostgresAccountRepository::new(db.client.clone());

    let mut uow = logs.begin_dispatch().await.unwrap();
    let log = uow.create_pending_log(pending("acc-1", "LOCK_DEVICE")).await.unwrap();
    assert_eq!(log.status, CommandStatus::Pending);

    let sent = uow
        .record_outcome(RecordDispatchOutcomeInput {
            log_id: log.id,
            outcome: DispatchOutcome::Sent {
                sent_at: chrono::Utc::now(),
                response: None,
            },
        })
        .await
        .unwrap();
    assert_eq!(sent.status, CommandStatus::Sent);
    assert!(sent.sent_at.is_some());

    uow.update_account(UpdateAccountAfterDispatchInput {
        account_id: "acc-1".to_string(),
        last_command_sent_at: chrono::Utc::now(),
        state_change: Some(DeviceStateChange::DeviceLocked(true)),
    })
    .await
    .unwrap();
    uow.commit().await.unwrap();

    let stored = logs.get_command_log(log.id).await.unwrap().unwrap();
    assert_eq!(stored.status, CommandStatus::Sent);
    assert_eq!(stored.params.get("state"), Some(&json!(true)));

    let account = accounts.get_account("acc-1").await.unwrap().unwrap();
    assert!(account.is_device_locked);
    assert!(account.last_command_sent_at.is_some());
}

#[tokio::test]
async fn test_rolled_back_dispatch_leaves_no_trace() {
    let db = setup_test_db().await;
    insert_account(&db.client, "acc-1", "R58N12ABCDE", "356938035643809").await;
    let logs = PostgresCommandLogRepository::new(db.client.clone());
    let accounts = PostgresAccountRepository::new(db.client.clone());

    let mut uow = logs.begin_dispatch().await.unwrap();
    uow.create_pending_log(pending("acc-1", "LOCK_DEVICE")).await.unwrap();
    let err = uow
        .update_account(UpdateAccountAfterDispatchInput {
            account_id: "acc-missing".to_string(),
            last_command_sent_at: chrono::Utc::now(),
            state_change: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::AccountNotFound(_)));
    uow.rollback().await.unwrap();

    let listed = logs
        .list_command_logs(ListCommandLogsInput {
            account_id: "acc-1".to_string(),
            command: None,
            limit: 50,
        })
        .await
        .unwrap();
    assert!(listed.is_empty());
    assert!(accounts
        .get_account("acc-1")
        .await
        .unwrap()
        .unwrap()
        .last_command_sent_at
        .is_none());
}

#[tokio::test]
async fn test_dropped_unit_of_work_discards_writes() {
    let db = setup_test_db().await;
    insert_account(&db.client, "acc-1", "R58N12ABCDE", "356938035643809").await;
    let logs = PostgresCommandLogRepository::new(db.client.clone());

    {
        let mut uow = logs.begin_dispatch().await.unwrap();
        uow.create_pending_log(pending("acc-1", "WIPE_DEVICE")).await.unwrap();
    }

    let listed = logs
        .list_command_logs(ListCommandLogsInput {
            account_id: "acc-1".to_string(),
            command: None,
            limit: 50,
        })
        .await
        .unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn test_deliver_latest_sent_only_touches_newest() {
    let db = setup_test_db().await;
    insert_account(&db.client, "acc-1", "R58N12ABCDE", "356938035643809").await;
    let logs = PostgresCommandLogRepository::new(db.client.clone());

    let older = committed_sent_log(&logs, "acc-1", "REQUEST_LOCATION").await;
    let newer = committed_sent_log(&logs, "acc-1", "REQUEST_LOCATION").await;

    let mut location = JsonMap::new();
    location.insert("latitude".to_string(), json!(6.5244));
    location.insert("longitude".to_string(), json!(3.3792));

    let delivered = logs
        .deliver_latest_sent(DeliverCommandLogInput {
            account_id: "acc-1".to_string(),
            command: "REQUEST_LOCATION".to_string(),
            metadata: location.clone(),
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(delivered.id, newer);
    assert_eq!(delivered.status, CommandStatus::Delivered);
    assert_eq!(delivered.metadata, Some(location.clone()));
    assert_eq!(
        logs.get_command_log(older).await.unwrap().unwrap().status,
        CommandStatus::Sent
    );

    let latest = logs
        .latest_delivered_with_metadata("acc-1", "REQUEST_LOCATION")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.id, newer);
    assert!(latest.has_location_response());
}

#[tokio::test]
async fn test_deliver_ignores_failed_logs() {
    let db = setup_test_db().await;
    insert_account(&db.client, "acc-1", "R58N12ABCDE", "356938035643809").await;
    let logs = PostgresCommandLogRepository::new(db.client.clone());

    let mut uow = logs.begin_dispatch().await.unwrap();
    let log = uow.create_pending_log(pending("acc-1", "LOCK_DEVICE")).await.unwrap();
    uow.record_outcome(RecordDispatchOutcomeInput {
        log_id: log.id,
        outcome: DispatchOutcome::Failed {
            error_message: "UNREGISTERED".to_string(),
            response: Some(json!({"error": {"status": "NOT_FOUND"}})),
        },
    })
    .await
    .unwrap();
    uow.commit().await.unwrap();

    let delivered = logs
        .deliver_latest_sent(DeliverCommandLogInput {
            account_id: "acc-1".to_string(),
            command: "LOCK_DEVICE".to_string(),
            metadata: JsonMap::new(),
        })
        .await
        .unwrap();

    assert!(delivered.is_none());
    let stored = logs.get_command_log(log.id).await.unwrap().unwrap();
    assert_eq!(stored.status, CommandStatus::Failed);
    assert_eq!(stored.error_message.as_deref(), Some("UNREGISTERED"));
}

#[tokio::test]
async fn test_list_filters_and_limits_newest_first() {
    let db = setup_test_db().await;
    insert_account(&db.client, "acc-1", "R58N12ABCDE", "356938035643809").await;
    let logs = PostgresCommandLogRepository::new(db.client.clone());

    let first = committed_sent_log(&logs, "acc-1", "LOCK_DEVICE").await;
    let _location = committed_sent_log(&logs, "acc-1", "REQUEST_LOCATION").await;
    let third = committed_sent_log(&logs, "acc-1", "LOCK_DEVICE").await;

    let locks = logs
        .list_command_logs(ListCommandLogsInput {
            account_id: "acc-1".to_string(),
            command: Some("LOCK_DEVICE".to_string()),
            limit: 50,
        })
        .await
        .unwrap();
    let ids: Vec<i64> = locks.iter().map(|l| l.id).collect();
    assert_eq!(ids, vec![third, first]);

    let limited = logs
        .list_command_logs(ListCommandLogsInput {
            account_id: "acc-1".to_string(),
            command: None,
            limit: 1,
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].id, third);
}
