use crate::domain::{
    Account, AccountRepository, CommandLog, CommandLogRepository, CommandStatus,
    CreateCommandLogInput, DeliverCommandLogInput, DispatchOutcome, DispatchUnitOfWork,
    DomainError, DomainResult, ListCommandLogsInput, RecordDispatchOutcomeInput,
    UpdateAccountAfterDispatchInput,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct StoreState {
    accounts: Vec<Account>,
    logs: Vec<CommandLog>,
}

/// In-memory accounts and command logs with transactional dispatch semantics.
///
/// Writes made through a unit of work are staged and only become visible on
/// commit. Log ids are drawn from a shared sequence, so a rolled back attempt
/// leaves a gap like a database sequence would.
#[derive(Clone)]
pub struct InMemoryCommandStore {
    state: Arc<RwLock<StoreState>>,
    next_log_id: Arc<AtomicI64>,
    fail_account_updates: Arc<AtomicBool>,
}

impl InMemoryCommandStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            next_log_id: Arc::new(AtomicI64::new(1)),
            fail_account_updates: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn insert_account(&self, account: Account) {
        let mut state = self.state.write().await;
        state.accounts.retain(|a| a.account_id != account.account_id);
        state.accounts.push(account);
    }

    /// Seed a committed log, keeping the id sequence ahead of it
    pub async fn insert_command_log(&self, log: CommandLog) {
        self.next_log_id.fetch_max(log.id + 1, Ordering::SeqCst);
        self.state.write().await.logs.push(log);
    }

    pub async fn account(&self, account_id: &str) -> Option<Account> {
        let state = self.state.read().await;
        state
            .accounts
            .iter()
            .find(|a| a.account_id == account_id)
            .cloned()
    }

    pub async fn command_logs(&self) -> Vec<CommandLog> {
        self.state.read().await.logs.clone()
    }

    /// Make every subsequent account update inside a unit of work fail
    pub fn fail_account_updates(&self, fail: bool) {
        self.fail_account_updates.store(fail, Ordering::SeqCst);
    }
}

impl Default for InMemoryCommandStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountRepository for InMemoryCommandStore {
    async fn get_account(&self, account_id: &str) -> DomainResult<Option<Account>> {
        Ok(self.account(account_id).await)
    }

    async fn find_by_device_identifier(&self, identifier: &str) -> DomainResult<Option<Account>> {
        let state = self.state.read().await;
        // Same order as the SQL lookup: field precedence, then oldest, NULLs last
        Ok(state
            .accounts
            .iter()
            .filter_map(|a| a.device_identifier_rank(identifier).map(|rank| (rank, a)))
            .min_by_key(|(rank, a)| (*rank, a.created_at.is_none(), a.created_at))
            .map(|(_, a)| a.clone()))
    }
}

#[async_trait]
impl CommandLogRepository for InMemoryCommandStore {
    async fn begin_dispatch(&self) -> DomainResult<Box<dyn DispatchUnitOfWork>> {
        Ok(Box::new(InMemoryDispatchUnitOfWork {
            store: self.clone(),
            staged_logs: Vec::new(),
            staged_accounts: Vec::new(),
        }))
    }

    async fn deliver_latest_sent(
        &self,
        input: DeliverCommandLogInput,
    ) -> DomainResult<Option<CommandLog>> {
        let mut state = self.state.write().await;
        let latest = state
            .logs
            .iter_mut()
            .filter(|log| {
                log.account_id == input.account_id
                    && log.command == input.command
                    && log.status == CommandStatus::Sent
            })
            .max_by_key(|log| (log.created_at, log.id));

        Ok(latest.map(|log| {
            log.status = CommandStatus::Delivered;
            log.metadata = Some(input.metadata);
            log.updated_at = Utc::now();
            log.clone()
        }))
    }

    async fn get_command_log(&self, log_id: i64) -> DomainResult<Option<CommandLog>> {
        let state = self.state.read().await;
        Ok(state.logs.iter().find(|log| log.id == log_id).cloned())
    }

    async fn list_command_logs(
        &self,
        input: ListCommandLogsInput,
    ) -> DomainResult<Vec<CommandLog>> {
        let state = self.state.read().await;
        let mut logs: Vec<CommandLog> = state
            .logs
            .iter()
            .filter(|log| log.account_id == input.account_id)
            .filter(|log| input.command.as_ref().is_none_or(|c| &log.command == c))
            .cloned()
            .collect();
        logs.sort_by_key(|log| std::cmp::Reverse((log.created_at, log.id)));
        logs.truncate(input.limit.max(0) as usize);
        Ok(logs)
    }

    async fn latest_delivered_with_metadata(
        &self,
        account_id: &str,
        command: &str,
    ) -> DomainResult<Option<CommandLog>> {
        let state = self.state.read().await;
        Ok(state
            .logs
            .iter()
            .filter(|log| {
                log.account_id == account_id
                    && log.command == command
                    && log.status == CommandStatus::Delivered
                    && log.metadata.as_ref().is_some_and(|m| !m.is_empty())
            })
            .max_by_key(|log| (log.created_at, log.id))
            .cloned())
    }
}

struct InMemoryDispatchUnitOfWork {
    store: InMemoryCommandStore,
    staged_logs: Vec<CommandLog>,
    staged_accounts: Vec<UpdateAccountAfterDispatchInput>,
}

#[async_trait]
impl DispatchUnitOfWork for InMemoryDispatchUnitOfWork {
    async fn create_pending_log(
        &mut self,
        input: CreateCommandLogInput,
    ) -> DomainResult<CommandLog> {
        if self.store.account(&input.account_id).await.is_none() {
            return Err(DomainError::RepositoryError(anyhow::anyhow!(
                "account {} does not exist",
                input.account_id
            )));
        }

        let now = Utc::now();
        let log = CommandLog {
            id: self.store.next_log_id.fetch_add(1, Ordering::SeqCst),
            account_id: input.account_id,
            command: input.command,
            params: input.params,
            status: CommandStatus::Pending,
            response: None,
            metadata: None,
            error_message: None,
            sent_at: None,
            initiated_by: input.initiated_by,
            created_at: now,
            updated_at: now,
        };
        self.staged_logs.push(log.clone());
        Ok(log)
    }

    async fn record_outcome(
        &mut self,
        input: RecordDispatchOutcomeInput,
    ) -> DomainResult<CommandLog> {
        let log = self
            .staged_logs
            .iter_mut()
            .find(|log| log.id == input.log_id)
            .ok_or_else(|| DomainError::CommandLogNotFound(input.log_id.to_string()))?;

        let next = input.outcome.status();
        if !log.status.can_transition_to(next) {
            return Err(DomainError::RepositoryError(anyhow::anyhow!(
                "illegal transition {} -> {} for log {}",
                log.status,
                next,
                log.id
            )));
        }

        match input.outcome {
            DispatchOutcome::Sent { sent_at, response } => {
                log.sent_at = Some(sent_at);
                log.response = response;
            }
            DispatchOutcome::Failed {
                error_message,
                response,
            } => {
                log.error_message = Some(error_message);
                log.response = response;
            }
        }
        log.status = next;
        log.updated_at = Utc::now();
        Ok(log.clone())
    }

    async fn update_account(&mut self, input: UpdateAccountAfterDispatchInput) -> DomainResult<()> {
        if self.store.fail_account_updates.load(Ordering::SeqCst) {
            return Err(DomainError::RepositoryError(anyhow::anyhow!(
                "account update failed"
            )));
        }
        if self.store.account(&input.account_id).await.is_none() {
            return Err(DomainError::AccountNotFound(input.account_id));
        }
        self.staged_accounts.push(input);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> DomainResult<()> {
        let InMemoryDispatchUnitOfWork {
            store,
            staged_logs,
            staged_accounts,
        } = *self;

        let mut state = store.state.write().await;
        for log in staged_logs {
            state.logs.retain(|existing| existing.id != log.id);
            state.logs.push(log);
        }
        for update in staged_accounts {
            if let Some(account) = state
                .accounts
                .iter_mut()
                .find(|a| a.account_id == update.account_id)
            {
                account.last_command_sent_at = Some(update.last_command_sent_at);
                if let Some(change) = &update.state_change {
                    account.apply_state_change(change);
                }
                account.updated_at = Some(update.last_command_sent_at);
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DomainResult<()> {
        Ok(())
    }
}
