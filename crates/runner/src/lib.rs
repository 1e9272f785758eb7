//! Process supervisor for the all-in-one binary.
//!
//! Named app processes run concurrently against a shared cancellation
//! token. The first failure, a SIGINT or a SIGTERM cancels everything;
//! closers then run once under a timeout.
//!
//! ```no_run
//! use emi_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     Runner::new()
//!         .with_named_process("heartbeat", |ctx| async move {
//!             ctx.cancelled().await;
//!             Ok(())
//!         })
//!         .with_closer(|| async move { Ok(()) })
//!         .with_closer_timeout(Duration::from_secs(5))
//!         .run()
//!         .await;
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub type BoxedRunFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Long-running unit of work; must return once its token is cancelled
pub type AppProcess = Box<dyn FnOnce(CancellationToken) -> BoxedRunFuture + Send>;

/// Cleanup executed after every app process has stopped
pub type Closer = Box<dyn FnOnce() -> BoxedRunFuture + Send>;

const DEFAULT_CLOSER_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Runner {
    app_processes: Vec<(String, AppProcess)>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: DEFAULT_CLOSER_TIMEOUT,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Register a process under a name used in shutdown logs
    pub fn with_named_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.app_processes
            .push((name.into(), Box::new(|token| Box::pin(process(token)))));
        self
    }

    pub fn with_app_process<F, Fut>(self, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = format!("process-{}", self.app_processes.len());
        self.with_named_process(name, process)
    }

    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Run until stopped, then exit the process: 1 if any app process failed
    pub async fn run(self) {
        spawn_signal_listeners(self.cancellation_token.clone());

        match self.run_until_stopped().await {
            Ok(()) => {
                info!("application exiting normally");
                std::process::exit(0);
            }
            Err(err) => {
                error!("application exiting with error: {:#}", err);
                std::process::exit(1);
            }
        }
    }

    /// Drive every app process until cancellation or the first failure,
    /// then run the closers. Returns the first process error.
    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for (name, process) in self.app_processes {
            let process_token = token.clone();
            join_set.spawn(async move { (name, process(process_token).await) });
        }

        let mut first_error = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => debug!(process = %name, "app process stopped"),
                Ok((name, Err(err))) => {
                    if token.is_cancelled() {
                        warn!(process = %name, "app process failed during shutdown: {:#}", err);
                    } else {
                        error!(process = %name, "app process failed: {:#}", err);
                        first_error = Some(err.context(format!("process {} failed", name)));
                        token.cancel();
                    }
                }
                Err(err) => {
                    error!("app process panicked: {}", err);
                    if first_error.is_none() && !token.is_cancelled() {
                        first_error = Some(anyhow::anyhow!("app process panicked: {}", err));
                    }
                    token.cancel();
                }
            }
        }

        run_closers(self.closers, self.closer_timeout).await;

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn spawn_signal_listeners(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received SIGINT, shutting down");
                ctrl_c_token.cancel();
            }
            Err(err) => error!("failed to listen for SIGINT: {}", err),
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("received SIGTERM, shutting down");
                token.cancel();
            }
            Err(err) => error!("failed to listen for SIGTERM: {}", err),
        }
    });
}

async fn run_closers(closers: Vec<Closer>, timeout: Duration) {
    if closers.is_empty() {
        return;
    }

    info!(?timeout, count = closers.len(), "running closers");

    let mut closer_set = JoinSet::new();
    for closer in closers {
        closer_set.spawn(closer());
    }

    let drain = async {
        while let Some(result) = closer_set.join_next().await {
            match result {
                Ok(Ok(())) => debug!("closer completed"),
                Ok(Err(err)) => error!("closer failed: {:#}", err),
                Err(err) => error!("closer panicked: {}", err),
            }
        }
    };

    if tokio::time::timeout(timeout, drain).await.is_err() {
        error!(?timeout, "closers timed out");
    }
}
