//! Runs the bridge's long-lived processes side by side and shuts them down together.
//!
//! - Every process receives a child of the runner's [`CancellationToken`]
//! - SIGINT/SIGTERM, a failing process or a panicking process cancels all of them
//! - Closers run once every process has stopped, bounded by a timeout
//! - [`Runner::run`] reports an exit code instead of exiting, so callers decide
//!
//! # Example
//!
//! ```no_run
//! use runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let code = Runner::new()
//!         .with_app_process("ticker", |ctx| async move {
//!             while !ctx.is_cancelled() {
//!                 tokio::select! {
//!                     _ = ctx.cancelled() => break,
//!                     _ = tokio::time::sleep(Duration::from_secs(1)) => tracing::info!("tick"),
//!                 }
//!             }
//!             Ok(())
//!         })
//!         .with_closer(|| async move { Ok(()) })
//!         .run()
//!         .await;
//!     std::process::exit(code);
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub type ProcessFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A long-lived process: takes the shared cancellation token and runs until it fires or fails.
pub type AppProcess = Box<dyn FnOnce(CancellationToken) -> ProcessFuture + Send>;

/// Cleanup step executed after every process has stopped.
pub type Closer = Box<dyn FnOnce() -> ProcessFuture + Send>;

/// Exit code returned when every process stopped cleanly.
pub const EXIT_OK: i32 = 0;
/// Exit code returned when a process failed or panicked.
pub const EXIT_FAILURE: i32 = 1;

pub struct Runner {
    app_processes: Vec<(String, AppProcess)>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
    handle_signals: bool,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Creates a runner with a 10 second closer timeout that listens for OS signals.
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
            handle_signals: true,
        }
    }

    /// Adds a named process. The name tags every log line the runner emits about it.
    pub fn with_app_process<F, Fut>(self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.with_boxed_process(name, Box::new(move |token| -> ProcessFuture {
            Box::pin(process(token))
        }))
    }

    /// Adds an already boxed process, as produced by module `into_runner_processes` helpers.
    pub fn with_boxed_process(mut self, name: impl Into<String>, process: AppProcess) -> Self {
        self.app_processes.push((name.into(), process));
        self
    }

    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers
            .push(Box::new(move || -> ProcessFuture { Box::pin(closer()) }));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Uses an externally owned token so other components can trigger shutdown.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Disables SIGINT/SIGTERM handling. Shutdown then relies on the cancellation token.
    pub fn without_signal_handlers(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    /// Runs every process until all finish, one fails, or shutdown is requested,
    /// then runs the closers. Returns the process exit code.
    pub async fn run(self) -> i32 {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for (name, process) in self.app_processes {
            let process_token = token.child_token();
            join_set.spawn(async move {
                tracing::info!(process = %name, "starting process");
                let result = process(process_token).await;
                (name, result)
            });
        }

        if self.handle_signals {
            spawn_signal_handlers(token.clone());
        }

        let mut failed = false;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    tracing::info!(process = %name, "process stopped");
                }
                Ok((name, Err(err))) => {
                    if !token.is_cancelled() {
                        tracing::error!(process = %name, error = %format!("{:#}", err), "process failed");
                        failed = true;
                        token.cancel();
                    } else {
                        tracing::warn!(process = %name, error = %format!("{:#}", err), "process failed during shutdown");
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "process panicked");
                    failed = true;
                    token.cancel();
                }
            }
        }

        Self::run_closers(self.closers, self.closer_timeout).await;

        if failed {
            tracing::error!("runner exiting with failure");
            EXIT_FAILURE
        } else {
            tracing::info!("runner exiting normally");
            EXIT_OK
        }
    }

    async fn run_closers(closers: Vec<Closer>, timeout: Duration) {
        if closers.is_empty() {
            return;
        }

        tracing::info!(timeout_ms = timeout.as_millis() as u64, "running closers");

        let mut closer_set = JoinSet::new();
        for closer in closers {
            closer_set.spawn(closer());
        }

        let drain = async {
            while let Some(result) = closer_set.join_next().await {
                match result {
                    Ok(Ok(())) => tracing::debug!("closer completed"),
                    Ok(Err(err)) => tracing::error!(error = %format!("{:#}", err), "closer failed"),
                    Err(err) => tracing::error!(error = %err, "closer panicked"),
                }
            }
        };

        if tokio::time::timeout(timeout, drain).await.is_err() {
            tracing::error!(timeout_ms = timeout.as_millis() as u64, "closers timed out");
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("received SIGINT, shutting down");
                ctrl_c_token.cancel();
            }
            Err(err) => tracing::error!(error = %err, "failed to listen for SIGINT"),
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("received SIGTERM, shutting down");
                token.cancel();
            }
            Err(err) => tracing::error!(error = %err, "failed to listen for SIGTERM"),
        }
    });
}
