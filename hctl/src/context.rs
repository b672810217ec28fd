//! Per-command execution context:
//! the cancellation token and deadline every I/O-performing call threads
//! through, plus the loaded config and output adapter every command shares.
//!
//! A typed context object built once per run rather than scattered
//! process-wide state, since hctl is multi-threaded under `tokio` and
//! needs a real cancellation story.
use hctl_core::config::Config;
use hctl_core::error::{ErrorKind, Result};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::output::OutputAdapter;

/// Default deadline for read-only commands.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(20);

/// Carries the root cancellation token (tied to Ctrl-C) and a deadline
/// (`None` for indefinite commands) through every suspension point of one
/// command invocation.
#[derive(Clone)]
pub struct CommandContext {
    pub config: Config,
    pub output: OutputAdapter,
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl CommandContext {
    /// Build a context wired to OS Ctrl-C and the given deadline.
    /// `None` means indefinite (follow-logs, readiness watches with no
    /// `--watch` timeout), still subject to cancellation.
    pub fn new(config: Config, output: OutputAdapter, deadline: Option<Duration>) -> CommandContext {
        let cancellation = CancellationToken::new();
        let token = cancellation.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            token.cancel();
        });
        CommandContext {
            config,
            output,
            cancellation,
            deadline: deadline.map(|d| Instant::now() + d),
        }
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Whether the deadline (if any) has already tripped.
    pub fn deadline_exceeded(&self) -> bool {
        self.deadline.map(|d| Instant::now() >= d).unwrap_or(false)
    }

    /// Race an arbitrary future against cancellation and the deadline.
    /// Returns `TimeoutError` (70) on deadline, and `InternalError` (1) on
    /// user cancellation.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        let cancelled = self.cancellation.clone();
        tokio::select! {
            res = fut => res,
            _ = cancelled.cancelled() => {
                Err(ErrorKind::internal("command cancelled").into())
            }
            _ = sleep_until_deadline(self.deadline) => {
                Err(ErrorKind::timeout("command deadline exceeded").into())
            }
        }
    }
}

/// Sleeps until `deadline`, or forever if there is none — lets `run` use a
/// single `tokio::select!` arm regardless of whether a deadline was set.
async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{OutputAdapter, OutputFormat};

    #[tokio::test]
    async fn run_returns_ok_before_deadline() {
        let ctx = CommandContext::new(
            Config::default(),
            OutputAdapter::new(OutputFormat::Text, false),
            Some(Duration::from_secs(5)),
        );
        let res: Result<i32> = ctx.run(async { Ok(42) }).await;
        assert_eq!(res.unwrap(), 42);
    }

    #[tokio::test]
    async fn run_times_out() {
        let ctx = CommandContext::new(
            Config::default(),
            OutputAdapter::new(OutputFormat::Text, false),
            Some(Duration::from_millis(5)),
        );
        let res: Result<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        let err = res.unwrap_err();
        assert_eq!(err.exit_code(), 70);
    }
}
