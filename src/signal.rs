//! Signal handling and cancellation.
//!
//! SIGINT and SIGTERM cancel a shared [`ShutdownToken`]; long-running stages
//! such as the snapshot download race their work against
//! [`ShutdownToken::cancelled`] and unwind without retrying.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

struct TokenInner {
    flag: AtomicBool,
    notify: Notify,
}

/// A token that can be shared across tasks to request and observe cancellation.
#[derive(Clone)]
pub struct ShutdownToken {
    inner: Arc<TokenInner>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                flag: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Request cancellation on this token and every clone of it.
    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Resolve once cancellation has been requested.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel() is not missed
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns a task that cancels `token` on SIGINT or SIGTERM.
///
/// If signal handlers cannot be registered (e.g., in restricted environments),
/// the guard is still created but signal handling will be disabled.
/// Dropping the guard stops listening, so later stages are not cancelled.
pub struct ShutdownGuard {
    task: JoinHandle<()>,
}

impl ShutdownGuard {
    pub fn new(token: ShutdownToken) -> Self {
        let task = tokio::spawn(async move {
            let sigint = match signal(SignalKind::interrupt()) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!("Failed to register SIGINT handler: {}", e);
                    None
                }
            };

            let sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!("Failed to register SIGTERM handler: {}", e);
                    None
                }
            };

            match (sigint, sigterm) {
                (Some(mut int), Some(mut term)) => {
                    tokio::select! {
                        _ = int.recv() => info!("Received SIGINT, cancelling..."),
                        _ = term.recv() => info!("Received SIGTERM, cancelling..."),
                    }
                    token.cancel();
                }
                (Some(mut int), None) => {
                    int.recv().await;
                    info!("Received SIGINT, cancelling...");
                    token.cancel();
                }
                (None, Some(mut term)) => {
                    term.recv().await;
                    info!("Received SIGTERM, cancelling...");
                    token.cancel();
                }
                (None, None) => {
                    warn!("No signal handlers registered - cancellation by signal disabled");
                }
            }
        });

        Self { task }
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}
