//! Cooperative shutdown flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct Inner {
    requested: AtomicBool,
    notify: Notify,
}

/// Cheap to clone; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        if !self.inner.requested.swap(true, Ordering::SeqCst) {
            info!("shutdown requested");
        }
        self.inner.notify.notify_waiters();
    }

    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown has been requested, immediately if it already was.
    pub async fn requested(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a request in between is not lost.
        notified.as_mut().enable();
        if self.is_requested() {
            return;
        }
        notified.await;
    }
}

/// Request shutdown on SIGTERM or SIGINT.
///
/// The OS handlers are registered before this returns, so a signal that
/// arrives before the watcher task is first polled is still caught rather
/// than killing the process with the default action.
#[cfg(unix)]
pub fn install_signal_handlers(shutdown: Shutdown) {
    use tokio::signal::unix::{signal, SignalKind};
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut term), Ok(mut int)) => {
            tokio::spawn(async move {
                tokio::select! {
                    _ = term.recv() => info!("received SIGTERM"),
                    _ = int.recv() => info!("received SIGINT"),
                }
                shutdown.request();
            });
        }
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "failed to register signal handlers, falling back to ctrl-c");
            spawn_ctrl_c(shutdown);
        }
    }
}

#[cfg(not(unix))]
pub fn install_signal_handlers(shutdown: Shutdown) {
    spawn_ctrl_c(shutdown);
}

fn spawn_ctrl_c(shutdown: Shutdown) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt");
            shutdown.request();
        }
    });
}
