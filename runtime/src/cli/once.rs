//! Single-run mode: take the lock, run one cycle, exit.

use crate::cli::{load_config, GlobalOptions};
use crate::config::Config;
use crate::context::Context;
use crate::cycle::{CycleReport, CycleRunner};
use crate::error::{exit_codes, StartupError};
use crate::lock::SingletonGuard;
use crate::shutdown::{self, Shutdown};
use std::sync::Arc;
use tracing::info;

pub async fn run(opts: &GlobalOptions) -> Result<i32, StartupError> {
    let config = load_config(opts)?;
    let shutdown = Shutdown::new();
    shutdown::install_signal_handlers(shutdown.clone());
    let report = run_with_config(config, &shutdown).await?;
    Ok(if report.is_done() {
        exit_codes::OK
    } else {
        exit_codes::FAILURE
    })
}

/// The lock is held for the cycle and released before this returns. A
/// shutdown request does not cut the cycle short; it only gets logged.
pub async fn run_with_config(
    config: Config,
    shutdown: &Shutdown,
) -> Result<CycleReport, StartupError> {
    let mut guard = SingletonGuard::acquire(&config.lock_path())?;
    let ctx = Context::from_config(config)?;
    info!(pid = guard.pid(), "running single cycle");

    let report = CycleRunner::new(Arc::new(ctx)).run_once().await;
    if shutdown.is_requested() {
        info!(state = ?report.state, "signal received during cycle, exiting after it");
    }
    guard.release()?;
    Ok(report)
}
