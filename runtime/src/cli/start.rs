//! Continuous mode: take the lock and run the scheduler until signaled.

use crate::cli::{load_config, GlobalOptions};
use crate::config::Config;
use crate::context::Context;
use crate::cycle::CycleRunner;
use crate::error::{exit_codes, StartupError};
use crate::lock::SingletonGuard;
use crate::scheduler::{Scheduler, SchedulerSummary};
use crate::shutdown::{self, Shutdown};
use std::sync::Arc;
use tracing::info;

pub async fn run(opts: &GlobalOptions) -> Result<i32, StartupError> {
    let config = load_config(opts)?;
    let shutdown = Shutdown::new();
    shutdown::install_signal_handlers(shutdown.clone());
    run_with_config(config, shutdown).await?;
    Ok(exit_codes::OK)
}

/// Runs until `shutdown` is requested. The lock is released before this
/// returns, on every path past a successful acquire.
pub async fn run_with_config(
    config: Config,
    shutdown: Shutdown,
) -> Result<SchedulerSummary, StartupError> {
    let guard = SingletonGuard::acquire(&config.lock_path())?;
    let interval = config.interval;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = guard.pid(),
        concurrency = config.concurrency,
        data_dir = %config.data_dir.display(),
        "starting pitchfeed"
    );

    let ctx = Arc::new(Context::from_config(config)?);
    let summary = Scheduler::new(CycleRunner::new(ctx), interval, shutdown)
        .with_guard(guard)
        .run()
        .await;
    Ok(summary)
}
