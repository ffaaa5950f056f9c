//! Stop the running pitchfeed scheduler.

use crate::cli::GlobalOptions;
use crate::config;
use crate::lock;
use anyhow::{bail, Context, Result};
use std::time::Duration;

/// Send SIGTERM to the lock owner and wait up to 5 seconds for it to exit.
pub async fn run(opts: &GlobalOptions) -> Result<()> {
    let lock_path = config::lock_path_in(&opts.data_dir());

    let Some(record) = lock::read_record(&lock_path) else {
        bail!(
            "pitchfeed is not running (no lock file at {})",
            lock_path.display()
        );
    };
    let pid = record.pid;

    if !lock::pid_alive(pid) {
        let _ = std::fs::remove_file(&lock_path);
        println!("Removed stale lock for PID {pid}.");
        return Ok(());
    }

    println!("Stopping pitchfeed (PID {pid})...");

    #[cfg(unix)]
    {
        let output = std::process::Command::new("kill")
            .arg(pid.to_string())
            .output()
            .context("failed to send SIGTERM")?;
        if !output.status.success() {
            bail!("failed to send SIGTERM to PID {pid} (process may have already exited)");
        }
    }

    // The owner removes its own lock once the current cycle finishes.
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if !lock::pid_alive(pid) || !lock_path.exists() {
            println!("pitchfeed stopped.");
            return Ok(());
        }
    }

    println!("Warning: pitchfeed is still finishing its current cycle (PID {pid}).");
    Ok(())
}
