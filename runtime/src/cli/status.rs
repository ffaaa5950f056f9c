//! Report lock ownership and today's cycle count.

use crate::cli::GlobalOptions;
use crate::clock;
use crate::config;
use crate::counter::DailyCounter;
use crate::lock;
use anyhow::Result;
use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub running: bool,
    pub pid: Option<u32>,
    pub since: Option<String>,
    pub ny_date: String,
    pub cycles_today: u32,
    pub items_today: u64,
}

pub fn collect(opts: &GlobalOptions) -> StatusReport {
    let data_dir = opts.data_dir();
    let record = lock::read_record(&config::lock_path_in(&data_dir));
    let running = record.as_ref().is_some_and(|r| lock::pid_alive(r.pid));
    let today = clock::ny_date(Utc::now());
    let tally = DailyCounter::load(&config::counter_path_in(&data_dir)).get(today);

    StatusReport {
        running,
        pid: record.as_ref().map(|r| r.pid),
        since: record.map(|r| r.created_at.to_rfc3339()),
        ny_date: today.to_string(),
        cycles_today: tally.cycles,
        items_today: tally.items,
    }
}

pub async fn run(opts: &GlobalOptions, json: bool) -> Result<()> {
    let report = collect(opts);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match (report.running, report.pid) {
        (true, Some(pid)) => println!(
            "pitchfeed: running (PID {pid}, since {})",
            report.since.as_deref().unwrap_or("unknown")
        ),
        (false, Some(pid)) => println!("pitchfeed: not running (stale lock for PID {pid})"),
        _ => println!("pitchfeed: not running"),
    }
    println!(
        "today ({}): {} cycle(s), {} match(es) processed",
        report.ny_date, report.cycles_today, report.items_today
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_collect_reads_lock_and_counter() {
        let dir = TempDir::new().unwrap();
        let today = clock::ny_date(Utc::now());
        crate::counter::record_cycle(&config::counter_path_in(dir.path()), today, 7).unwrap();
        std::fs::write(config::lock_path_in(dir.path()), std::process::id().to_string()).unwrap();

        let opts = GlobalOptions {
            data_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let report = collect(&opts);
        assert_eq!(report.pid, Some(std::process::id()));
        assert_eq!(report.cycles_today, 1);
        assert_eq!(report.items_today, 7);
        #[cfg(unix)]
        assert!(report.running);
    }
}
