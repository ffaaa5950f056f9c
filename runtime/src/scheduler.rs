//! Wall-clock-aligned cycle loop.
//!
//! ```text
//! Idle -> Running -> Sleeping -> Running -> ... -> ShuttingDown -> Stopped
//! ```
//!
//! The next cycle starts `interval` after the previous one started, or
//! immediately if the previous one overran. Lost time is not made up.
//! Shutdown is checked between cycles and during sleep, never mid-cycle.

use crate::cycle::CycleReport;
use crate::lock::SingletonGuard;
use crate::shutdown::Shutdown;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Longest uninterrupted sleep; bounds shutdown latency.
pub const SLEEP_SLICE: Duration = Duration::from_secs(1);

/// Something that runs one cycle to completion.
#[async_trait]
pub trait CycleDriver: Send + Sync {
    async fn run_once(&self) -> CycleReport;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Sleeping,
    ShuttingDown,
    Stopped,
}

/// `max(0, interval - elapsed)`
pub fn sleep_duration(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSummary {
    pub cycles: u64,
    pub completed: u64,
    pub aborted: u64,
}

pub struct Scheduler<D> {
    driver: D,
    interval: Duration,
    shutdown: Shutdown,
    guard: Option<SingletonGuard>,
    state: SchedulerState,
}

impl<D: CycleDriver> Scheduler<D> {
    pub fn new(driver: D, interval: Duration, shutdown: Shutdown) -> Self {
        Self {
            driver,
            interval,
            shutdown,
            guard: None,
            state: SchedulerState::Idle,
        }
    }

    /// Hold `guard` for the scheduler's lifetime and release it on stop.
    pub fn with_guard(mut self, guard: SingletonGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    fn enter(&mut self, state: SchedulerState) {
        tracing::debug!(from = ?self.state, to = ?state, "scheduler state");
        self.state = state;
    }

    pub async fn run(mut self) -> SchedulerSummary {
        let mut summary = SchedulerSummary::default();
        info!(interval_secs = self.interval.as_secs_f64(), "scheduler started");

        while !self.shutdown.is_requested() {
            self.enter(SchedulerState::Running);
            let started = Instant::now();
            let report = self.driver.run_once().await;
            let elapsed = started.elapsed();

            summary.cycles += 1;
            if report.is_done() {
                summary.completed += 1;
            } else {
                summary.aborted += 1;
            }

            if self.shutdown.is_requested() {
                break;
            }

            let pause = sleep_duration(self.interval, elapsed);
            if pause.is_zero() {
                warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    "cycle overran interval, starting next immediately"
                );
            } else {
                info!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    sleep_ms = pause.as_millis() as u64,
                    "sleeping until next cycle"
                );
            }

            self.enter(SchedulerState::Sleeping);
            if !self.sleep(pause).await {
                break;
            }
        }

        self.enter(SchedulerState::ShuttingDown);
        if let Some(mut guard) = self.guard.take() {
            if let Err(e) = guard.release() {
                warn!(error = %e, "failed to release lock");
            }
        }
        self.enter(SchedulerState::Stopped);
        info!(
            cycles = summary.cycles,
            completed = summary.completed,
            aborted = summary.aborted,
            "scheduler stopped"
        );
        summary
    }

    /// Sleep in slices of at most [`SLEEP_SLICE`]. Returns `false` if
    /// shutdown was requested before the full duration elapsed.
    async fn sleep(&self, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if self.shutdown.is_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let slice = (deadline - now).min(SLEEP_SLICE);
            tokio::select! {
                _ = tokio::time::sleep(slice) => {}
                _ = self.shutdown.requested() => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::CycleState;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    /// Takes `work` per cycle, logs start offsets, and can request
    /// shutdown once it has started `stop_after` cycles.
    struct FakeDriver {
        origin: Instant,
        work: Duration,
        starts: Mutex<Vec<Duration>>,
        finished: AtomicU64,
        stop_after: Option<usize>,
        shutdown: Shutdown,
        abort: bool,
    }

    impl FakeDriver {
        fn new(work: Duration, shutdown: &Shutdown) -> Arc<Self> {
            Self::build(work, shutdown, None, false)
        }

        fn build(
            work: Duration,
            shutdown: &Shutdown,
            stop_after: Option<usize>,
            abort: bool,
        ) -> Arc<Self> {
            Arc::new(Self {
                origin: Instant::now(),
                work,
                starts: Mutex::new(Vec::new()),
                finished: AtomicU64::new(0),
                stop_after,
                shutdown: shutdown.clone(),
                abort,
            })
        }

        fn starts_secs(&self) -> Vec<u64> {
            self.starts
                .lock()
                .unwrap()
                .iter()
                .map(|d| d.as_secs())
                .collect()
        }
    }

    #[async_trait]
    impl CycleDriver for Arc<FakeDriver> {
        async fn run_once(&self) -> CycleReport {
            let started_n = {
                let mut starts = self.starts.lock().unwrap();
                starts.push(self.origin.elapsed());
                starts.len()
            };
            if self.stop_after == Some(started_n) {
                self.shutdown.request();
            }
            tokio::time::sleep(self.work).await;
            self.finished.fetch_add(1, Ordering::SeqCst);

            let mut report = CycleReport::new("test", Utc::now());
            report.state = if self.abort {
                CycleState::Aborted
            } else {
                CycleState::Done
            };
            report
        }
    }

    #[test]
    fn test_sleep_duration_is_interval_minus_elapsed() {
        let interval = Duration::from_secs(60);
        for secs in [0u64, 1, 30, 59, 60, 61, 600] {
            let expected = Duration::from_secs(60u64.saturating_sub(secs));
            assert_eq!(sleep_duration(interval, Duration::from_secs(secs)), expected);
        }
        assert_eq!(
            sleep_duration(interval, Duration::from_millis(59_500)),
            Duration::from_millis(500)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycles_start_on_interval() {
        let shutdown = Shutdown::new();
        let driver = FakeDriver::build(Duration::from_secs(10), &shutdown, Some(3), false);
        let summary = Scheduler::new(driver.clone(), Duration::from_secs(60), shutdown)
            .run()
            .await;
        assert_eq!(driver.starts_secs(), vec![0, 60, 120]);
        assert_eq!(summary.cycles, 3);
        assert_eq!(summary.completed, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrun_starts_next_cycle_immediately() {
        let shutdown = Shutdown::new();
        let driver = FakeDriver::build(Duration::from_secs(70), &shutdown, Some(3), false);
        Scheduler::new(driver.clone(), Duration::from_secs(60), shutdown)
            .run()
            .await;
        // No compensation: 70 and 140, not 60 and 120.
        assert_eq!(driver.starts_secs(), vec![0, 70, 140]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_sleep_exits_within_a_second() {
        let shutdown = Shutdown::new();
        let driver = FakeDriver::new(Duration::from_secs(5), &shutdown);
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            trigger.request();
        });

        let origin = Instant::now();
        let summary = Scheduler::new(driver.clone(), Duration::from_secs(60), shutdown)
            .run()
            .await;
        assert!(origin.elapsed() <= Duration::from_secs(31));
        assert_eq!(summary.cycles, 1);
        assert_eq!(driver.starts_secs(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_mid_cycle_lets_cycle_finish() {
        let shutdown = Shutdown::new();
        let driver = FakeDriver::build(Duration::from_secs(20), &shutdown, Some(1), false);
        let summary = Scheduler::new(driver.clone(), Duration::from_secs(60), shutdown)
            .run()
            .await;
        assert_eq!(driver.finished.load(Ordering::SeqCst), 1);
        assert_eq!(summary.cycles, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_cycle_does_not_stop_loop() {
        let shutdown = Shutdown::new();
        let driver = FakeDriver::build(Duration::from_secs(1), &shutdown, Some(2), true);
        let summary = Scheduler::new(driver.clone(), Duration::from_secs(60), shutdown)
            .run()
            .await;
        assert_eq!(summary.aborted, 2);
        assert_eq!(driver.starts_secs(), vec![0, 60]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_released_on_stop() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pitchfeed.pid");
        let guard = SingletonGuard::acquire_with(&path, |_| false).unwrap();
        let shutdown = Shutdown::new();
        let driver = FakeDriver::build(Duration::ZERO, &shutdown, Some(1), false);

        Scheduler::new(driver, Duration::from_secs(60), shutdown)
            .with_guard(guard)
            .run()
            .await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_preset_shutdown_runs_no_cycles() {
        let shutdown = Shutdown::new();
        shutdown.request();
        let driver = FakeDriver::new(Duration::ZERO, &shutdown);
        let summary = Scheduler::new(driver.clone(), Duration::from_secs(60), shutdown)
            .run()
            .await;
        assert_eq!(summary.cycles, 0);
        assert!(driver.starts_secs().is_empty());
    }
}
