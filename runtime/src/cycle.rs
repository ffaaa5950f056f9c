//! One acquisition pass: live list, enrichment, document, handoff.
//!
//! ```text
//! FetchingLiveList -> Enriching -> AssemblingOutput -> HandingOff -> Done
//!        \________________\_______________\________________\-> Aborted
//! ```
//!
//! A cycle never panics or returns an error to its caller; whatever
//! happens is folded into the [`CycleReport`].

use crate::acquisition::enrich::Enricher;
use crate::acquisition::payload;
use crate::acquisition::task::{EntityKind, FetchOutcome, FetchTask, OutcomeTally};
use crate::clock;
use crate::context::Context;
use crate::counter::{self, DailyCounter};
use crate::error::EnrichError;
use crate::output::{self, DocumentParts, PipelineStatus};
use crate::scheduler::CycleDriver;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    FetchingLiveList,
    Enriching,
    AssemblingOutput,
    HandingOff,
    Done,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// `Done` or `Aborted` once the cycle has returned.
    pub state: CycleState,
    /// The state the cycle was in when it aborted.
    pub aborted_in: Option<CycleState>,
    pub tally: OutcomeTally,
    /// Live matches processed.
    pub items: usize,
    /// 1-based number of this cycle within its New York day.
    pub daily_cycle: Option<u32>,
    pub error: Option<String>,
    /// Downstream stages that failed, by name.
    pub handoff_failures: Vec<String>,
    pub document_path: Option<PathBuf>,
}

impl CycleReport {
    pub fn new(cycle_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id: cycle_id.into(),
            started_at,
            finished_at: started_at,
            elapsed: Duration::ZERO,
            state: CycleState::FetchingLiveList,
            aborted_in: None,
            tally: OutcomeTally::default(),
            items: 0,
            daily_cycle: None,
            error: None,
            handoff_failures: Vec::new(),
            document_path: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == CycleState::Done
    }

    fn enter(&mut self, state: CycleState) {
        debug!(from = ?self.state, to = ?state, "cycle state");
        self.state = state;
    }

    fn abort(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        error!(state = ?self.state, %reason, "cycle aborted");
        self.aborted_in = Some(self.state);
        self.error = Some(reason);
        self.state = CycleState::Aborted;
    }
}

pub struct CycleRunner {
    ctx: Arc<Context>,
}

impl CycleRunner {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub async fn run_once(&self) -> CycleReport {
        let mut report = CycleReport::new(Uuid::new_v4().to_string(), Utc::now());
        let started = Instant::now();
        let span = info_span!(
            "cycle",
            cycle_id = %report.cycle_id,
            daily_cycle = tracing::field::Empty
        );

        self.drive(&mut report, started).instrument(span).await;

        report.finished_at = Utc::now();
        report.elapsed = started.elapsed();
        report
    }

    async fn drive(&self, report: &mut CycleReport, started: Instant) {
        let config = &self.ctx.config;
        let client = &self.ctx.client;

        // FetchingLiveList
        let live_task = FetchTask::new(
            EntityKind::LiveList,
            None,
            &config.base_url,
            &config.credentials,
        );
        let outcome = client.execute(&live_task).await;
        report.tally.record(outcome.category());
        let mut live_list = match outcome {
            FetchOutcome::Success(value) => value,
            FetchOutcome::Degraded { placeholder, reason } => {
                warn!(%reason, "live list degraded, continuing with no matches");
                placeholder
            }
            FetchOutcome::Failed { reason } => {
                report.abort(format!("live list: {reason}"));
                return;
            }
        };
        let matches = payload::live_matches(&live_list);
        info!(matches = matches.len(), "live list fetched");

        // Enriching
        report.enter(CycleState::Enriching);
        let enricher = Enricher::new(client, &config.base_url, &config.credentials);
        let enrichment = match enricher.enrich(&matches).await {
            Ok(enrichment) => enrichment,
            Err(err) => {
                let EnrichError::NonRetriable { tally, .. } = &err;
                report.tally.merge(*tally);
                report.abort(err.to_string());
                return;
            }
        };
        report.tally.merge(enrichment.tally);

        // AssemblingOutput
        report.enter(CycleState::AssemblingOutput);
        let filled = payload::apply_detail_status(&mut live_list, &enrichment.match_details);
        if filled > 0 {
            debug!(filled, "status ids copied from match details");
        }
        let matches = payload::live_matches(&live_list);
        report.items = matches.len();

        let day = clock::ny_date(report.started_at);
        let counter_path = config.counter_path();
        let daily_number = DailyCounter::load(&counter_path).get(day).cycles + 1;
        tracing::Span::current().record("daily_cycle", daily_number);

        let parts = DocumentParts {
            captured_at: report.started_at,
            cycle_id: &report.cycle_id,
            daily_match_number: daily_number,
            live_list,
            matches: &matches,
            enrichment,
            tally: report.tally,
            execution_time_seconds: started.elapsed().as_secs_f64(),
        };
        let mut doc = match output::assemble(parts) {
            Ok(doc) => doc,
            Err(e) => {
                report.abort(format!("{e:#}"));
                return;
            }
        };

        // HandingOff
        report.enter(CycleState::HandingOff);
        let path = config.output_path();
        if let Err(e) = output::write(&path, &doc) {
            report.abort(format!("{e:#}"));
            return;
        }
        report.document_path = Some(path.clone());

        match counter::record_cycle(&counter_path, day, report.items as u64) {
            Ok(n) => report.daily_cycle = Some(n),
            Err(e) => warn!(error = %format!("{e:#}"), "failed to update daily counter"),
        }
        self.write_daily_snapshot(day, &doc);

        for stage in &self.ctx.downstream {
            let stage_started = Instant::now();
            match stage.run(&path, &doc).await {
                Ok(()) => info!(
                    stage = stage.name(),
                    elapsed_ms = stage_started.elapsed().as_millis() as u64,
                    "downstream stage finished"
                ),
                Err(e) => {
                    error!(stage = stage.name(), error = %format!("{e:#}"), "downstream stage failed");
                    report.handoff_failures.push(stage.name().to_string());
                }
            }
        }

        let pipeline_status = if report.handoff_failures.is_empty() {
            PipelineStatus::Complete
        } else {
            PipelineStatus::HandoffFailed
        };
        output::finalize_pipeline(&mut doc, pipeline_status, started.elapsed().as_secs_f64());
        if let Err(e) = output::write(&path, &doc) {
            warn!(error = %format!("{e:#}"), "failed to stamp pipeline status");
        }

        report.enter(CycleState::Done);
        info!(
            matches = report.items,
            success = report.tally.success,
            degraded = report.tally.degraded,
            failed = report.tally.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cycle complete"
        );
    }

    /// First completed cycle of a New York day keeps a dated copy.
    fn write_daily_snapshot(&self, day: chrono::NaiveDate, doc: &Value) {
        let snapshot = self.ctx.config.snapshot_path(day);
        if snapshot.exists() {
            return;
        }
        match output::write(&snapshot, doc) {
            Ok(()) => info!(path = %snapshot.display(), "daily snapshot written"),
            Err(e) => warn!(error = %format!("{e:#}"), "failed to write daily snapshot"),
        }
    }
}

#[async_trait]
impl CycleDriver for CycleRunner {
    async fn run_once(&self) -> CycleReport {
        CycleRunner::run_once(self).await
    }
}
