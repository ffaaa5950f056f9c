//! The output document handed to downstream stages.
//!
//! Key order is part of the contract: capture times, raw payloads, status
//! summaries and the per-status match breakdown, then `completion_summary`
//! strictly last. `serde_json` is built with `preserve_order`, so insertion
//! order is serialization order.

use crate::acquisition::enrich::Enrichment;
use crate::acquisition::payload::LiveMatch;
use crate::acquisition::task::OutcomeTally;
use crate::match_status::{self, StatusSummary};
use crate::persist;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;

pub const STEP_NAME: &str = "acquisition";
pub const COMPLETION_KEY: &str = "completion_summary";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Complete,
    HandoffFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionSummary {
    pub step: &'static str,
    pub status: &'static str,
    pub timestamp: String,
    pub execution_time_seconds: f64,
    pub total_items_processed: usize,
    pub cycle_id: String,
    pub daily_match_number: u32,
    pub total_matches: usize,
    pub in_play_matches: usize,
    pub other_status_matches: usize,
    pub outcomes: OutcomeTally,
}

/// Everything the document is built from.
pub struct DocumentParts<'a> {
    pub captured_at: DateTime<Utc>,
    pub cycle_id: &'a str,
    pub daily_match_number: u32,
    pub live_list: Value,
    pub matches: &'a [LiveMatch],
    pub enrichment: Enrichment,
    /// Includes the live-list outcome, not just enrichment.
    pub tally: OutcomeTally,
    pub execution_time_seconds: f64,
}

pub fn assemble(parts: DocumentParts<'_>) -> Result<Value> {
    let DocumentParts {
        captured_at,
        cycle_id,
        daily_match_number,
        live_list,
        matches,
        enrichment,
        tally,
        execution_time_seconds,
    } = parts;

    let summary = StatusSummary::from_matches(matches);
    let breakdown = match_status::match_breakdown(matches, &enrichment);
    let completion = CompletionSummary {
        step: STEP_NAME,
        status: "completed",
        timestamp: crate::clock::utc_timestamp(Utc::now()),
        execution_time_seconds: round_millis(execution_time_seconds),
        total_items_processed: matches.len(),
        cycle_id: cycle_id.to_string(),
        daily_match_number,
        total_matches: summary.total_matches,
        in_play_matches: summary.in_play_matches,
        other_status_matches: summary.other_status_matches(),
        outcomes: tally,
    };

    let mut doc = Map::new();
    doc.insert(
        "timestamp".into(),
        crate::clock::utc_timestamp(captured_at).into(),
    );
    doc.insert(
        "ny_timestamp".into(),
        crate::clock::ny_timestamp(captured_at).into(),
    );
    doc.insert("live_matches".into(), live_list);
    doc.insert("match_details".into(), to_object(enrichment.match_details));
    doc.insert("match_odds".into(), to_object(enrichment.match_odds));
    doc.insert("team_info".into(), to_object(enrichment.team_info));
    doc.insert("competition_info".into(), to_object(enrichment.competition_info));
    doc.insert("countries".into(), enrichment.countries);
    doc.insert(
        "status_summary".into(),
        serde_json::to_value(&summary).context("failed to encode status summary")?,
    );
    doc.insert(
        "detailed_status_mapping".into(),
        serde_json::to_value(match_status::detailed_mapping(matches))
            .context("failed to encode status mapping")?,
    );
    doc.insert(
        "comprehensive_match_breakdown".into(),
        serde_json::to_value(breakdown).context("failed to encode match breakdown")?,
    );
    doc.insert(
        COMPLETION_KEY.into(),
        serde_json::to_value(&completion).context("failed to encode completion summary")?,
    );
    Ok(Value::Object(doc))
}

/// Stamp the handoff result onto the completion summary. `status` stays as
/// it was; degradation or a failed downstream stage is not cycle failure.
pub fn finalize_pipeline(doc: &mut Value, status: PipelineStatus, total_seconds: f64) {
    let Some(summary) = doc.get_mut(COMPLETION_KEY).and_then(Value::as_object_mut) else {
        return;
    };
    summary.insert(
        "pipeline_status".into(),
        serde_json::to_value(status).unwrap_or(Value::Null),
    );
    summary.insert(
        "total_pipeline_time_seconds".into(),
        round_millis(total_seconds).into(),
    );
}

pub fn write(path: &Path, doc: &Value) -> Result<()> {
    persist::write_json_atomic(path, doc)
        .with_context(|| format!("failed to persist output document {}", path.display()))
}

fn to_object(map: std::collections::BTreeMap<String, Value>) -> Value {
    Value::Object(map.into_iter().collect())
}

fn round_millis(secs: f64) -> f64 {
    (secs * 1000.0).round() / 1000.0
}
