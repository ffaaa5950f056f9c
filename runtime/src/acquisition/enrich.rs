//! Two-phase enrichment fan-out.
//!
//! Phase 1 looks up match details and match odds for every live match.
//! Phase 2 looks up teams and competitions discovered in Phase 1 (plus the
//! live rows themselves) and the country list. Phase 2 tasks are built only
//! after every Phase 1 task has produced its outcome.
//!
//! Both phases run as joined futures on the calling task; concurrency is
//! bounded by the [`TransportClient`]'s shared admission gate, so slack
//! left by Phase 1 is available to Phase 2.

use super::http_client::TransportClient;
use super::payload::{LiveMatch, MatchDetail};
use super::task::{EntityKind, FetchOutcome, FetchTask, OutcomeCategory, OutcomeTally};
use crate::config::Credentials;
use crate::error::EnrichError;
use futures::future::join_all;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Match details and odds, keyed by match id.
    Core,
    /// Teams, competitions, and the country list.
    Reference,
}

/// Every task issued for one cycle, by phase.
#[derive(Debug, Default, Clone)]
pub struct EnrichmentBatch {
    pub core: Vec<FetchTask>,
    pub reference: Vec<FetchTask>,
}

impl EnrichmentBatch {
    pub fn len(&self) -> usize {
        self.core.len() + self.reference.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What happened to one task. Payloads live in the lookup maps instead.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub phase: Phase,
    pub task: FetchTask,
    pub category: OutcomeCategory,
    pub reason: Option<String>,
}

/// Aggregated enrichment results for one cycle.
#[derive(Debug, Default)]
pub struct Enrichment {
    pub batch: EnrichmentBatch,
    /// One record per task in `batch`, in no particular order within a phase.
    pub records: Vec<TaskRecord>,
    pub match_details: BTreeMap<String, Value>,
    pub match_odds: BTreeMap<String, Value>,
    pub team_info: BTreeMap<String, Value>,
    pub competition_info: BTreeMap<String, Value>,
    pub countries: Value,
    pub tally: OutcomeTally,
}

impl Enrichment {
    /// Record outcomes for a task group and file payloads under their ids.
    fn absorb(&mut self, phase: Phase, tasks: &[FetchTask], outcomes: Vec<FetchOutcome>) {
        debug_assert_eq!(tasks.len(), outcomes.len());
        for (task, outcome) in tasks.iter().zip(outcomes) {
            self.absorb_one(phase, task, outcome);
        }
    }

    fn absorb_one(&mut self, phase: Phase, task: &FetchTask, outcome: FetchOutcome) {
        let category = outcome.category();
        self.tally.record(category);
        self.records.push(TaskRecord {
            phase,
            task: task.clone(),
            category,
            reason: outcome.reason().map(str::to_string),
        });

        let Some(payload) = outcome.into_payload() else {
            return;
        };
        let key = task.entity_id().unwrap_or_default().to_string();
        match task.kind() {
            EntityKind::MatchDetail => {
                self.match_details.insert(key, payload);
            }
            EntityKind::MatchOdds => {
                self.match_odds.insert(key, payload);
            }
            EntityKind::Team => {
                self.team_info.insert(key, payload);
            }
            EntityKind::Competition => {
                self.competition_info.insert(key, payload);
            }
            EntityKind::CountryList => self.countries = payload,
            EntityKind::LiveList => {}
        }
    }

    /// The first non-retriable failure recorded in `phase`, if any.
    fn first_failure(&self, phase: Phase) -> Option<&TaskRecord> {
        self.records
            .iter()
            .find(|r| r.phase == phase && r.category == OutcomeCategory::Failed)
    }

    fn abort_on_failure(&self, phase: Phase) -> Result<(), EnrichError> {
        match self.first_failure(phase) {
            Some(record) => Err(EnrichError::NonRetriable {
                task: record.task.label(),
                reason: record.reason.clone().unwrap_or_default(),
                tally: self.tally,
            }),
            None => Ok(()),
        }
    }

    pub fn records_for(&self, phase: Phase) -> impl Iterator<Item = &TaskRecord> {
        self.records.iter().filter(move |r| r.phase == phase)
    }
}

/// Team and competition ids to look up in Phase 2.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReferenceIds {
    pub teams: BTreeSet<String>,
    pub competitions: BTreeSet<String>,
}

impl ReferenceIds {
    /// Ids from Phase 1 match details, unioned with ids on the live rows.
    pub fn discover(matches: &[LiveMatch], details: &BTreeMap<String, Value>) -> Self {
        let mut ids = Self::default();
        for detail in details.values().filter_map(MatchDetail::from_envelope) {
            ids.add(detail.home_team_id, detail.away_team_id, detail.competition_id);
        }
        for m in matches {
            ids.add(
                m.home_team_id.clone(),
                m.away_team_id.clone(),
                m.competition_id.clone(),
            );
        }
        ids
    }

    fn add(&mut self, home: Option<String>, away: Option<String>, competition: Option<String>) {
        self.teams.extend(home);
        self.teams.extend(away);
        self.competitions.extend(competition);
    }
}

pub struct Enricher<'a> {
    client: &'a TransportClient,
    base_url: &'a str,
    credentials: &'a Credentials,
}

impl<'a> Enricher<'a> {
    pub fn new(client: &'a TransportClient, base_url: &'a str, credentials: &'a Credentials) -> Self {
        Self {
            client,
            base_url,
            credentials,
        }
    }

    fn task(&self, kind: EntityKind, id: Option<&str>) -> FetchTask {
        FetchTask::new(kind, id.map(str::to_string), self.base_url, self.credentials)
    }

    async fn run_group(&self, tasks: &[FetchTask]) -> Vec<FetchOutcome> {
        join_all(tasks.iter().map(|t| self.client.execute(t))).await
    }

    /// Run both phases for `matches`.
    ///
    /// Degraded lookups are filed under their id with a placeholder payload.
    /// Only a non-retriable outcome fails the call, and only once the phase
    /// it belongs to has fully resolved.
    pub async fn enrich(&self, matches: &[LiveMatch]) -> Result<Enrichment, EnrichError> {
        let mut enrichment = Enrichment::default();

        // Phase 1
        let started = Instant::now();
        let match_ids = unique_match_ids(matches);
        let details: Vec<FetchTask> = match_ids
            .iter()
            .map(|id| self.task(EntityKind::MatchDetail, Some(id)))
            .collect();
        let odds: Vec<FetchTask> = match_ids
            .iter()
            .map(|id| self.task(EntityKind::MatchOdds, Some(id)))
            .collect();

        let (detail_outcomes, odds_outcomes) =
            futures::join!(self.run_group(&details), self.run_group(&odds));

        enrichment.absorb(Phase::Core, &details, detail_outcomes);
        enrichment.absorb(Phase::Core, &odds, odds_outcomes);
        enrichment.batch.core = details.into_iter().chain(odds).collect();
        log_phase(&enrichment, Phase::Core, started);
        enrichment.abort_on_failure(Phase::Core)?;

        // Phase 2: only now are reference ids known.
        let started = Instant::now();
        let ids = ReferenceIds::discover(matches, &enrichment.match_details);
        let teams: Vec<FetchTask> = ids
            .teams
            .iter()
            .map(|id| self.task(EntityKind::Team, Some(id)))
            .collect();
        let competitions: Vec<FetchTask> = ids
            .competitions
            .iter()
            .map(|id| self.task(EntityKind::Competition, Some(id)))
            .collect();
        let country = self.task(EntityKind::CountryList, None);

        let (team_outcomes, competition_outcomes, country_outcome) = futures::join!(
            self.run_group(&teams),
            self.run_group(&competitions),
            self.client.execute(&country),
        );

        enrichment.absorb(Phase::Reference, &teams, team_outcomes);
        enrichment.absorb(Phase::Reference, &competitions, competition_outcomes);
        enrichment.absorb_one(Phase::Reference, &country, country_outcome);
        enrichment.batch.reference = teams
            .into_iter()
            .chain(competitions)
            .chain(std::iter::once(country))
            .collect();
        log_phase(&enrichment, Phase::Reference, started);
        enrichment.abort_on_failure(Phase::Reference)?;

        Ok(enrichment)
    }
}

/// Match ids in upstream order, each once.
fn unique_match_ids(matches: &[LiveMatch]) -> Vec<&str> {
    let mut seen = HashSet::new();
    matches
        .iter()
        .map(|m| m.id.as_str())
        .filter(|id| seen.insert(*id))
        .collect()
}

fn log_phase(enrichment: &Enrichment, phase: Phase, started: Instant) {
    let mut tally = OutcomeTally::default();
    for record in enrichment.records_for(phase) {
        tally.record(record.category);
    }
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if tally.degraded > 0 || tally.failed > 0 {
        warn!(
            ?phase,
            tasks = tally.total(),
            success = tally.success,
            degraded = tally.degraded,
            failed = tally.failed,
            elapsed_ms,
            "enrichment phase finished with losses"
        );
    } else {
        info!(
            ?phase,
            tasks = tally.total(),
            elapsed_ms,
            "enrichment phase finished"
        );
    }
}
