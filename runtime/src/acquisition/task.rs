//! Fetch tasks and their outcomes.

use crate::config::Credentials;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// The six upstream lookups the engine knows how to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    LiveList,
    MatchDetail,
    MatchOdds,
    Team,
    Competition,
    CountryList,
}

impl EntityKind {
    /// Endpoint path under the configured base URL.
    pub fn path(self) -> &'static str {
        match self {
            Self::LiveList => "/match/detail_live",
            Self::MatchDetail => "/match/recent/list",
            Self::MatchOdds => "/odds/history",
            Self::Team => "/team/additional/list",
            Self::Competition => "/competition/additional/list",
            Self::CountryList => "/country/list",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LiveList => "live_list",
            Self::MatchDetail => "match_detail",
            Self::MatchOdds => "match_odds",
            Self::Team => "team",
            Self::Competition => "competition",
            Self::CountryList => "country_list",
        }
    }

    /// Entity lookups carry a `uuid` parameter; list endpoints do not.
    pub fn is_keyed(self) -> bool {
        !matches!(self, Self::LiveList | Self::CountryList)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outbound lookup. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct FetchTask {
    kind: EntityKind,
    entity_id: Option<String>,
    url: String,
    params: Vec<(String, String)>,
}

impl FetchTask {
    pub fn new(
        kind: EntityKind,
        entity_id: Option<String>,
        base_url: &str,
        credentials: &Credentials,
    ) -> Self {
        let mut params = vec![
            ("user".to_string(), credentials.user().to_string()),
            ("secret".to_string(), credentials.secret().to_string()),
        ];
        if let Some(id) = entity_id.as_ref().filter(|_| kind.is_keyed()) {
            params.push(("uuid".to_string(), id.clone()));
        }
        Self {
            kind,
            entity_id,
            url: format!("{}{}", base_url.trim_end_matches('/'), kind.path()),
            params,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// `kind:id` label for logs and error messages.
    pub fn label(&self) -> String {
        match &self.entity_id {
            Some(id) => format!("{}:{id}", self.kind),
            None => self.kind.to_string(),
        }
    }
}

// Hand-written so credentials in `params` never reach a log line.
impl fmt::Debug for FetchTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchTask")
            .field("kind", &self.kind)
            .field("entity_id", &self.entity_id)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// Result of exactly one [`FetchTask`].
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success(Value),
    /// Retries exhausted (or payload unusable); carries a synthesized
    /// placeholder so downstream stages never see a missing key.
    Degraded { placeholder: Value, reason: String },
    /// Non-retriable failure. Ends the cycle.
    Failed { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeCategory {
    Success,
    Degraded,
    Failed,
}

impl FetchOutcome {
    pub fn category(&self) -> OutcomeCategory {
        match self {
            Self::Success(_) => OutcomeCategory::Success,
            Self::Degraded { .. } => OutcomeCategory::Degraded,
            Self::Failed { .. } => OutcomeCategory::Failed,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Degraded { reason, .. } | Self::Failed { reason } => Some(reason),
        }
    }

    /// The payload to publish: real data or the placeholder.
    pub fn into_payload(self) -> Option<Value> {
        match self {
            Self::Success(v) => Some(v),
            Self::Degraded { placeholder, .. } => Some(placeholder),
            Self::Failed { .. } => None,
        }
    }
}

/// Outcome counts. Degraded is its own bucket, never folded into the others.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutcomeTally {
    pub success: usize,
    pub degraded: usize,
    pub failed: usize,
}

impl OutcomeTally {
    pub fn record(&mut self, category: OutcomeCategory) {
        match category {
            OutcomeCategory::Success => self.success += 1,
            OutcomeCategory::Degraded => self.degraded += 1,
            OutcomeCategory::Failed => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: OutcomeTally) {
        self.success += other.success;
        self.degraded += other.degraded;
        self.failed += other.failed;
    }

    pub fn total(&self) -> usize {
        self.success + self.degraded + self.failed
    }
}
