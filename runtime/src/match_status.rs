//! Match status vocabulary and the per-status summaries in the output document.

use crate::acquisition::enrich::Enrichment;
use crate::acquisition::payload::{self, LiveMatch, MatchDetail};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Status ids that mean the ball is (or is about to be) in play.
pub const IN_PLAY_STATUS_IDS: &[i64] = &[2, 3, 4, 5, 6, 7];

pub fn describe(status_id: i64) -> &'static str {
    match status_id {
        0 => "Abnormal (suggest hiding)",
        1 => "Not started",
        2 => "First half",
        3 => "Half-time",
        4 => "Second half",
        5 => "Overtime",
        6 => "Overtime (deprecated)",
        7 => "Penalty Shoot-out",
        8 => "End",
        9 => "Delay",
        10 => "Interrupt",
        11 => "Cut in half",
        12 => "Cancel",
        13 => "To be determined",
        _ => "Unknown Status",
    }
}

pub fn is_in_play(status_id: i64) -> bool {
    IN_PLAY_STATUS_IDS.contains(&status_id)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub id: i64,
    pub description: &'static str,
    pub count: usize,
}

/// Aggregate counts by status id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub total_matches: usize,
    pub matches_with_status: usize,
    pub matches_without_status: usize,
    pub in_play_matches: usize,
    /// Keyed `status_<id>`.
    pub breakdown: BTreeMap<String, StatusCount>,
}

impl StatusSummary {
    pub fn from_matches(matches: &[LiveMatch]) -> Self {
        let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
        for status in matches.iter().filter_map(|m| m.status_id) {
            *counts.entry(status).or_default() += 1;
        }

        let with_status: usize = counts.values().sum();
        let in_play = counts
            .iter()
            .filter(|(id, _)| is_in_play(**id))
            .map(|(_, n)| n)
            .sum();

        Self {
            total_matches: matches.len(),
            matches_with_status: with_status,
            matches_without_status: matches.len() - with_status,
            in_play_matches: in_play,
            breakdown: counts
                .into_iter()
                .map(|(id, count)| {
                    (
                        format!("status_{id}"),
                        StatusCount {
                            id,
                            description: describe(id),
                            count,
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn other_status_matches(&self) -> usize {
        self.total_matches - self.in_play_matches
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusGroup {
    pub status_id: i64,
    pub count: usize,
    pub match_ids: Vec<String>,
}

fn group_key(status_id: i64) -> String {
    match describe(status_id) {
        "Unknown Status" => format!("Unknown Status (ID: {status_id})"),
        known => known.to_string(),
    }
}

/// Match ids grouped by status description.
pub fn detailed_mapping(matches: &[LiveMatch]) -> BTreeMap<String, StatusGroup> {
    let mut groups: BTreeMap<String, StatusGroup> = BTreeMap::new();
    for m in matches {
        let Some(status_id) = m.status_id else {
            continue;
        };
        let group = groups.entry(group_key(status_id)).or_insert_with(|| StatusGroup {
            status_id,
            count: 0,
            match_ids: Vec::new(),
        });
        group.count += 1;
        group.match_ids.push(m.id.clone());
    }
    groups
}

const UNKNOWN_HOME: &str = "Unknown Home Team";
const UNKNOWN_AWAY: &str = "Unknown Away Team";
const UNKNOWN_COMPETITION: &str = "Unknown Competition";

/// One match as a reader would want to see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchLine {
    pub match_id: String,
    pub home_team: String,
    pub away_team: String,
    pub score: String,
    pub competition: String,
    pub formatted: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakdownGroup {
    pub status_id: i64,
    pub count: usize,
    pub matches: Vec<MatchLine>,
}

/// Matches grouped by status description, with team and competition names
/// resolved from the enrichment lookups. Ids come from the match detail
/// first and the live row second; anything unresolved gets a fixed
/// "Unknown ..." label.
pub fn match_breakdown(
    matches: &[LiveMatch],
    enrichment: &Enrichment,
) -> BTreeMap<String, BreakdownGroup> {
    let mut groups: BTreeMap<String, BreakdownGroup> = BTreeMap::new();
    for m in matches {
        let Some(status_id) = m.status_id else {
            continue;
        };
        let line = match_line(m, enrichment);
        let group = groups
            .entry(group_key(status_id))
            .or_insert_with(|| BreakdownGroup {
                status_id,
                count: 0,
                matches: Vec::new(),
            });
        group.count += 1;
        group.matches.push(line);
    }
    groups
}

fn match_line(m: &LiveMatch, enrichment: &Enrichment) -> MatchLine {
    let detail = enrichment
        .match_details
        .get(&m.id)
        .and_then(MatchDetail::from_envelope)
        .unwrap_or_default();
    let home_id = detail.home_team_id.as_ref().or(m.home_team_id.as_ref());
    let away_id = detail.away_team_id.as_ref().or(m.away_team_id.as_ref());
    let competition_id = detail.competition_id.as_ref().or(m.competition_id.as_ref());

    let home_team = resolve_name(&enrichment.team_info, home_id, UNKNOWN_HOME);
    let away_team = resolve_name(&enrichment.team_info, away_id, UNKNOWN_AWAY);
    let competition = resolve_name(
        &enrichment.competition_info,
        competition_id,
        UNKNOWN_COMPETITION,
    );
    let (home_goals, away_goals) = m.score.unwrap_or((0, 0));
    let score = format!("{home_goals}-{away_goals}");

    MatchLine {
        match_id: m.id.clone(),
        formatted: format!("{home_team} vs {away_team} ({score}) - {competition}"),
        home_team,
        away_team,
        score,
        competition,
    }
}

fn resolve_name(lookup: &BTreeMap<String, Value>, id: Option<&String>, fallback: &str) -> String {
    id.and_then(|id| lookup.get(id))
        .and_then(payload::first_name)
        .unwrap_or(fallback)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn m(id: &str, status: Option<i64>) -> LiveMatch {
        LiveMatch {
            id: id.into(),
            status_id: status,
            ..Default::default()
        }
    }

    #[test]
    fn test_summary_counts() {
        let matches = vec![
            m("a", Some(2)),
            m("b", Some(2)),
            m("c", Some(8)),
            m("d", None),
            m("e", Some(7)),
        ];
        let summary = StatusSummary::from_matches(&matches);
        assert_eq!(summary.total_matches, 5);
        assert_eq!(summary.matches_with_status, 4);
        assert_eq!(summary.matches_without_status, 1);
        assert_eq!(summary.in_play_matches, 3);
        assert_eq!(summary.other_status_matches(), 2);
        assert_eq!(summary.breakdown["status_2"].count, 2);
        assert_eq!(summary.breakdown["status_8"].description, "End");
    }

    #[test]
    fn test_detailed_mapping_groups_ids() {
        let matches = vec![m("a", Some(1)), m("b", Some(1)), m("c", Some(42))];
        let mapping = detailed_mapping(&matches);
        assert_eq!(mapping["Not started"].match_ids, vec!["a", "b"]);
        assert_eq!(mapping["Unknown Status (ID: 42)"].count, 1);
    }

    #[test]
    fn test_empty_list() {
        let summary = StatusSummary::from_matches(&[]);
        assert_eq!(summary.total_matches, 0);
        assert!(summary.breakdown.is_empty());
        assert!(detailed_mapping(&[]).is_empty());
        assert!(match_breakdown(&[], &Enrichment::default()).is_empty());
    }

    #[test]
    fn test_breakdown_resolves_names_from_lookups() {
        let mut live = m("m1", Some(2));
        live.score = Some((2, 1));
        live.home_team_id = Some("stale-home".into());
        let matches = vec![live, m("m2", Some(2)), m("m3", None)];

        let mut enrichment = Enrichment::default();
        enrichment.match_details.insert(
            "m1".into(),
            json!({"results": [{"home_team_id": "t1", "away_team_id": "t2", "competition_id": "c1"}]}),
        );
        enrichment
            .team_info
            .insert("t1".into(), json!({"results": [{"name": "Arsenal"}]}));
        enrichment
            .team_info
            .insert("t2".into(), json!({"result": [{"name": "Chelsea"}]}));
        enrichment
            .competition_info
            .insert("c1".into(), json!({"results": [{"name": "Premier League"}]}));

        let breakdown = match_breakdown(&matches, &enrichment);
        assert_eq!(breakdown.len(), 1);
        let first_half = &breakdown["First half"];
        assert_eq!(first_half.status_id, 2);
        assert_eq!(first_half.count, 2);

        let resolved = &first_half.matches[0];
        assert_eq!(resolved.home_team, "Arsenal");
        assert_eq!(resolved.score, "2-1");
        assert_eq!(resolved.formatted, "Arsenal vs Chelsea (2-1) - Premier League");

        let bare = &first_half.matches[1];
        assert_eq!(bare.match_id, "m2");
        assert_eq!(
            bare.formatted,
            "Unknown Home Team vs Unknown Away Team (0-0) - Unknown Competition"
        );
    }
}
