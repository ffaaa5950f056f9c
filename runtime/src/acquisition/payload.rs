//! Typed views over raw upstream payloads.
//!
//! Raw JSON is kept verbatim for the output document, but business logic
//! only ever reads these structs. Defaulting happens here, once: a missing
//! or wrongly-typed field becomes `None`, never an error.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// One row of the live-event list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveMatch {
    pub id: String,
    pub status_id: Option<i64>,
    /// Current (home, away) goals from the score array.
    pub score: Option<(i64, i64)>,
    pub home_team_id: Option<String>,
    pub away_team_id: Option<String>,
    pub competition_id: Option<String>,
}

/// The fields of a match-detail lookup the engine cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchDetail {
    pub status_id: Option<i64>,
    pub home_team_id: Option<String>,
    pub away_team_id: Option<String>,
    pub competition_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMatch {
    #[serde(deserialize_with = "lenient_id")]
    id: Option<String>,
    #[serde(deserialize_with = "lenient_int")]
    status_id: Option<i64>,
    #[serde(deserialize_with = "lenient_id")]
    home_team_id: Option<String>,
    #[serde(deserialize_with = "lenient_id")]
    away_team_id: Option<String>,
    #[serde(deserialize_with = "lenient_id")]
    competition_id: Option<String>,
    /// `[match_id, status_id, home_scores, away_scores, kickoff, ""]`
    score: Value,
}

impl RawMatch {
    fn parse(value: &Value) -> Option<Self> {
        RawMatch::deserialize(value).ok()
    }

    fn status(&self) -> Option<i64> {
        self.status_id
            .or_else(|| self.score.get(1).and_then(int_from_value))
    }

    /// Slots 2 and 3 are per-side arrays whose first entry is the running
    /// score; an empty array counts as 0.
    fn goals(&self) -> Option<(i64, i64)> {
        let side = |slot: usize| -> Option<i64> {
            let entries = self.score.get(slot)?.as_array()?;
            Some(entries.first().and_then(int_from_value).unwrap_or(0))
        };
        Some((side(2)?, side(3)?))
    }
}

impl LiveMatch {
    pub fn from_value(value: &Value) -> Option<Self> {
        let raw = RawMatch::parse(value)?;
        let status_id = raw.status();
        let score = raw.goals();
        Some(Self {
            id: raw.id?,
            status_id,
            score,
            home_team_id: raw.home_team_id,
            away_team_id: raw.away_team_id,
            competition_id: raw.competition_id,
        })
    }
}

impl MatchDetail {
    /// Parse the first row of a detail envelope (`results`, or `result`).
    pub fn from_envelope(envelope: &Value) -> Option<Self> {
        let row = rows(envelope).first()?;
        let raw = RawMatch::parse(row)?;
        Some(Self {
            status_id: raw.status(),
            home_team_id: raw.home_team_id,
            away_team_id: raw.away_team_id,
            competition_id: raw.competition_id,
        })
    }
}

/// Which key of an envelope holds its rows: a non-empty `results`, else
/// `result`.
fn rows_key(envelope: &Value) -> Option<&'static str> {
    let non_empty = |key: &str| {
        envelope
            .get(key)
            .and_then(Value::as_array)
            .is_some_and(|a| !a.is_empty())
    };
    if non_empty("results") {
        Some("results")
    } else if envelope.get("result").is_some_and(Value::is_array) {
        Some("result")
    } else {
        None
    }
}

/// Rows of an upstream envelope. Accepts both `results` and `result`.
pub fn rows(envelope: &Value) -> &[Value] {
    rows_key(envelope)
        .and_then(|key| envelope.get(key))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn rows_mut(envelope: &mut Value) -> Option<&mut Vec<Value>> {
    let key = rows_key(envelope)?;
    envelope.get_mut(key)?.as_array_mut()
}

/// `name` of the first row, for team and competition lookups.
pub fn first_name(envelope: &Value) -> Option<&str> {
    rows(envelope)
        .first()?
        .get("name")?
        .as_str()
        .filter(|n| !n.trim().is_empty())
}

/// Every live match with a usable id, in upstream order.
pub fn live_matches(envelope: &Value) -> Vec<LiveMatch> {
    rows(envelope).iter().filter_map(LiveMatch::from_value).collect()
}

/// Copy `status_id` from match details into live rows that lack one.
/// Returns how many rows were updated.
pub fn apply_detail_status(live: &mut Value, details: &BTreeMap<String, Value>) -> usize {
    let Some(rows) = rows_mut(live) else {
        return 0;
    };

    let mut updated = 0;
    for row in rows.iter_mut() {
        let Some(current) = LiveMatch::from_value(row) else {
            continue;
        };
        if row.get("status_id").is_some_and(|v| !v.is_null()) {
            continue;
        }
        let detail_status = details
            .get(&current.id)
            .and_then(MatchDetail::from_envelope)
            .and_then(|d| d.status_id);
        if let (Some(status), Some(obj)) = (detail_status, row.as_object_mut()) {
            obj.insert("status_id".into(), Value::from(status));
            updated += 1;
        }
    }
    updated
}

fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn int_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(id_from_value(&value))
}

fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(int_from_value(&value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_falls_back_to_score_array() {
        let row = json!({"id": "m1", "score": ["m1", 4, [1,0,0,0,0,0,0], [0,0,0,0,0,0,0], 0, ""]});
        let m = LiveMatch::from_value(&row).unwrap();
        assert_eq!(m.status_id, Some(4));
    }

    #[test]
    fn test_goals_come_from_score_slots() {
        let row = json!({"id": "m1", "score": ["m1", 4, [2, 1, 0], [], 0, ""]});
        assert_eq!(LiveMatch::from_value(&row).unwrap().score, Some((2, 0)));
        let bare = json!({"id": "m2", "status_id": 1});
        assert_eq!(LiveMatch::from_value(&bare).unwrap().score, None);
    }

    #[test]
    fn test_explicit_status_wins_over_score() {
        let row = json!({"id": "m1", "status_id": 2, "score": ["m1", 4]});
        assert_eq!(LiveMatch::from_value(&row).unwrap().status_id, Some(2));
    }

    #[test]
    fn test_wrong_types_default_to_none() {
        let row = json!({"id": 17, "status_id": {"x": 1}, "home_team_id": [], "score": "n/a"});
        let m = LiveMatch::from_value(&row).unwrap();
        assert_eq!(m.id, "17");
        assert_eq!(m.status_id, None);
        assert_eq!(m.home_team_id, None);
    }

    #[test]
    fn test_rows_without_id_are_skipped() {
        let envelope = json!({"results": [{"id": "a"}, {"status_id": 1}, {"id": ""}, "junk"]});
        let ids: Vec<_> = live_matches(&envelope).into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn test_detail_envelope_accepts_result_key() {
        let envelope = json!({"code": 0, "result": [{"home_team_id": "t1", "away_team_id": "t2", "competition_id": "c1", "status_id": 3}]});
        let d = MatchDetail::from_envelope(&envelope).unwrap();
        assert_eq!(d.home_team_id.as_deref(), Some("t1"));
        assert_eq!(d.competition_id.as_deref(), Some("c1"));
        assert_eq!(d.status_id, Some(3));
        assert!(MatchDetail::from_envelope(&json!({"results": []})).is_none());
    }

    #[test]
    fn test_apply_detail_status_fills_missing_only() {
        let mut live = json!({"results": [{"id": "a"}, {"id": "b", "status_id": 8}]});
        let mut details = BTreeMap::new();
        details.insert("a".to_string(), json!({"results": [{"status_id": 2}]}));
        details.insert("b".to_string(), json!({"results": [{"status_id": 4}]}));
        assert_eq!(apply_detail_status(&mut live, &details), 1);
        assert_eq!(live["results"][0]["status_id"], 2);
        assert_eq!(live["results"][1]["status_id"], 8);
    }

    #[test]
    fn test_apply_detail_status_handles_result_key() {
        let mut live = json!({"code": 0, "result": [{"id": "a"}]});
        let mut details = BTreeMap::new();
        details.insert("a".to_string(), json!({"result": [{"status_id": 3}]}));
        assert_eq!(apply_detail_status(&mut live, &details), 1);
        assert_eq!(live["result"][0]["status_id"], 3);
        assert_eq!(live_matches(&live)[0].status_id, Some(3));
    }

    #[test]
    fn test_first_name() {
        assert_eq!(first_name(&json!({"results": [{"name": "Arsenal"}]})), Some("Arsenal"));
        assert_eq!(first_name(&json!({"result": [{"name": "EPL"}]})), Some("EPL"));
        assert_eq!(first_name(&json!({"results": [{"name": ""}]})), None);
        assert_eq!(first_name(&json!({"_mock": true})), None);
    }
}
