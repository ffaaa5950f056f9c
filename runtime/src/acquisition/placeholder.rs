//! Placeholder payloads substituted for degraded lookups.
//!
//! The shape mirrors an empty upstream envelope (`code`, `results`) so that
//! consumers walking `results` see zero rows instead of a missing key.

use super::task::FetchTask;
use serde_json::{json, Value};

/// Top-level flag downstream stages use to recognise synthesized data.
pub const MOCK_FLAG: &str = "_mock";

pub fn synthesize(task: &FetchTask, reason: &str) -> Value {
    json!({
        "code": 0,
        "results": [],
        (MOCK_FLAG): true,
        "_degraded": {
            "kind": task.kind().as_str(),
            "entity_id": task.entity_id(),
            "reason": reason,
        },
    })
}

pub fn is_placeholder(payload: &Value) -> bool {
    payload
        .get(MOCK_FLAG)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::task::EntityKind;
    use crate::config::Credentials;

    #[test]
    fn test_placeholder_is_tagged_with_reason() {
        let task = FetchTask::new(
            EntityKind::Team,
            Some("t9".into()),
            "http://x",
            &Credentials::new("u", "s"),
        );
        let value = synthesize(&task, "timeout after 3 attempts");
        assert!(is_placeholder(&value));
        assert_eq!(value["results"], json!([]));
        assert_eq!(value["_degraded"]["kind"], "team");
        assert_eq!(value["_degraded"]["entity_id"], "t9");
        assert_eq!(value["_degraded"]["reason"], "timeout after 3 attempts");
    }

    #[test]
    fn test_real_payload_is_not_placeholder() {
        assert!(!is_placeholder(&json!({"code": 0, "results": []})));
        assert!(!is_placeholder(&json!({"_mock": "yes"})));
    }
}
