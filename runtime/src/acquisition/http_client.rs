//! Async transport client wrapping reqwest.
//!
//! One [`Transport::send`] call is one HTTP attempt. [`TransportClient`]
//! layers the retry policy, the shared admission gate, and the
//! degrade-with-placeholder rule on top, so every task resolves to exactly
//! one [`FetchOutcome`].

use super::placeholder;
use super::retry::RetryPolicy;
use super::task::{FetchOutcome, FetchTask};
use crate::error::FetchError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

/// Phrases the upstream uses in its `err` field when credentials are rejected.
const AUTH_ERROR_MARKERS: &[&str] = &["not authorized", "contact our business staff"];

/// A single-attempt request primitive. Implementations must not retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, task: &FetchTask) -> Result<Value, FetchError>;
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .user_agent(concat!("pitchfeed/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, task: &FetchTask) -> Result<Value, FetchError> {
        let resp = self
            .client
            .get(task.url())
            .query(task.params())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.text().await.map_err(classify_reqwest_error)?;
        classify_response(status, retry_after.as_deref(), &body)
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_builder() {
        return FetchError::Malformed(format!("invalid request: {e}"));
    }
    if e.is_timeout() {
        return FetchError::Transient(format!("timeout: {e}"));
    }
    if e.is_connect() {
        return FetchError::Transient(format!("connection failed: {e}"));
    }
    FetchError::Transient(e.to_string())
}

/// Map an HTTP status and raw body onto the fetch taxonomy.
///
/// Anything the upstream might answer differently next time (5xx, 429,
/// other unexpected statuses, a body that is not a JSON object) is
/// transient. Only an `err` payload is final: an authorization message is
/// non-retriable, any other message is malformed.
pub fn classify_response(
    status: u16,
    retry_after: Option<&str>,
    body: &str,
) -> Result<Value, FetchError> {
    match status {
        200..=299 => {}
        401 | 403 => {
            return Err(FetchError::NonRetriable(format!(
                "authorization rejected (HTTP {status})"
            )))
        }
        429 => {
            let hint = retry_after
                .map(|s| format!(", retry-after {s}"))
                .unwrap_or_default();
            return Err(FetchError::Transient(format!("rate limited (HTTP 429{hint})")));
        }
        500..=599 => return Err(FetchError::Transient(format!("server error (HTTP {status})"))),
        _ => return Err(FetchError::Transient(format!("unexpected HTTP {status}"))),
    }

    let value: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::Transient(format!("invalid JSON: {e}")))?;

    if let Some(err) = value.get("err") {
        let message = err
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        if is_authorization_message(&message) {
            return Err(FetchError::NonRetriable(message));
        }
        return Err(FetchError::Malformed(format!("upstream error: {message}")));
    }

    if !value.is_object() {
        return Err(FetchError::Transient("payload is not a JSON object".into()));
    }
    Ok(value)
}

fn is_authorization_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    AUTH_ERROR_MARKERS.iter().any(|m| lower.contains(m))
}

/// Retrying client shared by every stage of a cycle.
///
/// The semaphore is the single admission gate across both enrichment phases;
/// a permit is held only for the duration of one network attempt, never
/// across a backoff sleep.
#[derive(Clone)]
pub struct TransportClient {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    gate: Arc<Semaphore>,
}

impl TransportClient {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy, concurrency: usize) -> Self {
        Self {
            transport,
            policy,
            gate: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Resolve `task` to exactly one outcome.
    pub async fn execute(&self, task: &FetchTask) -> FetchOutcome {
        let max_attempts = self.policy.max_attempts();
        let entity_id = task.entity_id().unwrap_or("-");
        let mut attempt: u32 = 0;

        loop {
            let (result, elapsed_ms) = {
                let _permit = match self.gate.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return FetchOutcome::Failed {
                            reason: "admission gate closed".into(),
                        }
                    }
                };
                let started = Instant::now();
                let result = self.transport.send(task).await;
                (result, started.elapsed().as_millis() as u64)
            };
            let attempt_no = attempt + 1;

            let err = match result {
                Ok(payload) => {
                    debug!(
                        kind = %task.kind(),
                        entity_id,
                        attempt = attempt_no,
                        status = "success",
                        elapsed_ms,
                        "fetch attempt"
                    );
                    return FetchOutcome::Success(payload);
                }
                Err(err) => err,
            };

            if let FetchError::NonRetriable(_) = err {
                error!(
                    kind = %task.kind(),
                    entity_id,
                    attempt = attempt_no,
                    status = err.tag(),
                    elapsed_ms,
                    reason = err.reason(),
                    "fetch attempt"
                );
            } else {
                warn!(
                    kind = %task.kind(),
                    entity_id,
                    attempt = attempt_no,
                    status = err.tag(),
                    elapsed_ms,
                    reason = err.reason(),
                    "fetch attempt"
                );
            }

            if err.is_retriable() && attempt_no < max_attempts {
                tokio::time::sleep(self.policy.backoff(attempt)).await;
                attempt += 1;
                continue;
            }

            return match err {
                FetchError::NonRetriable(reason) => FetchOutcome::Failed { reason },
                FetchError::Transient(reason) => {
                    degraded(task, format!("{reason} (after {attempt_no} attempts)"))
                }
                FetchError::Malformed(reason) => degraded(task, reason),
            };
        }
    }
}

fn degraded(task: &FetchTask, reason: String) -> FetchOutcome {
    FetchOutcome::Degraded {
        placeholder: placeholder::synthesize(task, &reason),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::task::EntityKind;
    use crate::config::Credentials;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed script of per-attempt results, then succeeds.
    struct Scripted {
        script: Mutex<VecDeque<Result<Value, FetchError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(script: Vec<Result<Value, FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn send(&self, _task: &FetchTask) -> Result<Value, FetchError> {
            *self.calls.lock().unwrap() += 1;
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({"code": 0, "results": []})))
        }
    }

    fn task() -> FetchTask {
        FetchTask::new(
            EntityKind::MatchDetail,
            Some("m1".into()),
            "http://upstream",
            &Credentials::new("u", "s"),
        )
    }

    fn client(transport: Arc<Scripted>) -> TransportClient {
        TransportClient::new(transport, RetryPolicy::new(3, Duration::from_millis(1)), 4)
    }

    fn tag_of(status: u16, body: &str) -> &'static str {
        classify_response(status, None, body).unwrap_err().tag()
    }

    #[test]
    fn test_classify_success_and_errors() {
        assert!(classify_response(200, None, r#"{"code":0,"results":[]}"#).is_ok());
        assert_eq!(tag_of(503, ""), "transient");
        assert_eq!(tag_of(429, ""), "transient");
        assert_eq!(tag_of(401, ""), "non_retriable");
        assert_eq!(tag_of(403, ""), "non_retriable");
    }

    #[test]
    fn test_undecodable_bodies_and_unexpected_statuses_are_transient() {
        assert_eq!(tag_of(404, ""), "transient");
        assert_eq!(tag_of(200, "<html>maintenance</html>"), "transient");
        assert_eq!(tag_of(200, "[1,2]"), "transient");
    }

    #[test]
    fn test_rate_limit_reason_carries_retry_after() {
        let err = classify_response(429, Some("7"), "").unwrap_err();
        assert_eq!(err.reason(), "rate limited (HTTP 429, retry-after 7)");
        assert!(err.is_retriable());
    }

    #[test]
    fn test_classify_err_field() {
        let auth = classify_response(
            200,
            None,
            r#"{"err":"You are Not Authorized, please contact our business staff"}"#,
        )
        .unwrap_err();
        assert!(matches!(auth, FetchError::NonRetriable(_)));

        let other = classify_response(200, None, r#"{"err":"unknown uuid"}"#).unwrap_err();
        assert!(matches!(other, FetchError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let transport = Scripted::new(vec![Err(FetchError::Transient("reset".into()))]);
        let outcome = client(transport.clone()).execute(&task()).await;
        assert!(matches!(outcome, FetchOutcome::Success(_)));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_degrade_after_three_attempts() {
        let transport = Scripted::new(vec![
            Err(FetchError::Transient("timeout".into())),
            Err(FetchError::Transient("timeout".into())),
            Err(FetchError::Transient("timeout".into())),
            Err(FetchError::Transient("timeout".into())),
        ]);
        let outcome = client(transport.clone()).execute(&task()).await;
        assert_eq!(transport.calls(), 3);
        match outcome {
            FetchOutcome::Degraded { placeholder, reason } => {
                assert!(placeholder::is_placeholder(&placeholder));
                assert!(reason.contains("after 3 attempts"));
            }
            other => panic!("expected degraded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_retriable_fails_without_retry() {
        let transport = Scripted::new(vec![Err(FetchError::NonRetriable("HTTP 401".into()))]);
        let outcome = client(transport.clone()).execute(&task()).await;
        assert_eq!(transport.calls(), 1);
        assert!(outcome.is_failed());
    }

    #[tokio::test]
    async fn test_malformed_degrades_immediately() {
        let transport = Scripted::new(vec![Err(FetchError::Malformed("bad json".into()))]);
        let outcome = client(transport.clone()).execute(&task()).await;
        assert_eq!(transport.calls(), 1);
        assert!(matches!(outcome, FetchOutcome::Degraded { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_one_then_two_seconds() {
        let transport = Scripted::new(vec![
            Err(FetchError::Transient("a".into())),
            Err(FetchError::Transient("b".into())),
            Err(FetchError::Transient("c".into())),
        ]);
        let client = TransportClient::new(transport, RetryPolicy::default(), 1);
        let started = tokio::time::Instant::now();
        let outcome = client.execute(&task()).await;
        assert!(matches!(outcome, FetchOutcome::Degraded { .. }));
        // 1s after the first failure, 2s after the second, none after the last.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }
}
