//! The staging probe battery.
//!
//! Each probe makes one observation of staging behaviour and classifies it.
//! Classification is split into pure functions of the observed
//! status/headers/body so the decision logic tests without a network.
//! Probes are never retried: a flaky result is a signal about staging, not
//! noise to smooth over.

use crate::gate::ProbeResult;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Limits the staging contract is probed against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Allowed requests per hour per session.
    pub hourly_quota: u32,

    /// Allowed requests per rate-limit window.
    pub burst_limit: u32,

    /// Maximum accepted message body size in bytes.
    pub max_message_bytes: usize,

    /// A model identifier the allow-list must reject.
    pub unknown_model: String,

    /// Per-request timeout for every probe call.
    #[serde(with = "duration_secs")]
    pub probe_timeout: Duration,

    /// Streaming endpoint path.
    pub stream_path: String,

    /// Anonymous session issuance path.
    pub session_path: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            hourly_quota: 20,
            burst_limit: 30,
            max_message_bytes: 8192,
            unknown_model: "relay-unknown-model".to_string(),
            probe_timeout: Duration::from_secs(15),
            stream_path: "/api/v1/stream".to_string(),
            session_path: "/api/v1/session/anonymous".to_string(),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Session state threaded through the probe sequence.
///
/// Owned exclusively by one gate run; the burst probe only reads the token.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Anonymous session token issued by probe 2.
    pub token: Option<String>,

    /// Requests spent against the session so far.
    pub requests_used: u32,

    /// `Retry-After` value captured from the most recent 429, if any.
    pub retry_after: Option<String>,
}

// ---------------------------------------------------------------------------
// Pure classifiers
// ---------------------------------------------------------------------------

/// Probe 1: an unauthenticated request must be 401 exactly.
pub fn auth_rejected(status: u16) -> bool {
    status == 401
}

/// Probe 2: token shape check — non-empty, minimum length, no whitespace.
pub fn token_is_well_formed(token: &str) -> bool {
    token.len() >= 16 && !token.chars().any(char::is_whitespace)
}

/// Probe 3: server-sent-event framing marker.
pub fn has_sse_framing(body: &str) -> bool {
    body.contains("data:")
}

/// Probe 4: the first N requests pass, request N+1 is rejected.
pub fn quota_enforced(statuses: &[u16]) -> bool {
    match statuses.split_last() {
        Some((last, allowed)) => *last == 429 && allowed.iter().all(|s| *s != 429),
        None => false,
    }
}

/// Probe 5: at least one request in the burst is rate-limited.
pub fn burst_limited(statuses: &[u16]) -> bool {
    statuses.iter().any(|s| *s == 429)
}

/// Probe 6: oversized payloads are rejected with 422 or 413.
pub fn oversize_rejected(status: u16) -> bool {
    status == 422 || status == 413
}

/// Probe 7: unknown model identifiers are rejected with 422.
pub fn unknown_model_rejected(status: u16) -> bool {
    status == 422
}

/// Probe 8: `Retry-After` must parse as a positive integer.
pub fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok().filter(|v| *v > 0)
}

// ---------------------------------------------------------------------------
// Probe execution
// ---------------------------------------------------------------------------

/// Executes the probe battery against one staging host.
pub struct ProbeExecutor {
    host: String,
    config: GateConfig,
    http: reqwest::Client,
}

impl ProbeExecutor {
    /// Create an executor for `host`. One HTTP client serves every probe.
    pub fn new(host: &str, config: GateConfig) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("relay-gate/", env!("CARGO_PKG_VERSION")))
            .timeout(config.probe_timeout)
            .build()?;

        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            config,
            http,
        })
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    fn stream_url(&self) -> String {
        format!("{}{}", self.host, self.config.stream_path)
    }

    fn session_url(&self) -> String {
        format!("{}{}", self.host, self.config.session_path)
    }

    /// Probe 1: unauthenticated stream request must be rejected.
    pub async fn probe_auth_required(&self) -> ProbeResult {
        const DESC: &str = "unauthenticated stream request is rejected";
        const EXPECTED: &str = "HTTP 401";

        let url = format!("{}?message=ping", self.stream_url());
        match self.http.get(&url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                debug!(probe = 1, status, "auth probe response");
                if auth_rejected(status) {
                    ProbeResult::pass(1, DESC, EXPECTED, status, format!("HTTP {status}"))
                } else {
                    ProbeResult::fail(1, DESC, EXPECTED, status, format!("HTTP {status}"))
                }
            }
            Err(e) => ProbeResult::fail(1, DESC, EXPECTED, 0, format!("request error: {e}")),
        }
    }

    /// Probe 2: anonymous session issuance. On success the token is stored
    /// in `state` for probes 3-8.
    pub async fn probe_session_issuance(&self, state: &mut SessionState) -> ProbeResult {
        const DESC: &str = "anonymous session token issued";
        const EXPECTED: &str = "well-formed session token";

        match self.http.post(self.session_url()).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let body: serde_json::Value = match response.json().await {
                    Ok(v) => v,
                    Err(e) => {
                        return ProbeResult::fail(
                            2,
                            DESC,
                            EXPECTED,
                            status,
                            format!("HTTP {status}, unparseable body: {e}"),
                        )
                    }
                };
                let token = body["token"].as_str().unwrap_or_default();
                if token_is_well_formed(token) {
                    state.token = Some(token.to_string());
                    ProbeResult::pass(2, DESC, EXPECTED, status, format!("token of {} chars", token.len()))
                } else {
                    ProbeResult::fail(
                        2,
                        DESC,
                        EXPECTED,
                        status,
                        format!("HTTP {status}, malformed token {token:?}"),
                    )
                }
            }
            Err(e) => ProbeResult::fail(2, DESC, EXPECTED, 0, format!("request error: {e}")),
        }
    }

    /// Probe 3: authenticated streaming yields SSE frames.
    pub async fn probe_streaming(&self, state: &mut SessionState) -> ProbeResult {
        const DESC: &str = "authenticated stream returns SSE frames";
        const EXPECTED: &str = "HTTP 200 with data: framing";

        let token = match require_token(state, 3, DESC, EXPECTED) {
            Ok(t) => t,
            Err(result) => return result,
        };

        let url = format!("{}?message=ping", self.stream_url());
        let request = self.http.get(&url).bearer_auth(&token);
        state.requests_used += 1;

        match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                if status == 200 && has_sse_framing(&body) {
                    ProbeResult::pass(3, DESC, EXPECTED, status, "HTTP 200 with data: frames")
                } else {
                    ProbeResult::fail(
                        3,
                        DESC,
                        EXPECTED,
                        status,
                        format!("HTTP {status}, sse framing: {}", has_sse_framing(&body)),
                    )
                }
            }
            Err(e) => ProbeResult::fail(3, DESC, EXPECTED, 0, format!("request error: {e}")),
        }
    }

    /// Probe 4: hourly quota. Issues quota+1 sequential requests; the last
    /// must be 429 and the first N must not be.
    pub async fn probe_quota(&self, state: &mut SessionState) -> ProbeResult {
        const DESC: &str = "hourly quota enforced";
        let expected = format!("HTTP 429 on request {}", self.config.hourly_quota + 1);

        let token = match require_token(state, 4, DESC, &expected) {
            Ok(t) => t,
            Err(result) => return result,
        };

        let url = format!("{}?message=ping", self.stream_url());
        let total = self.config.hourly_quota + 1;
        let mut statuses = Vec::with_capacity(total as usize);

        for _ in 0..total {
            state.requests_used += 1;
            match self.http.get(&url).bearer_auth(&token).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if status == 429 {
                        capture_retry_after(state, response.headers());
                    }
                    statuses.push(status);
                }
                Err(e) => {
                    return ProbeResult::fail(4, DESC, &expected, 0, format!("request error: {e}"))
                }
            }
        }

        let last = *statuses.last().unwrap_or(&0);
        if quota_enforced(&statuses) {
            ProbeResult::pass(4, DESC, &expected, last, format!("HTTP 429 after {} requests", total))
        } else {
            let early_429s = statuses[..statuses.len() - 1].iter().filter(|s| **s == 429).count();
            ProbeResult::fail(
                4,
                DESC,
                &expected,
                last,
                format!("last status HTTP {last}, {early_429s} premature 429(s)"),
            )
        }
    }

    /// Probe 5: burst rate limit. All requests are spawned before any is
    /// awaited so the server sees a true burst; sequential issuance would
    /// never trip the window.
    pub async fn probe_rate_limit_burst(&self, state: &mut SessionState) -> ProbeResult {
        const DESC: &str = "burst rate limit enforced";
        let expected = format!("at least one HTTP 429 across {} concurrent requests", self.config.burst_limit + 1);

        let token = match require_token(state, 5, DESC, &expected) {
            Ok(t) => t,
            Err(result) => return result,
        };

        let url = format!("{}?message=ping", self.stream_url());
        let total = self.config.burst_limit + 1;

        let mut tasks = Vec::with_capacity(total as usize);
        for _ in 0..total {
            let request = self.http.get(&url).bearer_auth(&token);
            tasks.push(tokio::spawn(async move {
                match request.send().await {
                    Ok(response) => {
                        let status = response.status().as_u16();
                        let retry_after = response
                            .headers()
                            .get("Retry-After")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        (Some(status), retry_after)
                    }
                    Err(_) => (None, None),
                }
            }));
        }
        state.requests_used += total;

        let mut statuses = Vec::with_capacity(total as usize);
        let mut errors = 0usize;
        for joined in join_all(tasks).await {
            match joined {
                Ok((Some(status), retry_after)) => {
                    if status == 429 {
                        if let Some(value) = retry_after {
                            state.retry_after = Some(value);
                        }
                    }
                    statuses.push(status);
                }
                _ => errors += 1,
            }
        }

        let limited = statuses.iter().filter(|s| **s == 429).count();
        if burst_limited(&statuses) {
            ProbeResult::pass(
                5,
                DESC,
                &expected,
                429,
                format!("{limited} of {total} requests rate-limited"),
            )
        } else {
            ProbeResult::fail(
                5,
                DESC,
                &expected,
                *statuses.last().unwrap_or(&0),
                format!("no 429 across {total} requests ({errors} transport errors)"),
            )
        }
    }

    /// Probe 6: message body beyond the size limit must be rejected.
    pub async fn probe_oversized_payload(&self, state: &mut SessionState) -> ProbeResult {
        const DESC: &str = "oversized message rejected";
        const EXPECTED: &str = "HTTP 422 or 413";

        let token = match require_token(state, 6, DESC, EXPECTED) {
            Ok(t) => t,
            Err(result) => return result,
        };

        let oversized = "x".repeat(self.config.max_message_bytes + 808);
        let body = serde_json::json!({ "message": oversized });
        state.requests_used += 1;

        match self
            .http
            .post(self.stream_url())
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status().as_u16();
                if oversize_rejected(status) {
                    ProbeResult::pass(6, DESC, EXPECTED, status, format!("HTTP {status}"))
                } else {
                    ProbeResult::fail(6, DESC, EXPECTED, status, format!("HTTP {status}"))
                }
            }
            Err(e) => ProbeResult::fail(6, DESC, EXPECTED, 0, format!("request error: {e}")),
        }
    }

    /// Probe 7: disallowed model identifiers must be rejected.
    pub async fn probe_model_allow_list(&self, state: &mut SessionState) -> ProbeResult {
        const DESC: &str = "unknown model rejected";
        const EXPECTED: &str = "HTTP 422";

        let token = match require_token(state, 7, DESC, EXPECTED) {
            Ok(t) => t,
            Err(result) => return result,
        };

        let body = serde_json::json!({
            "message": "ping",
            "model": self.config.unknown_model,
        });
        state.requests_used += 1;

        match self
            .http
            .post(self.stream_url())
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status().as_u16();
                if unknown_model_rejected(status) {
                    ProbeResult::pass(7, DESC, EXPECTED, status, format!("HTTP {status}"))
                } else {
                    ProbeResult::fail(7, DESC, EXPECTED, status, format!("HTTP {status}"))
                }
            }
            Err(e) => ProbeResult::fail(7, DESC, EXPECTED, 0, format!("request error: {e}")),
        }
    }

    /// Probe 8: a rate-limited response must carry a numeric `Retry-After`.
    /// Prefers the header captured during probes 4/5; otherwise provokes one
    /// more 429 against the already-exhausted session.
    pub async fn probe_retry_after(&self, state: &mut SessionState) -> ProbeResult {
        const DESC: &str = "rate-limited response carries Retry-After";
        const EXPECTED: &str = "numeric positive Retry-After header";

        if let Some(value) = state.retry_after.clone() {
            return classify_retry_after_value(429, &value);
        }

        let token = match require_token(state, 8, DESC, EXPECTED) {
            Ok(t) => t,
            Err(result) => return result,
        };

        let url = format!("{}?message=ping", self.stream_url());
        state.requests_used += 1;

        match self.http.get(&url).bearer_auth(&token).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                if status != 429 {
                    return ProbeResult::fail(
                        8,
                        DESC,
                        EXPECTED,
                        status,
                        format!("HTTP {status}, no rate-limited response to inspect"),
                    );
                }
                match response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                {
                    Some(value) => classify_retry_after_value(status, value),
                    None => ProbeResult::fail(8, DESC, EXPECTED, status, "429 without Retry-After header"),
                }
            }
            Err(e) => ProbeResult::fail(8, DESC, EXPECTED, 0, format!("request error: {e}")),
        }
    }
}

fn classify_retry_after_value(status: u16, value: &str) -> ProbeResult {
    const DESC: &str = "rate-limited response carries Retry-After";
    const EXPECTED: &str = "numeric positive Retry-After header";

    match parse_retry_after(value) {
        Some(seconds) => ProbeResult::pass(8, DESC, EXPECTED, status, format!("Retry-After: {seconds}")),
        None => ProbeResult::fail(8, DESC, EXPECTED, status, format!("non-numeric Retry-After {value:?}")),
    }
}

fn capture_retry_after(state: &mut SessionState, headers: &reqwest::header::HeaderMap) {
    if let Some(value) = headers.get("Retry-After").and_then(|v| v.to_str().ok()) {
        state.retry_after = Some(value.to_string());
    }
}

/// Probes 3-8 need the token from probe 2. When it is missing the probe is
/// recorded as failed with an explicit reason, never silently skipped.
fn require_token(
    state: &SessionState,
    probe_id: u32,
    description: &str,
    expected: &str,
) -> std::result::Result<String, ProbeResult> {
    match &state.token {
        Some(token) => Ok(token.clone()),
        None => Err(ProbeResult::fail(
            probe_id,
            description,
            expected,
            0,
            "no session token (session issuance probe failed)",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_classifier_requires_exact_401() {
        assert!(auth_rejected(401));
        assert!(!auth_rejected(200));
        assert!(!auth_rejected(403));
    }

    #[test]
    fn test_token_shape() {
        assert!(token_is_well_formed("st-4f6a9c2d81be03a7"));
        assert!(!token_is_well_formed(""));
        assert!(!token_is_well_formed("short"));
        assert!(!token_is_well_formed("has whitespace in the middle"));
    }

    #[test]
    fn test_sse_framing_marker() {
        assert!(has_sse_framing("event: message\ndata: {\"delta\":\"hi\"}\n\n"));
        assert!(!has_sse_framing("{\"message\":\"hi\"}"));
    }

    #[test]
    fn test_quota_classifier() {
        // 20 allowed then the 21st rejected.
        let mut statuses = vec![200u16; 20];
        statuses.push(429);
        assert!(quota_enforced(&statuses));

        // Premature 429 fails the probe.
        let mut premature = vec![200u16; 19];
        premature.insert(10, 429);
        premature.push(429);
        assert!(!quota_enforced(&premature));

        // Quota never kicking in fails the probe.
        assert!(!quota_enforced(&vec![200u16; 21]));
        assert!(!quota_enforced(&[]));
    }

    #[test]
    fn test_burst_classifier() {
        let mut statuses = vec![200u16; 30];
        assert!(!burst_limited(&statuses));
        statuses.push(429);
        assert!(burst_limited(&statuses));
    }

    #[test]
    fn test_oversize_accepts_either_rejection_code() {
        assert!(oversize_rejected(422));
        assert!(oversize_rejected(413));
        assert!(!oversize_rejected(200));
        assert!(!oversize_rejected(400));
    }

    #[test]
    fn test_unknown_model_requires_422() {
        assert!(unknown_model_rejected(422));
        assert!(!unknown_model_rejected(404));
    }

    #[test]
    fn test_retry_after_parsing() {
        assert_eq!(parse_retry_after("30"), Some(30));
        assert_eq!(parse_retry_after(" 5 "), Some(5));
        assert_eq!(parse_retry_after("0"), None);
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after(""), None);
    }

    #[test]
    fn test_missing_token_fails_with_reason() {
        let state = SessionState::default();
        let result = require_token(&state, 5, "burst rate limit enforced", "429").unwrap_err();
        assert!(!result.passed);
        assert_eq!(result.probe_id, 5);
        assert!(result.actual.contains("no session token"));
    }

    #[test]
    fn test_gate_config_defaults_match_staging_contract() {
        let config = GateConfig::default();
        assert_eq!(config.hourly_quota, 20);
        assert_eq!(config.burst_limit, 30);
        assert_eq!(config.max_message_bytes, 8192);
        assert_eq!(config.probe_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_executor_normalizes_host() {
        let executor =
            ProbeExecutor::new("https://staging.relay.dev/", GateConfig::default()).expect("executor");
        assert_eq!(executor.stream_url(), "https://staging.relay.dev/api/v1/stream");
        assert_eq!(
            executor.session_url(),
            "https://staging.relay.dev/api/v1/session/anonymous"
        );
    }
}
