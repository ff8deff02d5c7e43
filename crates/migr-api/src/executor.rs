use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::Value;

use migr_core::config::RetrySettings;
use migr_core::error::MigrError;

/// Longest error message kept from a response body.
const MAX_MESSAGE_LEN: usize = 200;

/// Headers the platform (or a proxy in front of it) uses for request ids.
const REQUEST_ID_HEADERS: &[&str] = &["snyk-request-id", "x-request-id"];

/// Retry policy for platform calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: settings.base_delay(),
        }
    }
}

impl RetryPolicy {
    /// Sleep before retrying after a 429 on `attempt` (1-based): linear in
    /// the attempt number.
    pub fn rate_limit_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// What to do with a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Success,
    /// Credentials or request are wrong; retrying cannot help.
    Fatal,
    RateLimited,
    Retry,
}

pub fn classify(status: u16) -> Disposition {
    match status {
        200..=299 => Disposition::Success,
        401 | 400 | 403 | 404 | 504 => Disposition::Fatal,
        429 => Disposition::RateLimited,
        _ => Disposition::Retry,
    }
}

/// A successful platform response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub location: Option<String>,
    pub request_id: Option<String>,
    /// Parsed JSON body, `Value::Null` when empty or not JSON.
    pub body: Value,
}

enum AttemptError {
    Fatal(MigrError),
    RateLimited(MigrError),
    Retry(MigrError),
}

/// Issues platform requests with bounded, rate-limit-aware retries.
#[derive(Clone)]
pub struct RequestExecutor {
    client: reqwest::Client,
    base_url: String,
    policy: RetryPolicy,
}

impl RequestExecutor {
    pub fn new(base_url: &str, token: &str, policy: RetryPolicy) -> Result<Self, MigrError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let mut auth =
            HeaderValue::from_str(&format!("token {token}")).map_err(|_| MigrError::Config {
                message: "API token contains invalid characters".to_string(),
            })?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(header::USER_AGENT, HeaderValue::from_static("migr/0.1.0"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| MigrError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            policy,
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Absolute URLs pass through; paths are joined onto the base URL.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Execute one logical request, retrying per the policy.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, MigrError> {
        let url = self.url(path);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.attempt(method.clone(), &url, body).await {
                Ok(response) => {
                    if attempt > 1 {
                        tracing::debug!(%method, path, attempt, "request succeeded after retries");
                    }
                    return Ok(response);
                }
                Err(AttemptError::Fatal(e)) => {
                    tracing::debug!(%method, path, status = ?e.status(), "not retrying: {e}");
                    return Err(e);
                }
                Err(AttemptError::RateLimited(e)) => {
                    if attempt < max_attempts {
                        let delay = self.policy.rate_limit_delay(attempt);
                        tracing::warn!(
                            %method,
                            path,
                            attempt,
                            request_id = e.request_id().unwrap_or("-"),
                            "rate limited, retrying in {delay:?}"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
                Err(AttemptError::Retry(e)) => {
                    tracing::debug!(
                        %method,
                        path,
                        attempt,
                        max_attempts,
                        "request failed, retrying: {e}"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| MigrError::Other(format!("no attempt made for {path}"))))
    }

    async fn attempt(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, AttemptError> {
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            AttemptError::Retry(MigrError::Network {
                message: e.without_url().to_string(),
            })
        })?;

        let status = response.status().as_u16();
        let location = header_value(response.headers(), &[header::LOCATION.as_str()]);
        let request_id = header_value(response.headers(), REQUEST_ID_HEADERS);
        let text = response.text().await.unwrap_or_default();

        match classify(status) {
            Disposition::Success => Ok(ApiResponse {
                status,
                location,
                request_id,
                body: serde_json::from_str(&text).unwrap_or(Value::Null),
            }),
            disposition => {
                let message = sanitize_message(&text);
                let error = if status == 401 {
                    MigrError::Unauthorized {
                        message,
                        request_id,
                    }
                } else {
                    MigrError::Api {
                        status,
                        message,
                        request_id,
                    }
                };
                Err(match disposition {
                    Disposition::Fatal => AttemptError::Fatal(error),
                    Disposition::RateLimited => AttemptError::RateLimited(error),
                    _ => AttemptError::Retry(error),
                })
            }
        }
    }
}

fn header_value(headers: &HeaderMap, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| headers.get(*name))
        .find_map(|v| v.to_str().ok().map(str::to_string))
}

/// Reduce an error body to a short message: the JSON `message` / `error`
/// field when present, otherwise the collapsed text, truncated.
pub fn sanitize_message(body: &str) -> String {
    let extracted = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        ["message", "error", "detail"]
            .iter()
            .find_map(|key| v.get(*key).and_then(Value::as_str).map(str::to_string))
    });
    let raw = extracted.unwrap_or_else(|| body.to_string());
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return "no response body".to_string();
    }
    if collapsed.chars().count() > MAX_MESSAGE_LEN {
        let truncated: String = collapsed.chars().take(MAX_MESSAGE_LEN).collect();
        format!("{truncated}...")
    } else {
        collapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 7,
            base_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_classification() {
        assert_eq!(classify(200), Disposition::Success);
        assert_eq!(classify(201), Disposition::Success);
        for status in [400, 401, 403, 404, 504] {
            assert_eq!(classify(status), Disposition::Fatal, "{status}");
        }
        assert_eq!(classify(429), Disposition::RateLimited);
        assert_eq!(classify(500), Disposition::Retry);
    }

    #[test]
    fn test_rate_limit_delay_is_linear_and_monotonic() {
        let policy = RetryPolicy {
            max_attempts: 7,
            base_delay: Duration::from_millis(100),
        };
        let delays: Vec<Duration> = (1..=7).map(|a| policy.rate_limit_delay(a)).collect();
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[2], Duration::from_millis(300));
        assert!(delays.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn test_sanitize_message() {
        assert_eq!(sanitize_message(r#"{"message":"Not  found","code":404}"#), "Not found");
        assert_eq!(sanitize_message(""), "no response body");
        let long = "a".repeat(500);
        assert_eq!(sanitize_message(&long).len(), MAX_MESSAGE_LEN + 3);
    }

    #[test]
    fn test_url_joining() {
        let executor =
            RequestExecutor::new("https://api.example.com/v1/", "t", fast_policy()).unwrap();
        assert_eq!(
            executor.url("/org/o/projects"),
            "https://api.example.com/v1/org/o/projects"
        );
        assert_eq!(executor.url("https://other/x"), "https://other/x");
    }

    #[tokio::test]
    async fn test_success_returns_body_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/org/o/thing"))
            .and(header("authorization", "token secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("snyk-request-id", "rid-1")
                    .set_body_json(serde_json::json!({"ok": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let executor = RequestExecutor::new(&server.uri(), "secret", fast_policy()).unwrap();
        let response = executor.execute(Method::GET, "org/o/thing", None).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.request_id.as_deref(), Some("rid-1"));
        assert_eq!(response.body["ok"], true);
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .expect(1)
            .mount(&server)
            .await;

        let executor = RequestExecutor::new(&server.uri(), "t", fast_policy()).unwrap();
        let err = executor.execute(Method::GET, "x", None).await.unwrap_err();
        assert!(matches!(err, MigrError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "message": "no such org"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let executor = RequestExecutor::new(&server.uri(), "t", fast_policy()).unwrap();
        let err = executor.execute(Method::GET, "x", None).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("no such org"));
    }

    #[tokio::test]
    async fn test_rate_limited_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).insert_header("location", "https://poll/1"))
            .expect(1)
            .mount(&server)
            .await;

        let executor = RequestExecutor::new(&server.uri(), "t", fast_policy()).unwrap();
        let response = executor
            .execute(Method::POST, "import", Some(&serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.location.as_deref(), Some("https://poll/1"));
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .expect(3)
            .mount(&server)
            .await;

        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        };
        let executor = RequestExecutor::new(&server.uri(), "t", policy).unwrap();
        let err = executor.execute(Method::GET, "x", None).await.unwrap_err();
        assert_eq!(err.status(), Some(502));
    }
}
