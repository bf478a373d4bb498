use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct HttpContext {
    pub user_agent: String,
    pub manifest_timeout_secs: u64,
    pub stream_timeout_secs: u64,
    pub retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for HttpContext {
    fn default() -> Self {
        Self {
            user_agent: "OrangeStreams/0.1".to_string(),
            manifest_timeout_secs: 10,
            stream_timeout_secs: 20,
            retries: 1,
            retry_backoff_ms: 400,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("transport: {0}")]
    Transport(reqwest::Error),

    #[error("http status {0}")]
    Status(StatusCode),

    #[error("response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid header {0}")]
    Header(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err)
        }
    }
}

pub fn build_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
}

impl HttpContext {
    /// `Accept: application/json` plus the configured user agent and any extras.
    pub fn json_headers(&self, extra: &BTreeMap<String, String>) -> Result<HeaderMap, FetchError> {
        let mut h = HeaderMap::new();
        h.insert(ACCEPT, HeaderValue::from_static("application/json"));
        h.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.user_agent).map_err(|_| FetchError::Header("user-agent".to_string()))?,
        );
        for (k, v) in extra {
            let name = HeaderName::from_bytes(k.as_bytes()).map_err(|_| FetchError::Header(k.clone()))?;
            let value = HeaderValue::from_str(v).map_err(|_| FetchError::Header(k.clone()))?;
            h.insert(name, value);
        }
        Ok(h)
    }

    pub fn should_retry_status(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
            || status.is_server_error()
    }

    async fn sleep_backoff(&self, attempt: u32) {
        let base = self.retry_backoff_ms.max(1);
        let shift = attempt.min(16);
        let mul = 1u64 << shift;
        let ms = base.saturating_mul(mul).min(30_000);
        sleep(Duration::from_millis(ms)).await;
    }
}

/// GET `url` and decode the body as JSON, retrying transient failures `retries` times.
pub async fn get_json(
    client: &reqwest::Client,
    ctx: &HttpContext,
    url: &str,
    headers: HeaderMap,
    timeout: Duration,
    retries: u32,
) -> Result<serde_json::Value, FetchError> {
    let mut last_err: Option<FetchError> = None;
    for attempt in 0..=retries {
        if attempt > 0 {
            ctx.sleep_backoff(attempt - 1).await;
        }

        let resp = match client.get(url).headers(headers.clone()).timeout(timeout).send().await {
            Ok(r) => r,
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        };

        let status = resp.status();
        if status.is_success() {
            let body: Bytes = resp.bytes().await?;
            return Ok(serde_json::from_slice(&body)?);
        }

        if HttpContext::should_retry_status(status) {
            last_err = Some(FetchError::Status(status));
            continue;
        }
        return Err(FetchError::Status(status));
    }

    Err(last_err.unwrap_or(FetchError::Timeout))
}
