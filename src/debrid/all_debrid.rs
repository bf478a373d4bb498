use crate::core::error::DebridError;
use crate::core::model::DebridStatus;
use crate::debrid::{DebridFile, DebridProvider, JobSnapshot};
use crate::http::HttpContext;
use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use serde_json::Value;
use std::time::Duration;

pub const ALL_DEBRID_API: &str = "https://api.alldebrid.com/v4";
const NAME: &str = "AllDebrid";
const AGENT: &str = "OrangeStreams";

/// AllDebrid v4 client. Every call carries `agent` and `apikey` query parameters
/// and answers with a `{status, data | error}` envelope.
pub struct AllDebrid {
    client: reqwest::Client,
    ctx: HttpContext,
    api_key: String,
    base: String,
}

impl AllDebrid {
    pub fn new(client: reqwest::Client, ctx: HttpContext, api_key: &str, base: Option<&str>) -> Self {
        Self {
            client,
            ctx,
            api_key: api_key.to_string(),
            base: base.unwrap_or(ALL_DEBRID_API).trim_end_matches('/').to_string(),
        }
    }

    async fn call(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value, DebridError> {
        let resp = self
            .client
            .get(format!("{}/{}", self.base, endpoint))
            .query(&[("agent", AGENT), ("apikey", self.api_key.as_str())])
            .query(params)
            .header(USER_AGENT, &self.ctx.user_agent)
            .timeout(Duration::from_secs(self.ctx.stream_timeout_secs))
            .send()
            .await
            .map_err(|e| DebridError::network(NAME, e))?;

        let status = resp.status();
        // rate limits and server trouble are worth another status check
        if HttpContext::should_retry_status(status) {
            return Err(DebridError::network(NAME, format!("HTTP {}", status)));
        }
        let doc: Value = resp
            .json()
            .await
            .map_err(|e| DebridError::api(NAME, format!("invalid response: {}", e)))?;

        if doc.get("status").and_then(Value::as_str) == Some("success") {
            return Ok(doc.get("data").cloned().unwrap_or(Value::Null));
        }
        Err(DebridError::api(NAME, error_message(&doc).unwrap_or_else(|| format!("HTTP {}", status))))
    }
}

fn error_message(v: &Value) -> Option<String> {
    let err = v.get("error")?;
    err.get("message")
        .and_then(Value::as_str)
        .or_else(|| err.get("code").and_then(Value::as_str))
        .or_else(|| err.as_str())
        .map(str::to_string)
}

/// Ids come back as numbers; accept strings too.
fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[async_trait]
impl DebridProvider for AllDebrid {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn submit(&self, magnet: &str) -> Result<String, DebridError> {
        let data = self.call("magnet/upload", &[("magnets[]", magnet)]).await?;
        let entry = data
            .get("magnets")
            .and_then(Value::as_array)
            .and_then(|m| m.first())
            .ok_or_else(|| DebridError::api(NAME, "upload response lists no magnets"))?;
        if let Some(message) = error_message(entry) {
            return Err(DebridError::SubmissionFailed { provider: NAME.to_string(), message });
        }
        entry
            .get("id")
            .and_then(id_string)
            .ok_or_else(|| DebridError::api(NAME, "upload response carries no id"))
    }

    async fn poll(&self, job_id: &str) -> Result<JobSnapshot, DebridError> {
        let data = self.call("magnet/status", &[("id", job_id)]).await?;
        // a single id gives an object; older deployments still wrap it in a list
        let magnet = match data.get("magnets") {
            Some(Value::Array(list)) => list.first().cloned().unwrap_or(Value::Null),
            Some(obj @ Value::Object(_)) => obj.clone(),
            _ => return Err(DebridError::api(NAME, "status response carries no magnet")),
        };

        let code = magnet.get("statusCode").and_then(Value::as_u64);
        let detail = magnet
            .get("status")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| code.map(|c| format!("status code {}", c)).unwrap_or_default());

        let files = magnet
            .get("links")
            .and_then(Value::as_array)
            .map(|links| {
                links
                    .iter()
                    .filter_map(|l| {
                        let link = l.get("link").and_then(Value::as_str)?;
                        Some(DebridFile {
                            name: l.get("filename").and_then(Value::as_str).unwrap_or(link).to_string(),
                            size: l.get("size").and_then(Value::as_u64),
                            link: link.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(JobSnapshot { status: code.map(map_status_code).unwrap_or(DebridStatus::Queued), detail, files })
    }

    async fn unlock(&self, link: &str) -> Result<String, DebridError> {
        let data = self.call("link/unlock", &[("link", link)]).await?;
        data.get("link")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| DebridError::NoPlayableLink { provider: NAME.to_string() })
    }
}

fn map_status_code(code: u64) -> DebridStatus {
    match code {
        0 => DebridStatus::Queued,
        1..=3 => DebridStatus::Downloading,
        4 => DebridStatus::Ready,
        8 => DebridStatus::Unsupported,
        5..=15 => DebridStatus::Error,
        _ => DebridStatus::Queued,
    }
}
