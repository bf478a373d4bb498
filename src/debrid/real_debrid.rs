use crate::core::error::DebridError;
use crate::core::model::DebridStatus;
use crate::debrid::{DebridFile, DebridProvider, JobSnapshot};
use crate::http::HttpContext;
use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::RequestBuilder;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

pub const REAL_DEBRID_API: &str = "https://api.real-debrid.com/rest/1.0";
const NAME: &str = "Real-Debrid";

/// Real-Debrid REST client. Authenticates with a bearer token.
pub struct RealDebrid {
    client: reqwest::Client,
    ctx: HttpContext,
    token: String,
    base: String,
}

impl RealDebrid {
    pub fn new(client: reqwest::Client, ctx: HttpContext, token: &str, base: Option<&str>) -> Self {
        Self {
            client,
            ctx,
            token: token.to_string(),
            base: base.unwrap_or(REAL_DEBRID_API).trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }

    async fn send(&self, req: RequestBuilder) -> Result<Value, DebridError> {
        let resp = req
            .bearer_auth(&self.token)
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
        let body = resp.bytes().await.map_err(|e| DebridError::network(NAME, e))?;
        let doc: Value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).map_err(|e| DebridError::api(NAME, format!("invalid JSON: {}", e)))?
        };

        // errors arrive as {"error": "...", "error_code": N}, sometimes with a 2xx status
        if let Some(message) = doc.get("error").and_then(Value::as_str) {
            return Err(DebridError::api(NAME, message));
        }
        if !status.is_success() {
            return Err(DebridError::api(NAME, format!("HTTP {}", status)));
        }
        Ok(doc)
    }

    async fn select_all(&self, id: &str) -> Result<(), DebridError> {
        self.send(
            self.client
                .post(self.url(&format!("torrents/selectFiles/{}", id)))
                .form(&[("files", "all")]),
        )
        .await
        .map(drop)
    }
}

#[async_trait]
impl DebridProvider for RealDebrid {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn submit(&self, magnet: &str) -> Result<String, DebridError> {
        let added = self
            .send(self.client.post(self.url("torrents/addMagnet")).form(&[("magnet", magnet)]))
            .await?;
        let id = added
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DebridError::api(NAME, "addMagnet response carries no id"))?
            .to_string();

        // conversion may still be running; `poll` selects again once it asks for files
        if let Err(e) = self.select_all(&id).await {
            debug!(job = %id, error = %e, "early file selection deferred");
        }
        Ok(id)
    }

    async fn poll(&self, job_id: &str) -> Result<JobSnapshot, DebridError> {
        let info = self
            .send(self.client.get(self.url(&format!("torrents/info/{}", job_id))))
            .await?;
        let detail = info.get("status").and_then(Value::as_str).unwrap_or_default().to_string();
        if detail == "waiting_files_selection" {
            if let Err(e) = self.select_all(job_id).await {
                warn!(job = %job_id, error = %e, "file selection failed, retrying on next poll");
            }
        }
        Ok(JobSnapshot { status: map_status(&detail), files: files_of(&info), detail })
    }

    async fn unlock(&self, link: &str) -> Result<String, DebridError> {
        let unrestricted = self
            .send(self.client.post(self.url("unrestrict/link")).form(&[("link", link)]))
            .await?;
        unrestricted
            .get("download")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| DebridError::NoPlayableLink { provider: NAME.to_string() })
    }
}

fn map_status(status: &str) -> DebridStatus {
    match status {
        "downloaded" => DebridStatus::Ready,
        "downloading" | "compressing" | "uploading" => DebridStatus::Downloading,
        "magnet_error" => DebridStatus::Unsupported,
        "error" | "virus" | "dead" => DebridStatus::Error,
        _ => DebridStatus::Queued,
    }
}

/// `links` lines up with the selected entries of `files`; fall back to bare links otherwise.
fn files_of(info: &Value) -> Vec<DebridFile> {
    let links: Vec<&str> = info
        .get("links")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let all_files: Vec<&Value> = info
        .get("files")
        .and_then(Value::as_array)
        .map(|a| a.iter().collect())
        .unwrap_or_default();
    let selected: Vec<&Value> = all_files
        .iter()
        .copied()
        .filter(|f| f.get("selected").and_then(Value::as_u64) == Some(1))
        .collect();
    let files = if selected.is_empty() { all_files } else { selected };

    if files.len() == links.len() {
        files
            .iter()
            .zip(links.iter().copied())
            .map(|(f, link)| DebridFile {
                name: f
                    .get("path")
                    .and_then(Value::as_str)
                    .unwrap_or(link)
                    .trim_start_matches('/')
                    .to_string(),
                size: f.get("bytes").and_then(Value::as_u64),
                link: link.to_string(),
            })
            .collect()
    } else {
        links
            .iter()
            .map(|link| DebridFile { name: link.to_string(), size: None, link: link.to_string() })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Quality, StreamCandidate, StreamPayload};
    use crate::debrid::{DebridConfig, DebridResolver, DebridService};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> RealDebrid {
        RealDebrid::new(reqwest::Client::new(), HttpContext::default(), "tok", Some(&server.uri()))
    }

    async fn mount_happy_path(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/torrents/addMagnet"))
            .and(header("authorization", "Bearer tok"))
            .and(body_string_contains("magnet=magnet%3A%3Fxt%3Durn%3Abtih%3Aabc"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "RD1", "uri": "x"})))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/torrents/selectFiles/RD1"))
            .and(body_string_contains("files=all"))
            .respond_with(ResponseTemplate::new(204))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/torrents/info/RD1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "RD1",
                "status": "downloading",
                "files": [],
                "links": []
            })))
            .up_to_n_times(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/torrents/info/RD1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "RD1",
                "status": "downloaded",
                "files": [
                    {"id": 1, "path": "/Sample.mkv", "bytes": 1000, "selected": 1},
                    {"id": 2, "path": "/readme.txt", "bytes": 10, "selected": 0},
                    {"id": 3, "path": "/Movie.mkv", "bytes": 900000, "selected": 1}
                ],
                "links": ["https://real-debrid.com/d/SAMPLE", "https://real-debrid.com/d/MOVIE"]
            })))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/unrestrict/link"))
            .and(body_string_contains("MOVIE"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"download": "https://cdn.example/Movie.mkv"})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn resolves_a_magnet_end_to_end() {
        let server = MockServer::start().await;
        mount_happy_path(&server).await;

        let cfg = DebridConfig {
            service: DebridService::RealDebrid,
            api_key: "tok".to_string(),
            poll_interval_ms: 10,
            max_attempts: 5,
            base_url: Some(server.uri()),
        };
        let candidate = StreamCandidate {
            title: "Movie".to_string(),
            quality: Quality::FullHd1080,
            size_label: String::new(),
            seeds: None,
            source_addon_id: "x".to_string(),
            source_addon_name: "X".to_string(),
            payload: StreamPayload::TorrentMagnet { magnet: "magnet:?xt=urn:btih:abc".to_string() },
        };
        let resolver = DebridResolver::new(reqwest::Client::new(), HttpContext::default());
        let url = resolver.resolve(&candidate, &cfg).await.unwrap();
        assert_eq!(url, "https://cdn.example/Movie.mkv");
    }

    fn fast_config(server: &MockServer) -> DebridConfig {
        DebridConfig {
            service: DebridService::RealDebrid,
            api_key: "tok".to_string(),
            poll_interval_ms: 10,
            max_attempts: 5,
            base_url: Some(server.uri()),
        }
    }

    fn movie() -> StreamCandidate {
        StreamCandidate {
            title: "Movie".to_string(),
            quality: Quality::FullHd1080,
            size_label: String::new(),
            seeds: None,
            source_addon_id: "x".to_string(),
            source_addon_name: "X".to_string(),
            payload: StreamPayload::TorrentMagnet { magnet: "magnet:?xt=urn:btih:abc".to_string() },
        }
    }

    async fn mount_add_and_unrestrict(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/torrents/addMagnet"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "RD1"})))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/unrestrict/link"))
            .and(body_string_contains("MOVIE"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"download": "https://cdn.example/Movie.mkv"})),
            )
            .mount(server)
            .await;
    }

    fn downloaded() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "id": "RD1",
            "status": "downloaded",
            "files": [{"id": 1, "path": "/Movie.mkv", "bytes": 900000, "selected": 1}],
            "links": ["https://real-debrid.com/d/MOVIE"]
        }))
    }

    #[tokio::test]
    async fn rate_limited_status_checks_keep_polling() {
        let server = MockServer::start().await;
        mount_add_and_unrestrict(&server).await;
        Mock::given(method("POST"))
            .and(path("/torrents/selectFiles/RD1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/torrents/info/RD1"))
            .respond_with(
                ResponseTemplate::new(429).set_body_json(json!({"error": "too_many_requests", "error_code": 34})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/torrents/info/RD1"))
            .respond_with(downloaded())
            .mount(&server)
            .await;

        let resolver = DebridResolver::new(reqwest::Client::new(), HttpContext::default());
        let url = resolver.resolve(&movie(), &fast_config(&server)).await.unwrap();
        assert_eq!(url, "https://cdn.example/Movie.mkv");
    }

    #[tokio::test]
    async fn files_are_selected_once_conversion_finishes() {
        let server = MockServer::start().await;
        mount_add_and_unrestrict(&server).await;
        // the call right after addMagnet lands before conversion is done
        Mock::given(method("POST"))
            .and(path("/torrents/selectFiles/RD1"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/torrents/selectFiles/RD1"))
            .and(body_string_contains("files=all"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/torrents/info/RD1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "RD1",
                "status": "waiting_files_selection",
                "files": [{"id": 1, "path": "/Movie.mkv", "bytes": 900000, "selected": 0}],
                "links": []
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/torrents/info/RD1"))
            .respond_with(downloaded())
            .mount(&server)
            .await;

        let resolver = DebridResolver::new(reqwest::Client::new(), HttpContext::default());
        let url = resolver.resolve(&movie(), &fast_config(&server)).await.unwrap();
        assert_eq!(url, "https://cdn.example/Movie.mkv");
    }

    #[tokio::test]
    async fn embedded_errors_fail_submission() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/torrents/addMagnet"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"error": "bad_token", "error_code": 8})),
            )
            .mount(&server)
            .await;

        let err = provider(&server).submit("magnet:?xt=urn:btih:abc").await.unwrap_err();
        assert!(matches!(err, DebridError::Api { ref message, .. } if message == "bad_token"));
    }

    #[tokio::test]
    async fn server_errors_are_transport_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = provider(&server).poll("RD1").await.unwrap_err();
        assert!(matches!(err, DebridError::Network { .. }));
    }

    #[test]
    fn statuses_map_onto_the_job_state_machine() {
        assert_eq!(map_status("downloaded"), DebridStatus::Ready);
        assert_eq!(map_status("magnet_conversion"), DebridStatus::Queued);
        assert_eq!(map_status("waiting_files_selection"), DebridStatus::Queued);
        assert_eq!(map_status("queued"), DebridStatus::Queued);
        assert_eq!(map_status("compressing"), DebridStatus::Downloading);
        assert_eq!(map_status("magnet_error"), DebridStatus::Unsupported);
        assert_eq!(map_status("virus"), DebridStatus::Error);
        assert_eq!(map_status("something_new"), DebridStatus::Queued);
    }

    #[test]
    fn mismatched_links_fall_back_to_bare_links() {
        let info = json!({
            "files": [{"path": "/a", "bytes": 1, "selected": 1}],
            "links": ["https://x/1", "https://x/2"]
        });
        let files = files_of(&info);
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.size.is_none()));
    }
}
