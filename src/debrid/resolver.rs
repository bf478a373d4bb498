use crate::core::error::{ConfigurationError, DebridError, PipelineError};
use crate::core::events::EngineEvent;
use crate::core::model::{DebridJob, DebridStatus, JobId, StreamCandidate};
use crate::debrid::all_debrid::AllDebrid;
use crate::debrid::real_debrid::RealDebrid;
use crate::debrid::{DebridConfig, DebridFile, DebridProvider, DebridService, PollPolicy};
use crate::http::HttpContext;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Turns a torrent candidate into a direct URL through a debrid service.
pub struct DebridResolver {
    client: reqwest::Client,
    ctx: HttpContext,
    event_tx: Option<broadcast::Sender<EngineEvent>>,
}

impl DebridResolver {
    pub fn new(client: reqwest::Client, ctx: HttpContext) -> Self {
        Self { client, ctx, event_tx: None }
    }

    pub fn with_events(mut self, event_tx: broadcast::Sender<EngineEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn provider_for(&self, config: &DebridConfig) -> Result<Box<dyn DebridProvider>, PipelineError> {
        if !config.is_configured() {
            return Err(ConfigurationError::DebridNotConfigured.into());
        }
        let key = config.api_key.trim();
        if key.is_empty() {
            return Err(ConfigurationError::MissingDebridKey(config.service.to_string()).into());
        }
        let base = config.base_url.as_deref();
        match config.service {
            DebridService::RealDebrid => Ok(Box::new(RealDebrid::new(self.client.clone(), self.ctx.clone(), key, base))),
            DebridService::AllDebrid => Ok(Box::new(AllDebrid::new(self.client.clone(), self.ctx.clone(), key, base))),
            DebridService::Premiumize => Err(DebridError::NotImplemented(config.service.to_string()).into()),
            DebridService::None => Err(ConfigurationError::DebridNotConfigured.into()),
        }
    }

    pub async fn resolve(&self, candidate: &StreamCandidate, config: &DebridConfig) -> Result<String, PipelineError> {
        if !candidate.is_torrent() {
            return Err(DebridError::NotTorrent.into());
        }
        let provider = self.provider_for(config)?;
        Ok(self.resolve_with(provider.as_ref(), candidate, config.poll_policy()).await?)
    }

    /// Submit, poll until ready within `policy`, then unlock the chosen file.
    pub async fn resolve_with(
        &self,
        provider: &dyn DebridProvider,
        candidate: &StreamCandidate,
        policy: PollPolicy,
    ) -> Result<String, DebridError> {
        if !candidate.is_torrent() {
            return Err(DebridError::NotTorrent);
        }
        let magnet = candidate.magnet_uri().ok_or(DebridError::NoMagnetAvailable)?;
        let name = provider.name();

        let provider_job_id = provider.submit(&magnet).await.map_err(|e| match e {
            DebridError::SubmissionFailed { .. } => e,
            other => DebridError::SubmissionFailed { provider: name.to_string(), message: other.to_string() },
        })?;

        let mut job = DebridJob::submitted(magnet, provider_job_id);
        info!(provider = name, job = %job.provider_job_id, "magnet submitted");
        self.emit_status(job.id, name, DebridStatus::Submitted, 0);

        let files = self.wait_until_ready(provider, &mut job, policy).await?;
        let file = pick_file(&files).ok_or_else(|| DebridError::NoPlayableLink { provider: name.to_string() })?;
        debug!(provider = name, file = %file.name, size = ?file.size, "unlocking file");

        let url = provider.unlock(&file.link).await?;
        job.complete(url.clone());
        Ok(url)
    }

    async fn wait_until_ready(
        &self,
        provider: &dyn DebridProvider,
        job: &mut DebridJob,
        policy: PollPolicy,
    ) -> Result<Vec<DebridFile>, DebridError> {
        let name = provider.name();
        for attempt in 1..=policy.max_attempts {
            if attempt > 1 {
                sleep(policy.interval).await;
            }

            let snapshot = match provider.poll(&job.provider_job_id).await {
                Ok(s) => s,
                Err(DebridError::Network { message, .. }) => {
                    warn!(provider = name, attempt, error = %message, "debrid status poll failed");
                    self.emit(EngineEvent::Error {
                        scope: "debrid".to_string(),
                        message: format!("{} status check #{} failed: {}", name, attempt, message),
                    });
                    continue;
                }
                Err(e) => return Err(e),
            };

            if job.transition(snapshot.status) {
                info!(provider = name, attempt, status = %snapshot.status, detail = %snapshot.detail, "debrid job status");
                self.emit_status(job.id, name, snapshot.status, attempt);
            }

            match snapshot.status {
                DebridStatus::Ready => return Ok(snapshot.files),
                DebridStatus::Error => {
                    return Err(DebridError::JobFailed { provider: name.to_string(), status: snapshot.detail })
                }
                DebridStatus::Unsupported => {
                    return Err(DebridError::Unsupported { provider: name.to_string(), reason: snapshot.detail })
                }
                DebridStatus::Submitted | DebridStatus::Queued | DebridStatus::Downloading => {}
            }
        }
        Err(DebridError::Timeout { provider: name.to_string(), attempts: policy.max_attempts })
    }

    fn emit_status(&self, job_id: JobId, provider: &str, status: DebridStatus, attempt: u32) {
        self.emit(EngineEvent::DebridStatusChanged { job_id, provider: provider.to_string(), status, attempt });
    }

    fn emit(&self, evt: EngineEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(evt);
        }
    }
}

/// The largest file, or the first listed when sizes are unknown. Ties keep list order.
fn pick_file(files: &[DebridFile]) -> Option<&DebridFile> {
    files
        .iter()
        .filter(|f| !f.link.trim().is_empty())
        .fold(None, |best: Option<&DebridFile>, f| match best {
            Some(b) if f.size.unwrap_or(0) <= b.size.unwrap_or(0) => Some(b),
            _ => Some(f),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Quality, StreamPayload};
    use crate::debrid::JobSnapshot;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedProvider {
        polls: Mutex<VecDeque<Result<JobSnapshot, DebridError>>>,
        poll_count: Mutex<u32>,
        submitted: Mutex<Vec<String>>,
        fail_submit: bool,
    }

    impl ScriptedProvider {
        fn new(polls: Vec<Result<JobSnapshot, DebridError>>) -> Self {
            Self {
                polls: Mutex::new(polls.into()),
                poll_count: Mutex::new(0),
                submitted: Mutex::new(Vec::new()),
                fail_submit: false,
            }
        }

        fn polls(&self) -> u32 {
            *self.poll_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl DebridProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "Scripted"
        }

        async fn submit(&self, magnet: &str) -> Result<String, DebridError> {
            if self.fail_submit {
                return Err(DebridError::api("Scripted", "invalid magnet"));
            }
            self.submitted.lock().unwrap().push(magnet.to_string());
            Ok("job-1".to_string())
        }

        async fn poll(&self, job_id: &str) -> Result<JobSnapshot, DebridError> {
            assert_eq!(job_id, "job-1");
            *self.poll_count.lock().unwrap() += 1;
            self.polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(snapshot(DebridStatus::Downloading, vec![])))
        }

        async fn unlock(&self, link: &str) -> Result<String, DebridError> {
            Ok(format!("https://direct.example/{}", link))
        }
    }

    fn snapshot(status: DebridStatus, files: Vec<DebridFile>) -> JobSnapshot {
        JobSnapshot { status, detail: status.to_string(), files }
    }

    fn file(link: &str, size: Option<u64>) -> DebridFile {
        DebridFile { name: link.to_string(), size, link: link.to_string() }
    }

    fn torrent(payload: StreamPayload) -> StreamCandidate {
        StreamCandidate {
            title: "Sintel".to_string(),
            quality: Quality::FullHd1080,
            size_label: String::new(),
            seeds: Some(10),
            source_addon_id: "x".to_string(),
            source_addon_name: "X".to_string(),
            payload,
        }
    }

    fn magnet() -> StreamCandidate {
        torrent(StreamPayload::TorrentMagnet { magnet: "magnet:?xt=urn:btih:abc".to_string() })
    }

    fn policy(max_attempts: u32) -> PollPolicy {
        PollPolicy { interval: Duration::from_secs(2), max_attempts }
    }

    fn resolver() -> DebridResolver {
        DebridResolver::new(reqwest::Client::new(), HttpContext::default())
    }

    #[tokio::test(start_paused = true)]
    async fn queued_downloading_ready_yields_unlocked_url() {
        let provider = ScriptedProvider::new(vec![
            Ok(snapshot(DebridStatus::Queued, vec![])),
            Ok(snapshot(DebridStatus::Downloading, vec![])),
            Ok(snapshot(DebridStatus::Ready, vec![file("small", Some(10)), file("big", Some(900))])),
        ]);
        let (tx, mut rx) = broadcast::channel(16);
        let resolver = resolver().with_events(tx);

        let url = resolver.resolve_with(&provider, &magnet(), policy(30)).await.unwrap();
        assert_eq!(url, "https://direct.example/big");
        assert_eq!(provider.polls(), 3);

        let mut seen = Vec::new();
        while let Ok(EngineEvent::DebridStatusChanged { status, .. }) = rx.try_recv() {
            seen.push(status);
        }
        assert_eq!(
            seen,
            vec![DebridStatus::Submitted, DebridStatus::Queued, DebridStatus::Downloading, DebridStatus::Ready]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn never_ready_times_out_at_the_ceiling() {
        let provider = ScriptedProvider::new(vec![]);
        let err = resolver().resolve_with(&provider, &magnet(), policy(5)).await.unwrap_err();
        assert!(matches!(err, DebridError::Timeout { attempts: 5, .. }));
        assert_eq!(provider.polls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_count_toward_the_budget() {
        let provider = ScriptedProvider::new(vec![
            Err(DebridError::network("Scripted", "connection reset")),
            Err(DebridError::network("Scripted", "connection reset")),
            Ok(snapshot(DebridStatus::Ready, vec![file("a", None)])),
        ]);
        let url = resolver().resolve_with(&provider, &magnet(), policy(3)).await.unwrap();
        assert_eq!(url, "https://direct.example/a");

        let provider = ScriptedProvider::new(vec![
            Err(DebridError::network("Scripted", "reset")),
            Err(DebridError::network("Scripted", "reset")),
            Err(DebridError::network("Scripted", "reset")),
        ]);
        let err = resolver().resolve_with(&provider, &magnet(), policy(3)).await.unwrap_err();
        assert!(matches!(err, DebridError::Timeout { attempts: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_are_broadcast() {
        let provider = ScriptedProvider::new(vec![
            Err(DebridError::network("Scripted", "connection reset")),
            Ok(snapshot(DebridStatus::Ready, vec![file("a", None)])),
        ]);
        let (tx, mut rx) = broadcast::channel(16);
        resolver().with_events(tx).resolve_with(&provider, &magnet(), policy(3)).await.unwrap();

        let mut errors = Vec::new();
        while let Ok(evt) = rx.try_recv() {
            if let EngineEvent::Error { scope, message } = evt {
                errors.push((scope, message));
            }
        }
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "debrid");
        assert!(errors[0].1.contains("#1") && errors[0].1.contains("connection reset"));
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_provider_states_fail_immediately() {
        let provider = ScriptedProvider::new(vec![Ok(JobSnapshot {
            status: DebridStatus::Error,
            detail: "virus".to_string(),
            files: vec![],
        })]);
        let err = resolver().resolve_with(&provider, &magnet(), policy(30)).await.unwrap_err();
        assert!(matches!(err, DebridError::JobFailed { ref status, .. } if status == "virus"));
        assert_eq!(provider.polls(), 1);

        let provider = ScriptedProvider::new(vec![Ok(snapshot(DebridStatus::Unsupported, vec![]))]);
        let err = resolver().resolve_with(&provider, &magnet(), policy(30)).await.unwrap_err();
        assert!(matches!(err, DebridError::Unsupported { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_without_files_has_no_playable_link() {
        let provider = ScriptedProvider::new(vec![Ok(snapshot(DebridStatus::Ready, vec![file("", Some(5))]))]);
        let err = resolver().resolve_with(&provider, &magnet(), policy(30)).await.unwrap_err();
        assert!(matches!(err, DebridError::NoPlayableLink { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn info_hashes_are_submitted_as_magnets() {
        let provider = ScriptedProvider::new(vec![Ok(snapshot(DebridStatus::Ready, vec![file("a", None)]))]);
        let candidate = torrent(StreamPayload::TorrentInfoHash { info_hash: "ABC".to_string(), file_idx: Some(1) });
        resolver().resolve_with(&provider, &candidate, policy(30)).await.unwrap();
        assert_eq!(
            provider.submitted.lock().unwrap().as_slice(),
            ["magnet:?xt=urn:btih:abc&dn=Sintel".to_string()]
        );
    }

    #[tokio::test]
    async fn unusable_candidates_are_rejected_before_submission() {
        let provider = ScriptedProvider::new(vec![]);
        let direct = torrent(StreamPayload::DirectHttp { url: "https://a/1".to_string() });
        let err = resolver().resolve_with(&provider, &direct, policy(3)).await.unwrap_err();
        assert!(matches!(err, DebridError::NotTorrent));

        let empty = torrent(StreamPayload::TorrentInfoHash { info_hash: " ".to_string(), file_idx: None });
        let err = resolver().resolve_with(&provider, &empty, policy(3)).await.unwrap_err();
        assert!(matches!(err, DebridError::NoMagnetAvailable));
        assert!(provider.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn submission_errors_are_reported_as_such() {
        let mut provider = ScriptedProvider::new(vec![]);
        provider.fail_submit = true;
        let err = resolver().resolve_with(&provider, &magnet(), policy(3)).await.unwrap_err();
        assert!(matches!(err, DebridError::SubmissionFailed { ref message, .. } if message.contains("invalid magnet")));
        assert_eq!(provider.polls(), 0);
    }

    #[test]
    fn provider_selection_reports_configuration_problems() {
        let r = resolver();
        let err = r.provider_for(&DebridConfig::default()).err().unwrap();
        assert!(matches!(err, PipelineError::Configuration(ConfigurationError::DebridNotConfigured)));

        let cfg = DebridConfig { service: DebridService::RealDebrid, ..DebridConfig::default() };
        let err = r.provider_for(&cfg).err().unwrap();
        assert!(matches!(err, PipelineError::Configuration(ConfigurationError::MissingDebridKey(_))));

        let cfg = DebridConfig {
            service: DebridService::Premiumize,
            api_key: "k".to_string(),
            ..DebridConfig::default()
        };
        let err = r.provider_for(&cfg).err().unwrap();
        assert!(matches!(err, PipelineError::Debrid(DebridError::NotImplemented(_))));

        let cfg = DebridConfig {
            service: DebridService::AllDebrid,
            api_key: "k".to_string(),
            ..DebridConfig::default()
        };
        assert_eq!(r.provider_for(&cfg).unwrap().name(), "AllDebrid");
    }

    #[test]
    fn largest_file_wins_and_ties_keep_order() {
        let files = vec![file("a", Some(5)), file("b", Some(9)), file("c", Some(9))];
        assert_eq!(pick_file(&files).unwrap().link, "b");

        let files = vec![file("a", None), file("b", None)];
        assert_eq!(pick_file(&files).unwrap().link, "a");

        assert!(pick_file(&[]).is_none());
    }
}
