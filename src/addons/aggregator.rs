use crate::addons::id_format::format_id;
use crate::addons::normalize::{rank, to_candidate, StreamResponse};
use crate::addons::url_builder::build_request;
use crate::core::error::ConfigurationError;
use crate::core::events::EngineEvent;
use crate::core::model::{AddonDescriptor, ContentType, Resource, StreamCandidate};
use crate::http::{self, HttpContext};
use futures::future::join_all;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// What one addon contributed to an aggregation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddonOutcome {
    Streams { addon_id: String, candidates: usize },
    Skipped { addon_id: String, reason: String },
    Failed { addon_id: String, error: String },
}

impl AddonOutcome {
    pub fn addon_id(&self) -> &str {
        match self {
            Self::Streams { addon_id, .. } | Self::Skipped { addon_id, .. } | Self::Failed { addon_id, .. } => {
                addon_id
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamReport {
    pub candidates: Vec<StreamCandidate>,
    pub outcomes: Vec<AddonOutcome>,
}

impl StreamReport {
    /// True when some addon errored out, so a retry may find more.
    pub fn is_partial(&self) -> bool {
        self.outcomes.iter().any(|o| matches!(o, AddonOutcome::Failed { .. }))
    }
}

pub struct StreamAggregator {
    client: reqwest::Client,
    ctx: HttpContext,
    event_tx: Option<broadcast::Sender<EngineEvent>>,
}

impl StreamAggregator {
    pub fn new(client: reqwest::Client, ctx: HttpContext) -> Self {
        Self { client, ctx, event_tx: None }
    }

    pub fn with_events(mut self, event_tx: broadcast::Sender<EngineEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Queries every stream-capable addon concurrently and ranks the merged result.
    ///
    /// Per-addon failures never surface as errors; they show up in
    /// `StreamReport::outcomes`. Only an unusable addon set is an error.
    pub async fn fetch_streams(
        &self,
        addons: &[AddonDescriptor],
        canonical_id: &str,
        content_type: ContentType,
    ) -> Result<StreamReport, ConfigurationError> {
        if addons.is_empty() {
            return Err(ConfigurationError::NoAddons);
        }
        let selected: Vec<&AddonDescriptor> = addons.iter().filter(|a| a.serves_streams()).collect();
        if selected.is_empty() {
            return Err(ConfigurationError::NoStreamingAddons);
        }

        let results = join_all(
            selected
                .iter()
                .map(|addon| self.query_addon(addon, canonical_id, content_type)),
        )
        .await;

        let mut report = StreamReport::default();
        for (outcome, candidates) in results {
            report.candidates.extend(candidates);
            report.outcomes.push(outcome);
        }
        rank(&mut report.candidates);
        Ok(report)
    }

    async fn query_addon(
        &self,
        addon: &AddonDescriptor,
        canonical_id: &str,
        content_type: ContentType,
    ) -> (AddonOutcome, Vec<StreamCandidate>) {
        let formatted = match format_id(addon, canonical_id) {
            Ok(id) => id,
            Err(e) => {
                debug!(addon = %addon.id, error = %e, "skipping addon");
                self.emit(EngineEvent::AddonSkipped { addon_id: addon.id.clone(), reason: e.to_string() });
                return (AddonOutcome::Skipped { addon_id: addon.id.clone(), reason: e.to_string() }, vec![]);
            }
        };

        let req = build_request(addon, Resource::Stream, content_type, &formatted);
        let shown_url = redact(&req.url);
        debug!(addon = %addon.id, url = %shown_url, "requesting streams");
        self.emit(EngineEvent::AddonQueried { addon_id: addon.id.clone(), url: shown_url.to_string() });

        let result = match self.ctx.json_headers(&req.headers) {
            Ok(headers) => {
                let timeout = Duration::from_secs(self.ctx.stream_timeout_secs);
                http::get_json(&self.client, &self.ctx, &req.url, headers, timeout, 0)
                    .await
                    .map_err(|e| e.to_string())
            }
            Err(e) => Err(e.to_string()),
        };

        let shape = result.and_then(|doc| {
            StreamResponse::classify(doc).ok_or_else(|| "unexpected stream response shape".to_string())
        });

        match shape {
            Ok(shape) => {
                let candidates: Vec<StreamCandidate> = shape
                    .into_entries()
                    .into_iter()
                    .filter_map(|entry| to_candidate(entry, &addon.id, &addon.name))
                    .collect();
                debug!(addon = %addon.id, count = candidates.len(), "addon answered");
                self.emit(EngineEvent::AddonFinished { addon_id: addon.id.clone(), candidates: candidates.len() });
                (AddonOutcome::Streams { addon_id: addon.id.clone(), candidates: candidates.len() }, candidates)
            }
            Err(error) => {
                warn!(addon = %addon.id, url = %shown_url, error = %error, "addon stream request failed");
                self.emit(EngineEvent::AddonFailed { addon_id: addon.id.clone(), message: error.clone() });
                (AddonOutcome::Failed { addon_id: addon.id.clone(), error }, vec![])
            }
        }
    }

    fn emit(&self, evt: EngineEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(evt);
        }
    }
}

/// Drops the query string so credentials never reach logs or events.
fn redact(url: &str) -> &str {
    url.split_once('?').map(|(head, _)| head).unwrap_or(url)
}
