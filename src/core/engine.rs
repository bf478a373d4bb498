use crate::addons::aggregator::{StreamAggregator, StreamReport};
use crate::addons::manifest::ManifestIngester;
use crate::addons::registry::AddonRegistry;
use crate::core::cache::TtlCache;
use crate::core::error::{PipelineError, StoreError};
use crate::core::events::EngineEvent;
use crate::core::model::{AddonAuth, AddonCapabilities, AddonDescriptor, ContentType, StreamCandidate, StreamPayload};
use crate::core::store::{KeyValueStore, SqliteStore};
use crate::debrid::{DebridConfig, DebridResolver, DEBRID_CONFIG_KEY};
use crate::http::{self, HttpContext};
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::Duration;
use tracing::info;

pub const STORE_FILE: &str = "streams.sqlite";

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub http: HttpContext,
    /// Lifetime of cached stream results. Zero disables the cache.
    pub cache_ttl: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { http: HttpContext::default(), cache_ttl: Duration::from_secs(300) }
    }
}

/// Result of probing a manifest without registering it.
#[derive(Debug, Clone)]
pub struct AddonProbe {
    pub descriptor: AddonDescriptor,
    pub capabilities: AddonCapabilities,
    pub problems: Vec<String>,
}

/// The pipeline facade a front end talks to.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<AddonRegistry>,
    store: Arc<dyn KeyValueStore>,
    ingester: Arc<ManifestIngester>,
    aggregator: Arc<StreamAggregator>,
    resolver: Arc<DebridResolver>,
    stream_cache: Arc<TtlCache<(String, ContentType), StreamReport>>,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl Engine {
    /// Opens (or creates) the SQLite store under `data_dir`.
    pub async fn open(data_dir: &Path, opts: EngineOptions) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .with_context(|| format!("create data dir {}", data_dir.display()))?;

        let store = SqliteStore::open(&data_dir.join(STORE_FILE)).await?;
        Self::with_store(Arc::new(store), opts)
    }

    pub fn with_store(store: Arc<dyn KeyValueStore>, opts: EngineOptions) -> anyhow::Result<Self> {
        let (event_tx, _) = broadcast::channel(256);
        let client = http::build_client().context("build http client")?;

        Ok(Self {
            registry: Arc::new(AddonRegistry::new(store.clone())),
            store,
            ingester: Arc::new(ManifestIngester::new(client.clone(), opts.http.clone())),
            aggregator: Arc::new(
                StreamAggregator::new(client.clone(), opts.http.clone()).with_events(event_tx.clone()),
            ),
            resolver: Arc::new(DebridResolver::new(client, opts.http).with_events(event_tx.clone())),
            stream_cache: Arc::new(TtlCache::new(opts.cache_ttl)),
            event_tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    pub async fn list_addons(&self) -> Result<Vec<AddonDescriptor>, PipelineError> {
        Ok(self.registry.list().await?)
    }

    /// Fetches the manifest and registers or refreshes the addon.
    ///
    /// Without `auth`, credentials and the original `date_added` of an already
    /// registered addon are carried over.
    pub async fn add_or_update_addon(
        &self,
        manifest_url: &str,
        auth: Option<AddonAuth>,
    ) -> Result<AddonDescriptor, PipelineError> {
        let mut descriptor = self.ingester.ingest(manifest_url).await?;
        if let Some(existing) = self.registry.get(&descriptor.id).await? {
            descriptor.date_added = existing.date_added;
            if auth.is_none() {
                descriptor.auth = existing.auth;
            }
        }
        if auth.is_some() {
            descriptor.auth = auth;
        }

        self.registry.upsert(descriptor.clone()).await?;
        self.stream_cache.clear().await;
        self.info("addons", format!("registered {} ({})", descriptor.name, descriptor.id));
        Ok(descriptor)
    }

    pub async fn remove_addon(&self, id: &str) -> Result<bool, PipelineError> {
        let removed = self.registry.remove(id).await?;
        if removed {
            self.stream_cache.clear().await;
            self.info("addons", format!("removed {}", id));
        }
        Ok(removed)
    }

    /// Connectivity and shape check for a manifest. Nothing is persisted.
    pub async fn test_addon(&self, manifest_url: &str) -> Result<AddonProbe, PipelineError> {
        let descriptor = self.ingester.ingest(manifest_url).await?;
        Ok(AddonProbe {
            capabilities: descriptor.capabilities(),
            problems: descriptor.validate(),
            descriptor,
        })
    }

    pub async fn fetch_streams(
        &self,
        canonical_id: &str,
        content_type: ContentType,
    ) -> Result<StreamReport, PipelineError> {
        let key = (canonical_id.trim().to_string(), content_type);
        if let Some(hit) = self.stream_cache.get(&key).await {
            info!(id = %key.0, content_type = %content_type, "serving streams from cache");
            return Ok(hit);
        }

        let addons = self.registry.list().await?;
        let report = self.aggregator.fetch_streams(&addons, &key.0, content_type).await?;
        if !report.candidates.is_empty() && !report.is_partial() {
            self.stream_cache.insert(key, report.clone()).await;
        }
        Ok(report)
    }

    /// Direct streams play as-is; torrents go through the configured debrid service.
    pub async fn resolve_to_playable_url(
        &self,
        candidate: &StreamCandidate,
        config: &DebridConfig,
    ) -> Result<String, PipelineError> {
        if let StreamPayload::DirectHttp { url } = &candidate.payload {
            return Ok(url.clone());
        }
        self.resolver.resolve(candidate, config).await
    }

    pub async fn load_debrid_config(&self) -> Result<DebridConfig, PipelineError> {
        match self.store.get(DEBRID_CONFIG_KEY).await? {
            None => Ok(DebridConfig::default()),
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|source| StoreError::Corrupt { key: DEBRID_CONFIG_KEY.to_string(), source }.into()),
        }
    }

    pub async fn save_debrid_config(&self, config: &DebridConfig) -> Result<(), PipelineError> {
        let raw = serde_json::to_string(config).map_err(StoreError::from)?;
        self.store.set(DEBRID_CONFIG_KEY, &raw).await?;
        info!(service = %config.service, "debrid configuration saved");
        Ok(())
    }

    fn info(&self, scope: &str, message: String) {
        info!(scope, "{}", message);
        let _ = self.event_tx.send(EngineEvent::Info { scope: scope.to_string(), message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ConfigurationError;
    use crate::core::model::{AuthKind, Quality};
    use crate::core::store::MemoryStore;
    use crate::debrid::DebridService;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn engine() -> Engine {
        Engine::with_store(Arc::new(MemoryStore::new()), EngineOptions::default()).unwrap()
    }

    async fn serve_manifest(server: &MockServer) -> String {
        Mock::given(method("GET"))
            .and(path("/addon/manifest.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "org.example.streams",
                "name": "Example Streams",
                "version": "1.2.0",
                "resources": ["stream"],
                "types": ["movie"],
                "idPrefixes": ["tt"]
            })))
            .mount(server)
            .await;
        format!("{}/addon", server.uri())
    }

    #[tokio::test]
    async fn registered_addon_serves_ranked_streams() {
        let server = MockServer::start().await;
        let url = serve_manifest(&server).await;
        Mock::given(method("GET"))
            .and(path("/addon/stream/movie/tt0111161.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"streams": [
                {"url": "http://x/a", "title": "Foo 1080p"}
            ]})))
            .mount(&server)
            .await;

        let engine = engine();
        let added = engine.add_or_update_addon(&url, None).await.unwrap();
        assert_eq!(added.manifest_url, format!("{}/manifest.json", url));

        let report = engine.fetch_streams("tt0111161", ContentType::Movie).await.unwrap();
        assert_eq!(report.candidates.len(), 1);
        let c = &report.candidates[0];
        assert_eq!(c.quality, Quality::FullHd1080);
        assert_eq!(c.payload, StreamPayload::DirectHttp { url: "http://x/a".to_string() });
        assert_eq!(c.source_addon_id, "org.example.streams");
    }

    #[tokio::test]
    async fn cached_results_are_dropped_when_addons_change() {
        let server = MockServer::start().await;
        let url = serve_manifest(&server).await;
        Mock::given(method("GET"))
            .and(path("/addon/stream/movie/tt1.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"url": "http://x/a"}])))
            .expect(2)
            .mount(&server)
            .await;

        let engine = engine();
        engine.add_or_update_addon(&url, None).await.unwrap();
        engine.fetch_streams("tt1", ContentType::Movie).await.unwrap();
        engine.fetch_streams("tt1", ContentType::Movie).await.unwrap();

        assert!(!engine.remove_addon("not-registered").await.unwrap());
        engine.fetch_streams("tt1", ContentType::Movie).await.unwrap();

        engine.add_or_update_addon(&url, None).await.unwrap();
        engine.fetch_streams("tt1", ContentType::Movie).await.unwrap();
    }

    #[tokio::test]
    async fn reports_with_failed_addons_are_not_cached() {
        let good = MockServer::start().await;
        let good_url = serve_manifest(&good).await;
        Mock::given(method("GET"))
            .and(path("/addon/stream/movie/tt1.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"url": "http://x/a"}])))
            .expect(2)
            .mount(&good)
            .await;

        let flaky = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/manifest.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "org.example.flaky",
                "name": "Flaky",
                "version": "0.1.0",
                "resources": ["stream"],
                "types": ["movie"],
                "idPrefixes": ["tt"]
            })))
            .mount(&flaky)
            .await;
        Mock::given(method("GET"))
            .and(path("/stream/movie/tt1.json"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&flaky)
            .await;

        let engine = engine();
        engine.add_or_update_addon(&good_url, None).await.unwrap();
        engine.add_or_update_addon(&flaky.uri(), None).await.unwrap();

        let first = engine.fetch_streams("tt1", ContentType::Movie).await.unwrap();
        assert!(first.is_partial());
        assert_eq!(first.candidates.len(), 1);
        engine.fetch_streams("tt1", ContentType::Movie).await.unwrap();
    }

    #[tokio::test]
    async fn refresh_keeps_credentials_unless_replaced() {
        let server = MockServer::start().await;
        let url = serve_manifest(&server).await;
        let engine = engine();

        let auth = AddonAuth { kind: AuthKind::HeaderBearer, key: "k1".to_string() };
        let first = engine.add_or_update_addon(&url, Some(auth.clone())).await.unwrap();
        let refreshed = engine.add_or_update_addon(&url, None).await.unwrap();
        assert_eq!(refreshed.auth, Some(auth));
        assert_eq!(refreshed.date_added, first.date_added);

        let replaced = AddonAuth { kind: AuthKind::QueryParam, key: "k2".to_string() };
        engine.add_or_update_addon(&url, Some(replaced.clone())).await.unwrap();
        let list = engine.list_addons().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].auth, Some(replaced));
    }

    #[tokio::test]
    async fn probing_does_not_register() {
        let server = MockServer::start().await;
        let url = serve_manifest(&server).await;
        let engine = engine();

        let probe = engine.test_addon(&url).await.unwrap();
        assert!(probe.capabilities.can_stream);
        assert!(probe.problems.is_empty());
        assert!(engine.list_addons().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_registry_is_a_configuration_error() {
        let err = engine().fetch_streams("tt1", ContentType::Movie).await.unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(ConfigurationError::NoAddons)));
    }

    #[tokio::test]
    async fn playable_urls_depend_on_payload_and_debrid() {
        let engine = engine();
        let mut candidate = StreamCandidate {
            title: "T".to_string(),
            quality: Quality::Unknown,
            size_label: String::new(),
            seeds: None,
            source_addon_id: "x".to_string(),
            source_addon_name: "X".to_string(),
            payload: StreamPayload::DirectHttp { url: "https://cdn/x.mkv".to_string() },
        };
        let url = engine.resolve_to_playable_url(&candidate, &DebridConfig::default()).await.unwrap();
        assert_eq!(url, "https://cdn/x.mkv");

        candidate.payload = StreamPayload::TorrentInfoHash { info_hash: "aa".to_string(), file_idx: None };
        let err = engine.resolve_to_playable_url(&candidate, &DebridConfig::default()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(ConfigurationError::DebridNotConfigured)));
    }

    #[tokio::test]
    async fn debrid_config_is_persisted() {
        let engine = engine();
        assert_eq!(engine.load_debrid_config().await.unwrap(), DebridConfig::default());

        let cfg = DebridConfig {
            service: DebridService::RealDebrid,
            api_key: "secret".to_string(),
            ..DebridConfig::default()
        };
        engine.save_debrid_config(&cfg).await.unwrap();
        assert_eq!(engine.load_debrid_config().await.unwrap(), cfg);
    }

    #[tokio::test]
    async fn opening_a_data_dir_creates_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("nested");
        let engine = Engine::open(&data_dir, EngineOptions::default()).await.unwrap();
        engine.save_debrid_config(&DebridConfig::default()).await.unwrap();
        assert!(data_dir.join(STORE_FILE).exists());
    }
}
