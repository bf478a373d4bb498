use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use url::form_urlencoded::byte_serialize;
use uuid::Uuid;

pub type JobId = Uuid;

/// Capability tag an addon declares in its manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Stream,
    Catalog,
    Meta,
    Subtitles,
    Other,
}

impl Resource {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "stream" | "streams" | "streaming" => Self::Stream,
            "catalog" | "catalogs" => Self::Catalog,
            "meta" => Self::Meta,
            "subtitle" | "subtitles" => Self::Subtitles,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Catalog => "catalog",
            Self::Meta => "meta",
            Self::Subtitles => "subtitles",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Movie,
    Series,
    Anime,
    Channel,
    Tv,
    Other,
}

impl ContentType {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "movie" | "movies" => Self::Movie,
            "series" | "show" => Self::Series,
            "anime" => Self::Anime,
            "channel" => Self::Channel,
            "tv" => Self::Tv,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "series",
            Self::Anime => "anime",
            Self::Channel => "channel",
            Self::Tv => "tv",
            Self::Other => "other",
        }
    }

    /// Types whose presence implies an addon serves playable streams.
    pub fn implies_streaming(&self) -> bool {
        matches!(self, Self::Movie | Self::Series | Self::Anime)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthKind {
    HeaderBearer,
    QueryParam,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonAuth {
    pub kind: AuthKind,
    pub key: String,
}

/// Coarse addon classification kept for descriptors written by older builds,
/// which tagged torrent indexers with `torrent` instead of declaring `stream`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddonKind {
    Catalog,
    Meta,
    Subtitles,
    Movie,
    Torrent,
    Other,
    #[default]
    Unknown,
}

impl AddonKind {
    pub fn classify(resources: &BTreeSet<Resource>, types: &BTreeSet<ContentType>) -> Self {
        if resources.is_empty() {
            return Self::Unknown;
        }
        if resources.contains(&Resource::Catalog) {
            Self::Catalog
        } else if resources.contains(&Resource::Meta) {
            Self::Meta
        } else if resources.contains(&Resource::Subtitles) {
            Self::Subtitles
        } else if types.contains(&ContentType::Movie) || types.contains(&ContentType::Series) {
            Self::Movie
        } else {
            Self::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    pub base_url: String,
    pub manifest_url: String,
    #[serde(default)]
    pub resources: BTreeSet<Resource>,
    #[serde(default)]
    pub supported_types: BTreeSet<ContentType>,
    #[serde(default)]
    pub id_prefixes: Vec<String>,
    #[serde(default)]
    pub per_resource_endpoint: BTreeMap<Resource, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AddonAuth>,
    #[serde(default)]
    pub kind: AddonKind,
    #[serde(default)]
    pub catalogs: Vec<serde_json::Value>,
    #[serde(default)]
    pub behavior_hints: serde_json::Value,
    #[serde(default)]
    pub date_added: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddonCapabilities {
    pub can_stream: bool,
    pub can_search: bool,
    pub can_provide_metadata: bool,
    pub can_provide_subtitles: bool,
    pub supported_types: Vec<ContentType>,
}

impl AddonDescriptor {
    pub fn capabilities(&self) -> AddonCapabilities {
        AddonCapabilities {
            can_stream: self.resources.contains(&Resource::Stream),
            can_search: self.resources.contains(&Resource::Catalog),
            can_provide_metadata: self.resources.contains(&Resource::Meta),
            can_provide_subtitles: self.resources.contains(&Resource::Subtitles),
            supported_types: self.supported_types.iter().copied().collect(),
        }
    }

    /// Whether the aggregator should query this addon for streams.
    pub fn serves_streams(&self) -> bool {
        self.resources.contains(&Resource::Stream) || self.kind == AddonKind::Torrent
    }

    /// Problems that make the descriptor unusable. Empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.id.trim().is_empty() {
            errors.push("missing addon id".to_string());
        }
        if self.name.trim().is_empty() {
            errors.push("missing addon name".to_string());
        }
        if self.base_url.trim().is_empty() {
            errors.push("missing addon url".to_string());
        } else if url::Url::parse(&self.base_url).is_err() {
            errors.push(format!("invalid addon url: {}", self.base_url));
        }
        if self.base_url.ends_with(crate::addons::manifest::MANIFEST_SUFFIX) {
            errors.push("base url still carries the manifest suffix".to_string());
        }
        if !self.manifest_url.ends_with(crate::addons::manifest::MANIFEST_SUFFIX) {
            errors.push(format!(
                "manifest url must end with {}",
                crate::addons::manifest::MANIFEST_SUFFIX
            ));
        }
        for (resource, endpoint) in &self.per_resource_endpoint {
            if url::Url::parse(endpoint).is_err() {
                errors.push(format!("invalid endpoint url for {}", resource));
            }
        }
        errors
    }
}

/// Ordered quality ladder; `Unknown` ranks lowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Quality {
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "480p")]
    Sd480,
    #[serde(rename = "720p")]
    Hd720,
    #[serde(rename = "1080p")]
    FullHd1080,
    #[serde(rename = "2160p")]
    Uhd2160,
}

impl Quality {
    pub fn rank(&self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Sd480 => 1,
            Self::Hd720 => 2,
            Self::FullHd1080 => 3,
            Self::Uhd2160 => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Sd480 => "480p",
            Self::Hd720 => "720p",
            Self::FullHd1080 => "1080p",
            Self::Uhd2160 => "2160p",
        }
    }

    /// Maps a single token (`4K`, `UHD`, `1080p`, ...) onto the ladder.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "2160p" | "4k" | "uhd" => Some(Self::Uhd2160),
            "1080p" => Some(Self::FullHd1080),
            "720p" => Some(Self::Hd720),
            "480p" => Some(Self::Sd480),
            _ => None,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    DirectHttp,
    TorrentMagnet,
    TorrentInfoHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StreamPayload {
    DirectHttp { url: String },
    TorrentMagnet { magnet: String },
    TorrentInfoHash {
        info_hash: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_idx: Option<u32>,
    },
}

impl StreamPayload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::DirectHttp { .. } => PayloadKind::DirectHttp,
            Self::TorrentMagnet { .. } => PayloadKind::TorrentMagnet,
            Self::TorrentInfoHash { .. } => PayloadKind::TorrentInfoHash,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamCandidate {
    pub title: String,
    pub quality: Quality,
    pub size_label: String,
    pub seeds: Option<u32>,
    pub source_addon_id: String,
    pub source_addon_name: String,
    pub payload: StreamPayload,
}

impl StreamCandidate {
    pub fn payload_kind(&self) -> PayloadKind {
        self.payload.kind()
    }

    pub fn is_torrent(&self) -> bool {
        !matches!(self.payload, StreamPayload::DirectHttp { .. })
    }

    /// Magnet URI for torrent candidates, derived from the info-hash when needed.
    pub fn magnet_uri(&self) -> Option<String> {
        match &self.payload {
            StreamPayload::DirectHttp { .. } => None,
            StreamPayload::TorrentMagnet { magnet } if !magnet.trim().is_empty() => Some(magnet.clone()),
            StreamPayload::TorrentMagnet { .. } => None,
            StreamPayload::TorrentInfoHash { info_hash, .. } if !info_hash.trim().is_empty() => {
                Some(magnet_from_info_hash(info_hash, &self.title))
            }
            StreamPayload::TorrentInfoHash { .. } => None,
        }
    }
}

pub fn magnet_from_info_hash(info_hash: &str, display_name: &str) -> String {
    let dn: String = byte_serialize(display_name.as_bytes()).collect();
    format!("magnet:?xt=urn:btih:{}&dn={}", info_hash.trim().to_ascii_lowercase(), dn)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebridStatus {
    Submitted,
    Queued,
    Downloading,
    Ready,
    Unsupported,
    Error,
}

impl DebridStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Unsupported | Self::Error)
    }
}

impl fmt::Display for DebridStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Submitted => "submitted",
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Ready => "ready",
            Self::Unsupported => "unsupported",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// One magnet resolution. Lives only for the duration of `DebridResolver::resolve`.
#[derive(Debug, Clone)]
pub struct DebridJob {
    pub id: JobId,
    pub magnet: String,
    pub provider_job_id: String,
    status: DebridStatus,
    resolved_url: Option<String>,
}

impl DebridJob {
    pub fn submitted(magnet: String, provider_job_id: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            magnet,
            provider_job_id,
            status: DebridStatus::Submitted,
            resolved_url: None,
        }
    }

    pub fn status(&self) -> DebridStatus {
        self.status
    }

    /// Moves the job to `status`. Terminal states are sticky.
    pub fn transition(&mut self, status: DebridStatus) -> bool {
        if self.status.is_terminal() || self.status == status {
            return false;
        }
        self.status = status;
        true
    }

    pub fn complete(&mut self, url: String) {
        self.status = DebridStatus::Ready;
        self.resolved_url = Some(url);
    }

    /// Present only once the job reached `Ready`.
    pub fn resolved_url(&self) -> Option<&str> {
        match self.status {
            DebridStatus::Ready => self.resolved_url.as_deref(),
            _ => None,
        }
    }
}
