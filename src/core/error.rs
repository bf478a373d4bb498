use reqwest::StatusCode;

#[derive(thiserror::Error, Debug)]
pub enum ManifestError {
    #[error("invalid manifest url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("network error fetching manifest: {0}")]
    Network(String),

    #[error("manifest request to {url} failed with HTTP {status}")]
    Http { status: StatusCode, url: String },

    #[error("invalid manifest: {0}")]
    Validation(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IdFormatError {
    #[error("unsupported id format `{id}`, expected one of: {}", expected.join(", "))]
    Unsupported { id: String, expected: Vec<String> },
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("corrupt record under `{key}`: {source}")]
    Corrupt { key: String, source: serde_json::Error },

    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("addon store: {0}")]
    Store(#[from] StoreError),

    #[error("invalid addon descriptor: {}", .0.join(", "))]
    Invalid(Vec<String>),
}

/// Failures that stop a whole operation because its inputs are unusable.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("no addons configured; add at least one streaming addon")]
    NoAddons,

    #[error("no streaming addons configured; add an addon that provides the `stream` resource")]
    NoStreamingAddons,

    #[error("no debrid service configured; set one with --debrid-service")]
    DebridNotConfigured,

    #[error("missing API key for {0}; pass it with --debrid-key")]
    MissingDebridKey(String),
}

#[derive(thiserror::Error, Debug)]
pub enum DebridError {
    #[error("stream is not a torrent; play its url directly")]
    NotTorrent,

    #[error("stream has neither a magnet link nor an info-hash")]
    NoMagnetAvailable,

    #[error("{provider} rejected the magnet: {message}")]
    SubmissionFailed { provider: String, message: String },

    #[error("{provider} did not finish within {attempts} status checks")]
    Timeout { provider: String, attempts: u32 },

    #[error("{provider} reported the torrent as {status}")]
    JobFailed { provider: String, status: String },

    #[error("{provider} cannot serve this torrent: {reason}")]
    Unsupported { provider: String, reason: String },

    #[error("{provider} finished the torrent but returned no playable file")]
    NoPlayableLink { provider: String },

    #[error("{0} is not implemented yet")]
    NotImplemented(String),

    #[error("{provider} network error: {message}")]
    Network { provider: String, message: String },

    #[error("{provider} API error: {message}")]
    Api { provider: String, message: String },
}

impl DebridError {
    pub(crate) fn network(provider: &str, err: impl std::fmt::Display) -> Self {
        Self::Network { provider: provider.to_string(), message: err.to_string() }
    }

    pub(crate) fn api(provider: &str, message: impl Into<String>) -> Self {
        Self::Api { provider: provider.to_string(), message: message.into() }
    }
}

/// Error surface of the `Engine` facade.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Debrid(#[from] DebridError),
}
