pub mod all_debrid;
pub mod real_debrid;
pub mod resolver;

use crate::core::error::DebridError;
use crate::core::model::DebridStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub use resolver::DebridResolver;

/// Key under which the debrid configuration is persisted.
pub const DEBRID_CONFIG_KEY: &str = "debrid_config";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DebridService {
    #[default]
    None,
    RealDebrid,
    AllDebrid,
    Premiumize,
}

impl DebridService {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "" | "none" | "off" => Some(Self::None),
            "real-debrid" | "realdebrid" | "rd" => Some(Self::RealDebrid),
            "all-debrid" | "alldebrid" | "ad" => Some(Self::AllDebrid),
            "premiumize" | "pm" => Some(Self::Premiumize),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::RealDebrid => "Real-Debrid",
            Self::AllDebrid => "AllDebrid",
            Self::Premiumize => "Premiumize",
        }
    }
}

impl fmt::Display for DebridService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DebridConfig {
    pub service: DebridService,
    pub api_key: String,
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    /// Replaces the provider's public API root; used for self-hosted proxies and tests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for DebridConfig {
    fn default() -> Self {
        Self {
            service: DebridService::None,
            api_key: String::new(),
            poll_interval_ms: 2_000,
            max_attempts: 30,
            base_url: None,
        }
    }
}

impl DebridConfig {
    pub fn is_configured(&self) -> bool {
        self.service != DebridService::None
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_attempts.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

/// A file a finished job can serve, with the provider link to unlock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebridFile {
    pub name: String,
    pub size: Option<u64>,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub status: DebridStatus,
    /// The provider's own status wording, kept for error messages.
    pub detail: String,
    pub files: Vec<DebridFile>,
}

/// One debrid service's submit / poll / unlock triad.
#[async_trait]
pub trait DebridProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Hands the magnet to the service and returns its job id.
    async fn submit(&self, magnet: &str) -> Result<String, DebridError>;

    async fn poll(&self, job_id: &str) -> Result<JobSnapshot, DebridError>;

    /// Exchanges a provider file link for a direct HTTP URL.
    async fn unlock(&self, link: &str) -> Result<String, DebridError>;
}
