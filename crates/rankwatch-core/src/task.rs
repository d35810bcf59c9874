//! Task types and the query parameters a task carries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::{JobId, RunStatus};
use crate::site::{KeywordId, SiteId};
use crate::source::Source;

/// Opaque task identifier
pub type TaskId = String;

/// Task status
pub type TaskStatus = RunStatus;

/// Retry budget assigned to new tasks unless configured otherwise
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Device profile a SERP is requested for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Desktop,
    Mobile,
    Tablet,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
            Self::Tablet => "tablet",
        }
    }
}

/// Per-request provider credentials that override the shared client
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCredentials {
    pub user_id: String,
    pub api_key: String,
    pub base_url: Option<String>,
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("user_id", &self.user_id)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Contextual query fields, copied onto every result produced from a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryContext {
    pub device: Device,
    pub os: Option<String>,
    /// Count paid placements when numbering positions
    pub ads: bool,
    pub country: Option<String>,
    pub lang: Option<String>,
    /// Number of result pages to examine
    pub pages: u32,
    /// Treat subdomains of the site as matches
    pub subdomains: bool,
    /// Numeric region code (Yandex `lr`, Wordstat region)
    pub region: Option<i64>,
}

impl Default for QueryContext {
    fn default() -> Self {
        Self {
            device: Device::Desktop,
            os: None,
            ads: false,
            country: None,
            lang: None,
            pages: 10,
            subdomains: false,
            region: None,
        }
    }
}

/// Invalid tracking parameters
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamsError {
    #[error("pages must be between 1 and {max}, got {got}")]
    Pages { got: u32, max: u32 },
    #[error("provider credentials require a non-empty {0}")]
    Credentials(&'static str),
}

/// Everything a tracking request specifies besides site and source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingParams {
    #[serde(flatten)]
    pub context: QueryContext,
    pub credentials: Option<ProviderCredentials>,
}

impl TrackingParams {
    pub fn validate(&self, max_pages: u32) -> Result<(), ParamsError> {
        let pages = self.context.pages;
        if pages == 0 || pages > max_pages {
            return Err(ParamsError::Pages {
                got: pages,
                max: max_pages,
            });
        }
        if let Some(creds) = &self.credentials {
            if creds.user_id.trim().is_empty() {
                return Err(ParamsError::Credentials("user id"));
            }
            if creds.api_key.trim().is_empty() {
                return Err(ParamsError::Credentials("api key"));
            }
        }
        Ok(())
    }
}

/// One keyword lookup belonging to a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub job_id: JobId,
    pub keyword_id: KeywordId,
    pub site_id: SiteId,
    pub source: Source,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Retries performed so far (attempts minus one once terminal)
    pub retry_count: u32,
    pub max_retries: u32,
    pub error: Option<String>,
    pub params: TrackingParams,
}

impl Task {
    pub fn new(
        id: TaskId,
        job_id: JobId,
        keyword_id: KeywordId,
        site_id: SiteId,
        source: Source,
        params: TrackingParams,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            job_id,
            keyword_id,
            site_id,
            source,
            status: RunStatus::Pending,
            created_at: now,
            updated_at: now,
            completed_at: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            error: None,
            params,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}
