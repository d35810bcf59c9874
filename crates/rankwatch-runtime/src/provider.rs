//! External lookup capabilities and their common types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use rankwatch_core::{Device, Keyword, ProviderCredentials, Site, Source, Task};

/// Errors from search and frequency providers
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
    #[error("Provider not available")]
    NotAvailable,
}

/// One organic rank lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    /// Domain whose position is wanted
    pub domain: String,
    pub source: Source,
    /// Result pages to examine
    pub pages: u32,
    pub device: Device,
    pub os: Option<String>,
    pub ads: bool,
    pub subdomains: bool,
    pub country: Option<String>,
    pub lang: Option<String>,
    pub region: Option<i64>,
}

impl SearchQuery {
    /// Build the lookup for `task`. The engine flavor decides which locale
    /// signals are passed: Google is steered by country and language, Yandex
    /// by numeric region and language.
    pub fn for_task(task: &Task, site: &Site, keyword: &Keyword) -> Self {
        let ctx = &task.params.context;
        let (country, region) = match task.source {
            Source::Yandex => (None, ctx.region.or(keyword.region)),
            _ => (ctx.country.clone(), None),
        };
        Self {
            query: keyword.phrase.clone(),
            domain: site.domain.clone(),
            source: task.source,
            pages: ctx.pages,
            device: ctx.device,
            os: ctx.os.clone(),
            ads: ctx.ads,
            subdomains: ctx.subdomains,
            country,
            lang: ctx.lang.clone(),
            region,
        }
    }
}

/// Where the target domain was found
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// 1-based absolute position; 0 when not found in the examined pages
    pub rank: i64,
    pub url: String,
    pub title: String,
}

impl SearchHit {
    pub fn found(rank: i64, url: &str, title: &str) -> Self {
        Self {
            rank,
            url: url.to_string(),
            title: title.to_string(),
        }
    }

    pub fn not_found() -> Self {
        Self::default()
    }

    pub fn is_found(&self) -> bool {
        self.rank > 0
    }
}

/// Organic search engine client
#[async_trait]
pub trait SearchProvider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Locate `query.domain` in the results for `query.query`
    async fn find_position(&self, query: &SearchQuery) -> Result<SearchHit, ProviderError>;
}

/// Keyword frequency service client
#[async_trait]
pub trait FrequencyProvider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Monthly search frequency for `phrase`, optionally scoped to a region
    async fn frequency(&self, phrase: &str, region: Option<i64>) -> Result<i64, ProviderError>;
}

/// Builds search clients for requests that carry their own credentials
pub trait SearchClientFactory: Send + Sync + std::fmt::Debug {
    fn client(
        &self,
        source: Source,
        credentials: &ProviderCredentials,
    ) -> Result<Arc<dyn SearchProvider>, ProviderError>;
}
