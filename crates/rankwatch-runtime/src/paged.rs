//! Page-by-page SERP scanning
//!
//! Engines return results one page at a time. [`PagedSearch`] walks the pages
//! of a [`SerpPageSource`] until the target domain shows up, converting the
//! position within a page into an absolute rank.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::provider::{ProviderError, SearchHit, SearchProvider, SearchQuery};

/// One entry on a result page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerpItem {
    pub url: String,
    pub title: String,
    /// Paid placement
    #[serde(default)]
    pub is_ad: bool,
}

impl SerpItem {
    pub fn organic(url: &str, title: &str) -> Self {
        Self {
            url: url.to_string(),
            title: title.to_string(),
            is_ad: false,
        }
    }

    pub fn ad(url: &str, title: &str) -> Self {
        Self {
            is_ad: true,
            ..Self::organic(url, title)
        }
    }
}

/// Fetches a single result page
#[async_trait]
pub trait SerpPageSource: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// `page` is 1-based. An empty page means the engine has no more results.
    async fn fetch_page(&self, query: &SearchQuery, page: u32)
        -> Result<Vec<SerpItem>, ProviderError>;
}

/// Absolute 1-based rank of the `position`-th result on `page`
pub fn absolute_position(page: u32, position: u32, results_per_page: u32) -> i64 {
    i64::from(page.saturating_sub(1)) * i64::from(results_per_page) + i64::from(position)
}

/// [`SearchProvider`] that scans up to `query.pages` pages of a page source
#[derive(Debug)]
pub struct PagedSearch<P> {
    pages: P,
    results_per_page: u32,
}

impl<P: SerpPageSource> PagedSearch<P> {
    pub fn new(pages: P, results_per_page: u32) -> Self {
        Self {
            pages,
            results_per_page,
        }
    }

    pub fn results_per_page(&self) -> u32 {
        self.results_per_page
    }

    pub fn page_source(&self) -> &P {
        &self.pages
    }
}

#[async_trait]
impl<P: SerpPageSource> SearchProvider for PagedSearch<P> {
    fn name(&self) -> &str {
        self.pages.name()
    }

    async fn find_position(&self, query: &SearchQuery) -> Result<SearchHit, ProviderError> {
        let target = normalize_host(&query.domain).ok_or_else(|| {
            ProviderError::RequestFailed(format!("invalid domain {:?}", query.domain))
        })?;

        for page in 1..=query.pages {
            let items = self.pages.fetch_page(query, page).await?;
            if items.is_empty() {
                break;
            }

            let mut position = 0;
            for item in items.iter().filter(|item| query.ads || !item.is_ad) {
                position += 1;
                if matches_domain(&item.url, &target, query.subdomains) {
                    let rank = absolute_position(page, position, self.results_per_page);
                    debug!(query = %query.query, rank = rank, url = %item.url, "Domain found");
                    return Ok(SearchHit::found(rank, &item.url, &item.title));
                }
            }
        }

        debug!(query = %query.query, pages = query.pages, "Domain not found");
        Ok(SearchHit::not_found())
    }
}

/// Lowercased host without a leading `www.`; accepts bare domains and full URLs
fn normalize_host(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let parsed = Url::parse(raw)
        .ok()
        .filter(|url| url.has_host())
        .or_else(|| Url::parse(&format!("http://{}", raw)).ok())?;
    let host = parsed.host_str()?.trim_end_matches('.').to_ascii_lowercase();
    let host = host.strip_prefix("www.").map(str::to_string).unwrap_or(host);
    (!host.is_empty()).then_some(host)
}

fn matches_domain(url: &str, target: &str, subdomains: bool) -> bool {
    match normalize_host(url) {
        Some(host) => {
            host == target
                || (subdomains
                    && host.len() > target.len()
                    && host.ends_with(target)
                    && host.as_bytes()[host.len() - target.len() - 1] == b'.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSerpPages;
    use rankwatch_core::{Device, Source};

    fn query(domain: &str, pages: u32) -> SearchQuery {
        SearchQuery {
            query: "coffee grinder".into(),
            domain: domain.into(),
            source: Source::Google,
            pages,
            device: Device::Desktop,
            os: None,
            ads: false,
            subdomains: false,
            country: None,
            lang: None,
            region: None,
        }
    }

    fn page(urls: &[&str]) -> Vec<SerpItem> {
        urls.iter().map(|u| SerpItem::organic(u, "title")).collect()
    }

    #[test]
    fn test_absolute_position() {
        assert_eq!(absolute_position(1, 1, 10), 1);
        assert_eq!(absolute_position(1, 10, 10), 10);
        assert_eq!(absolute_position(3, 4, 10), 24);
        assert_eq!(absolute_position(2, 1, 100), 101);
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("Example.com").as_deref(), Some("example.com"));
        assert_eq!(
            normalize_host("https://www.example.com/path?q=1").as_deref(),
            Some("example.com")
        );
        assert_eq!(normalize_host("www.example.com.").as_deref(), Some("example.com"));
        assert_eq!(normalize_host(""), None);
    }

    #[test]
    fn test_subdomain_matching() {
        assert!(matches_domain("https://example.com/a", "example.com", false));
        assert!(!matches_domain("https://blog.example.com/a", "example.com", false));
        assert!(matches_domain("https://blog.example.com/a", "example.com", true));
        assert!(!matches_domain("https://notexample.com/", "example.com", true));
    }

    #[tokio::test]
    async fn test_rank_on_second_page() {
        let pages = MockSerpPages::new(vec![
            page(&["https://a.test/", "https://b.test/", "https://c.test/"]),
            page(&["https://d.test/", "https://www.example.com/shop", "https://e.test/"]),
        ]);
        let search = PagedSearch::new(pages, 3);

        let hit = search.find_position(&query("example.com", 5)).await.unwrap();
        assert_eq!(hit.rank, 5);
        assert_eq!(hit.url, "https://www.example.com/shop");
        assert_eq!(search.page_source().calls(), 2);
    }

    #[tokio::test]
    async fn test_not_found_within_page_limit() {
        let pages = MockSerpPages::new(vec![
            page(&["https://a.test/"]),
            page(&["https://example.com/"]),
        ]);
        let search = PagedSearch::new(pages, 1);

        let hit = search.find_position(&query("example.com", 1)).await.unwrap();
        assert_eq!(hit, SearchHit::not_found());
        assert_eq!(search.page_source().calls(), 1);
    }

    #[tokio::test]
    async fn test_ads_skipped_unless_requested() {
        let items = vec![
            SerpItem::ad("https://sponsor.test/", "ad"),
            SerpItem::organic("https://example.com/", "organic"),
        ];
        let search = PagedSearch::new(MockSerpPages::new(vec![items]), 10);

        let mut q = query("example.com", 1);
        assert_eq!(search.find_position(&q).await.unwrap().rank, 1);

        q.ads = true;
        assert_eq!(search.find_position(&q).await.unwrap().rank, 2);
    }

    #[tokio::test]
    async fn test_empty_page_stops_scan() {
        let search = PagedSearch::new(MockSerpPages::new(vec![Vec::new()]), 10);

        let hit = search.find_position(&query("example.com", 10)).await.unwrap();
        assert!(!hit.is_found());
        assert_eq!(search.page_source().calls(), 1);
    }
}
