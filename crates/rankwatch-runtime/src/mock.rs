//! Mock providers for testing
//!
//! Scripted stand-ins for search engines and the frequency service, with call
//! counters so tests can assert how often a lookup was attempted.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use rankwatch_core::{ProviderCredentials, Source};

use crate::paged::{SerpItem, SerpPageSource};
use crate::provider::{
    FrequencyProvider, ProviderError, SearchClientFactory, SearchHit, SearchProvider, SearchQuery,
};

/// How many leading calls for a phrase fail before it starts succeeding
#[derive(Debug, Default)]
struct FailureScript {
    always: bool,
    remaining: HashMap<String, u32>,
}

impl FailureScript {
    fn should_fail(&mut self, phrase: &str) -> bool {
        if self.always {
            return true;
        }
        match self.remaining.get_mut(phrase) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }
}

/// Search provider answering from a phrase-to-hit table
#[derive(Debug, Default)]
pub struct MockSearchProvider {
    hits: HashMap<String, SearchHit>,
    failures: Mutex<FailureScript>,
    calls: AtomicU32,
    queries: Mutex<Vec<SearchQuery>>,
}

impl MockSearchProvider {
    /// Every phrase resolves to "not found" until configured otherwise
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rank(mut self, phrase: &str, rank: i64, url: &str) -> Self {
        self.hits
            .insert(phrase.to_string(), SearchHit::found(rank, url, phrase));
        self
    }

    /// The first `times` lookups of `phrase` fail
    pub fn failing_first(self, phrase: &str, times: u32) -> Self {
        if let Ok(mut script) = self.failures.lock() {
            script.remaining.insert(phrase.to_string(), times);
        }
        self
    }

    /// Every lookup fails
    pub fn always_failing() -> Self {
        let mock = Self::default();
        if let Ok(mut script) = mock.failures.lock() {
            script.always = true;
        }
        mock
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Queries received so far, in call order
    pub fn queries(&self) -> Vec<SearchQuery> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    fn name(&self) -> &str {
        "mock-search"
    }

    async fn find_position(&self, query: &SearchQuery) -> Result<SearchHit, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.clone());
        }

        let fail = self
            .failures
            .lock()
            .map(|mut script| script.should_fail(&query.query))
            .unwrap_or(false);
        if fail {
            return Err(ProviderError::ConnectionFailed(format!(
                "mock failure for {:?}",
                query.query
            )));
        }

        Ok(self
            .hits
            .get(&query.query)
            .cloned()
            .unwrap_or_else(SearchHit::not_found))
    }
}

/// Frequency provider answering from a phrase-to-count table
#[derive(Debug, Default)]
pub struct MockFrequencyProvider {
    counts: HashMap<String, i64>,
    failures: Mutex<FailureScript>,
    calls: AtomicU32,
}

impl MockFrequencyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frequency(mut self, phrase: &str, count: i64) -> Self {
        self.counts.insert(phrase.to_string(), count);
        self
    }

    pub fn failing_first(self, phrase: &str, times: u32) -> Self {
        if let Ok(mut script) = self.failures.lock() {
            script.remaining.insert(phrase.to_string(), times);
        }
        self
    }

    pub fn always_failing() -> Self {
        let mock = Self::default();
        if let Ok(mut script) = mock.failures.lock() {
            script.always = true;
        }
        mock
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrequencyProvider for MockFrequencyProvider {
    fn name(&self) -> &str {
        "mock-frequency"
    }

    async fn frequency(&self, phrase: &str, _region: Option<i64>) -> Result<i64, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let fail = self
            .failures
            .lock()
            .map(|mut script| script.should_fail(phrase))
            .unwrap_or(false);
        if fail {
            return Err(ProviderError::NotAvailable);
        }

        Ok(self.counts.get(phrase).copied().unwrap_or(0))
    }
}

/// Serves fixed result pages regardless of the query
#[derive(Debug, Default)]
pub struct MockSerpPages {
    pages: Vec<Vec<SerpItem>>,
    calls: AtomicU32,
}

impl MockSerpPages {
    pub fn new(pages: Vec<Vec<SerpItem>>) -> Self {
        Self {
            pages,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SerpPageSource for MockSerpPages {
    fn name(&self) -> &str {
        "mock-serp"
    }

    async fn fetch_page(
        &self,
        _query: &SearchQuery,
        page: u32,
    ) -> Result<Vec<SerpItem>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let index = page.saturating_sub(1) as usize;
        Ok(self.pages.get(index).cloned().unwrap_or_default())
    }
}

/// Hands out one shared client and remembers which users asked for it
#[derive(Debug)]
pub struct MockClientFactory {
    client: Arc<dyn SearchProvider>,
    requested: Mutex<Vec<(Source, String)>>,
}

impl MockClientFactory {
    pub fn new(client: Arc<dyn SearchProvider>) -> Self {
        Self {
            client,
            requested: Mutex::new(Vec::new()),
        }
    }

    /// `(source, user_id)` pairs in request order
    pub fn requested(&self) -> Vec<(Source, String)> {
        self.requested.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl SearchClientFactory for MockClientFactory {
    fn client(
        &self,
        source: Source,
        credentials: &ProviderCredentials,
    ) -> Result<Arc<dyn SearchProvider>, ProviderError> {
        if credentials.api_key.is_empty() {
            return Err(ProviderError::InvalidCredentials("empty api key".into()));
        }
        if let Ok(mut requested) = self.requested.lock() {
            requested.push((source, credentials.user_id.clone()));
        }
        Ok(self.client.clone())
    }
}
