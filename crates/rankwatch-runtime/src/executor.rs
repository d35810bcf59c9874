//! Single-attempt task execution
//!
//! [`TaskExecutor`] dispatches a task to the [`SourceExecutor`] registered for
//! its source, then persists the outcome: today's position is upserted before
//! the lookup result is appended. A failed lookup writes nothing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use rankwatch_core::{
    IdGenerator, IdKind, Keyword, KeywordId, Position, Site, SiteId, Source, Task, TrackResult,
};
use rankwatch_persist::{
    KeywordStore, PositionStore, ResultStore, SiteStore, StoreError, TrackingStore,
};

use crate::provider::{
    FrequencyProvider, ProviderError, SearchClientFactory, SearchProvider, SearchQuery,
};

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Site {0} not found")]
    SiteNotFound(SiteId),
    #[error("Keyword {0} not found")]
    KeywordNotFound(KeywordId),
    #[error("No executor registered for source {0}")]
    UnsupportedSource(Source),
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// What a lookup found for one keyword
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    /// Rank for organic sources, search frequency for frequency sources
    pub rank: i64,
    pub url: String,
    pub title: String,
}

/// Per-source lookup strategy
#[async_trait]
pub trait SourceExecutor: Send + Sync {
    async fn lookup(&self, task: &Task) -> Result<Lookup, ExecutionError>;
}

async fn load_site(store: &dyn TrackingStore, id: SiteId) -> Result<Site, ExecutionError> {
    store.site(id).await?.ok_or(ExecutionError::SiteNotFound(id))
}

async fn load_keyword(store: &dyn TrackingStore, id: KeywordId) -> Result<Keyword, ExecutionError> {
    store
        .keyword(id)
        .await?
        .ok_or(ExecutionError::KeywordNotFound(id))
}

/// Organic rank lookup shared by every search engine flavor.
///
/// Uses a per-request client when the task carries credentials and a factory
/// is configured, otherwise the shared default client.
pub struct OrganicExecutor {
    store: Arc<dyn TrackingStore>,
    client: Arc<dyn SearchProvider>,
    factory: Option<Arc<dyn SearchClientFactory>>,
}

impl OrganicExecutor {
    pub fn new(store: Arc<dyn TrackingStore>, client: Arc<dyn SearchProvider>) -> Self {
        Self {
            store,
            client,
            factory: None,
        }
    }

    pub fn with_factory(mut self, factory: Arc<dyn SearchClientFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    fn client_for(&self, task: &Task) -> Result<Arc<dyn SearchProvider>, ProviderError> {
        match (&self.factory, &task.params.credentials) {
            (Some(factory), Some(credentials)) => factory.client(task.source, credentials),
            _ => Ok(self.client.clone()),
        }
    }
}

#[async_trait]
impl SourceExecutor for OrganicExecutor {
    async fn lookup(&self, task: &Task) -> Result<Lookup, ExecutionError> {
        let site = load_site(self.store.as_ref(), task.site_id).await?;
        let keyword = load_keyword(self.store.as_ref(), task.keyword_id).await?;

        let query = SearchQuery::for_task(task, &site, &keyword);
        let client = self.client_for(task)?;
        let hit = client.find_position(&query).await?;

        Ok(Lookup {
            rank: hit.rank,
            url: hit.url,
            title: hit.title,
        })
    }
}

/// Search frequency lookup; the frequency is stored in the rank column
pub struct FrequencyExecutor {
    store: Arc<dyn TrackingStore>,
    client: Arc<dyn FrequencyProvider>,
}

impl FrequencyExecutor {
    pub fn new(store: Arc<dyn TrackingStore>, client: Arc<dyn FrequencyProvider>) -> Self {
        Self { store, client }
    }
}

#[async_trait]
impl SourceExecutor for FrequencyExecutor {
    async fn lookup(&self, task: &Task) -> Result<Lookup, ExecutionError> {
        let keyword = load_keyword(self.store.as_ref(), task.keyword_id).await?;
        let region = task.params.context.region.or(keyword.region);
        let frequency = self.client.frequency(&keyword.phrase, region).await?;

        Ok(Lookup {
            rank: frequency,
            url: String::new(),
            title: keyword.phrase,
        })
    }
}

/// Default clients for the standard sources
#[derive(Clone)]
pub struct Providers {
    pub google: Arc<dyn SearchProvider>,
    pub yandex: Arc<dyn SearchProvider>,
    pub wordstat: Arc<dyn FrequencyProvider>,
    /// Builds clients for requests carrying their own credentials
    pub factory: Option<Arc<dyn SearchClientFactory>>,
}

/// Source-keyed dispatch plus persistence of successful lookups
pub struct TaskExecutor {
    store: Arc<dyn TrackingStore>,
    ids: Arc<dyn IdGenerator>,
    executors: HashMap<Source, Arc<dyn SourceExecutor>>,
}

impl TaskExecutor {
    /// Executor with no sources registered
    pub fn new(store: Arc<dyn TrackingStore>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            store,
            ids,
            executors: HashMap::new(),
        }
    }

    /// Executor with every [`Source`] registered against `providers`
    pub fn standard(
        store: Arc<dyn TrackingStore>,
        ids: Arc<dyn IdGenerator>,
        providers: Providers,
    ) -> Self {
        let organic = |client: Arc<dyn SearchProvider>| {
            let executor = OrganicExecutor::new(store.clone(), client);
            match &providers.factory {
                Some(factory) => executor.with_factory(factory.clone()),
                None => executor,
            }
        };
        let google = organic(providers.google.clone());
        let yandex = organic(providers.yandex.clone());
        let wordstat = FrequencyExecutor::new(store.clone(), providers.wordstat.clone());

        Self::new(store.clone(), ids)
            .register(Source::Google, Arc::new(google))
            .register(Source::Yandex, Arc::new(yandex))
            .register(Source::Wordstat, Arc::new(wordstat))
    }

    pub fn register(mut self, source: Source, executor: Arc<dyn SourceExecutor>) -> Self {
        self.executors.insert(source, executor);
        self
    }

    pub fn supports(&self, source: Source) -> bool {
        self.executors.contains_key(&source)
    }

    /// One lookup attempt for `task`, persisted on success
    #[instrument(skip(self, task), fields(task_id = %task.id, source = %task.source))]
    pub async fn execute(&self, task: &Task) -> Result<Lookup, ExecutionError> {
        let executor = self
            .executors
            .get(&task.source)
            .ok_or(ExecutionError::UnsupportedSource(task.source))?;

        let lookup = executor.lookup(task).await?;

        let position = Position::today(task, lookup.rank, &lookup.url, &lookup.title);
        self.store.create_or_update_today(&position).await?;

        let result = TrackResult::success(
            self.ids.generate(IdKind::Result),
            task,
            lookup.rank,
            &lookup.url,
            &lookup.title,
        );
        self.store.append_result(&result).await?;

        debug!(rank = lookup.rank, "Lookup persisted");
        Ok(lookup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockClientFactory, MockFrequencyProvider, MockSearchProvider};
    use rankwatch_core::{ProviderCredentials, SequentialIdGenerator, TrackingParams};
    use rankwatch_persist::MemoryStore;

    async fn seeded() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.add_site(Site::new(1, "example.com")).await;
        store.add_keyword(Keyword::new(10, 1, "espresso machine")).await;
        store
    }

    fn task(source: Source) -> Task {
        Task::new(
            "task-1".into(),
            "job-1".into(),
            10,
            1,
            source,
            TrackingParams::default(),
        )
    }

    fn providers(search: Arc<MockSearchProvider>) -> Providers {
        Providers {
            google: search.clone(),
            yandex: search,
            wordstat: Arc::new(
                MockFrequencyProvider::new().with_frequency("espresso machine", 880),
            ),
            factory: None,
        }
    }

    #[tokio::test]
    async fn test_organic_success_writes_position_and_result() {
        let store = seeded().await;
        let search = Arc::new(
            MockSearchProvider::new().with_rank("espresso machine", 7, "https://example.com/m"),
        );
        let executor = TaskExecutor::standard(
            store.clone(),
            Arc::new(SequentialIdGenerator::new()),
            providers(search),
        );

        let task = task(Source::Google);
        let lookup = executor.execute(&task).await.unwrap();
        assert_eq!(lookup.rank, 7);

        let results = store.results_for_job("job-1").await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(results[0].rank, 7);

        let today = chrono::Utc::now().date_naive();
        let position = store
            .position(10, 1, Source::Google, today)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(position.rank, 7);
        assert_eq!(position.url, "https://example.com/m");
    }

    #[tokio::test]
    async fn test_frequency_stored_in_rank() {
        let store = seeded().await;
        let executor = TaskExecutor::standard(
            store.clone(),
            Arc::new(SequentialIdGenerator::new()),
            providers(Arc::new(MockSearchProvider::new())),
        );

        let lookup = executor.execute(&task(Source::Wordstat)).await.unwrap();
        assert_eq!(lookup.rank, 880);
        assert_eq!(lookup.title, "espresso machine");
    }

    #[tokio::test]
    async fn test_provider_failure_writes_nothing() {
        let store = seeded().await;
        let executor = TaskExecutor::standard(
            store.clone(),
            Arc::new(SequentialIdGenerator::new()),
            providers(Arc::new(MockSearchProvider::always_failing())),
        );

        let err = executor.execute(&task(Source::Yandex)).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Provider(_)));
        assert_eq!(store.result_count().await, 0);
        assert_eq!(store.position_count().await, 0);
    }

    #[tokio::test]
    async fn test_unregistered_source() {
        let store = seeded().await;
        let executor = TaskExecutor::new(store, Arc::new(SequentialIdGenerator::new()));

        assert!(!executor.supports(Source::Google));
        let err = executor.execute(&task(Source::Google)).await.unwrap_err();
        assert!(matches!(err, ExecutionError::UnsupportedSource(Source::Google)));
    }

    #[tokio::test]
    async fn test_credentials_route_through_factory() {
        let store = seeded().await;
        let shared = Arc::new(MockSearchProvider::new());
        let per_user = Arc::new(MockSearchProvider::new().with_rank(
            "espresso machine",
            2,
            "https://example.com/",
        ));
        let factory = Arc::new(MockClientFactory::new(per_user.clone()));

        let mut providers = providers(shared.clone());
        providers.factory = Some(factory.clone() as Arc<dyn SearchClientFactory>);
        let executor =
            TaskExecutor::standard(store, Arc::new(SequentialIdGenerator::new()), providers);

        let mut task = task(Source::Google);
        task.params.credentials = Some(ProviderCredentials {
            user_id: "u-42".into(),
            api_key: "secret".into(),
            base_url: None,
        });

        let lookup = executor.execute(&task).await.unwrap();
        assert_eq!(lookup.rank, 2);
        assert_eq!(per_user.calls(), 1);
        assert_eq!(shared.calls(), 0);
        assert_eq!(factory.requested(), vec![(Source::Google, "u-42".to_string())]);
    }
}
