//! Web search: provider adapters plus the filtering, retry and caching
//! shared by all of them.

pub mod bing;
pub mod qihoo;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use qs_core::{Error, TtlCache};

use crate::config::{SearchProviderKind, SearchSettings};

pub use bing::BingSearch;
pub use qihoo::QihooSearch;

/// An unfiltered hit as returned by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHit {
    pub url: String,
    pub snippet: String,
    pub title: String,
}

impl RawHit {
    pub fn new(url: impl Into<String>, snippet: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            snippet: snippet.into(),
            title: title.into(),
        }
    }
}

/// A filtered hit. Position in the returned list is its rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

pub type SearchCache = TtlCache<String, Vec<SearchHit>>;

/// One search provider's wire protocol.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_raw(&self, query: &str) -> Result<Vec<RawHit>, Error>;
}

pub(crate) fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .user_agent(concat!("quick-search/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

pub(crate) fn request_error(provider: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::timeout(format!("{provider}: {err}"))
    } else {
        Error::network(format!("{provider}: {err}"))
    }
}

/// Snippet as it appears inside a JSON string literal, without the quotes.
fn escape_snippet(snippet: &str) -> String {
    let quoted = serde_json::to_string(snippet).unwrap_or_default();
    quoted
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(&quoted)
        .to_string()
}

/// Drop blacklisted and PDF hits, then keep the first `topk`.
pub fn filter_hits(raw: Vec<RawHit>, blacklist: &[String], topk: usize) -> Vec<SearchHit> {
    raw.into_iter()
        .filter(|hit| {
            !blacklist.iter().any(|domain| hit.url.contains(domain.as_str()))
                && !hit.url.ends_with(".pdf")
        })
        .take(topk)
        .map(|hit| SearchHit {
            snippet: escape_snippet(&hit.snippet),
            url: hit.url,
            title: hit.title,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_retry: u32,
    pub min_backoff_secs: u64,
    pub max_backoff_secs: u64,
}

impl RetryPolicy {
    pub fn new(max_retry: u32, backoff_secs: [u64; 2]) -> Self {
        let [lo, hi] = backoff_secs;
        Self {
            max_retry,
            min_backoff_secs: lo.min(hi),
            max_backoff_secs: lo.max(hi),
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_retry: u32) -> Self {
        Self::new(max_retry, [0, 0])
    }

    fn backoff(&self) -> Duration {
        let secs = if self.max_backoff_secs > self.min_backoff_secs {
            rand::thread_rng().gen_range(self.min_backoff_secs..=self.max_backoff_secs)
        } else {
            self.min_backoff_secs
        };
        Duration::from_secs(secs)
    }
}

/// A backend wrapped with result filtering, retry with jittered backoff and
/// a TTL cache of successful lookups.
pub struct SearchEngine {
    backend: Arc<dyn SearchBackend>,
    blacklist: Vec<String>,
    topk: usize,
    retry: RetryPolicy,
    cache: Arc<SearchCache>,
}

impl SearchEngine {
    pub fn new(backend: Arc<dyn SearchBackend>, settings: &SearchSettings) -> Self {
        Self {
            backend,
            blacklist: settings.blacklist.clone(),
            topk: settings.topk,
            retry: RetryPolicy::new(settings.max_retry, settings.backoff_secs),
            cache: Arc::new(SearchCache::new(
                settings.cache_capacity,
                Duration::from_secs(settings.cache_ttl_secs),
            )),
        }
    }

    /// Build the engine for the configured provider.
    pub fn from_settings(settings: &SearchSettings) -> Result<Self, Error> {
        let backend: Arc<dyn SearchBackend> = match settings.provider {
            SearchProviderKind::Bing => Arc::new(BingSearch::from_settings(settings)?),
            SearchProviderKind::Qihoo => Arc::new(QihooSearch::from_settings(settings)?),
        };
        Ok(Self::new(backend, settings))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Share a cache with other engines.
    pub fn with_cache(mut self, cache: Arc<SearchCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn provider(&self) -> &str {
        self.backend.name()
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, Error> {
        let key = query.to_string();
        if let Some(hits) = self.cache.get(&key) {
            debug!(provider = self.provider(), query, "Search cache hit");
            return Ok(hits);
        }

        let attempts = self.retry.max_retry.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.backend.fetch_raw(query).await {
                Ok(raw) => {
                    let hits = filter_hits(raw, &self.blacklist, self.topk);
                    debug!(provider = self.provider(), query, hits = hits.len(), "Search succeeded");
                    self.cache.insert(key, hits.clone());
                    return Ok(hits);
                }
                Err(e) if !e.is_retryable() => {
                    warn!(provider = self.provider(), query, error = %e, "Search failed, not retrying");
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        provider = self.provider(),
                        query,
                        attempt,
                        max_retry = attempts,
                        error = %e,
                        "Search attempt failed"
                    );
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.retry.backoff()).await;
                    }
                }
            }
        }

        Err(Error::network(format!(
            "Failed to get search results from {} after {} attempts: {}",
            self.provider(),
            attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyBackend {
        failures_left: AtomicUsize,
        calls: AtomicUsize,
        hits: Vec<RawHit>,
    }

    impl FlakyBackend {
        fn new(failures: usize, hits: Vec<RawHit>) -> Self {
            Self {
                failures_left: AtomicUsize::new(failures),
                calls: AtomicUsize::new(0),
                hits,
            }
        }
    }

    #[async_trait]
    impl SearchBackend for FlakyBackend {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn fetch_raw(&self, _query: &str) -> Result<Vec<RawHit>, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(Error::network("connection reset"));
            }
            Ok(self.hits.clone())
        }
    }

    fn blacklist() -> Vec<String> {
        SearchSettings::default().blacklist
    }

    fn engine(backend: Arc<FlakyBackend>) -> SearchEngine {
        SearchEngine::new(backend, &SearchSettings::default()).with_retry(RetryPolicy::immediate(3))
    }

    #[test]
    fn test_filter_drops_blacklisted_and_pdf() {
        let raw = vec![
            RawHit::new("https://www.youtube.com/watch?v=1", "video", "v"),
            RawHit::new("https://example.com/report.pdf", "pdf", "p"),
            RawHit::new("https://example.com/a", "keep a", "A"),
            RawHit::new("https://example.com/b", "keep b", "B"),
        ];
        let hits = filter_hits(raw, &blacklist(), 6);
        let urls: Vec<_> = hits.iter().map(|h| h.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/a", "https://example.com/b"]);
    }

    #[test]
    fn test_filter_truncates_after_filtering() {
        let raw = (0..10)
            .map(|i| RawHit::new(format!("https://site{i}.cn"), "s", "t"))
            .collect();
        assert_eq!(filter_hits(raw, &[], 3).len(), 3);
    }

    #[test]
    fn test_snippet_is_json_escaped() {
        let raw = vec![RawHit::new("https://a.cn", "第一行\n\"引号\"", "t")];
        let hits = filter_hits(raw, &[], 6);
        assert_eq!(hits[0].snippet, "第一行\\n\\\"引号\\\"");
    }

    #[test]
    fn test_retry_policy_range() {
        let policy = RetryPolicy::new(3, [5, 2]);
        assert_eq!(policy.min_backoff_secs, 2);
        assert_eq!(policy.max_backoff_secs, 5);
        for _ in 0..20 {
            let secs = policy.backoff().as_secs();
            assert!((2..=5).contains(&secs));
        }
        assert_eq!(RetryPolicy::immediate(3).backoff(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_search_retries_then_succeeds() {
        let backend = Arc::new(FlakyBackend::new(2, vec![RawHit::new("https://a.cn", "s", "t")]));
        let hits = engine(backend.clone()).search("q").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_search_gives_up_after_max_retry() {
        let backend = Arc::new(FlakyBackend::new(10, vec![]));
        let err = engine(backend.clone()).search("q").await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert!(err.to_string().contains("flaky"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    struct RejectingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SearchBackend for RejectingBackend {
        fn name(&self) -> &str {
            "rejecting"
        }

        async fn fetch_raw(&self, _query: &str) -> Result<Vec<RawHit>, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::auth("invalid api key"))
        }
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let backend = Arc::new(RejectingBackend {
            calls: AtomicUsize::new(0),
        });
        let engine = SearchEngine::new(backend.clone(), &SearchSettings::default())
            .with_retry(RetryPolicy::immediate(3));

        let err = engine.search("q").await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_successful_results_are_cached() {
        let backend = Arc::new(FlakyBackend::new(0, vec![RawHit::new("https://a.cn", "s", "t")]));
        let engine = engine(backend.clone());
        engine.search("q").await.unwrap();
        engine.search("q").await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        engine.search("other").await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let backend = Arc::new(FlakyBackend::new(3, vec![RawHit::new("https://a.cn", "s", "t")]));
        let engine = engine(backend.clone());
        assert!(engine.search("q").await.is_err());
        assert_eq!(engine.search("q").await.unwrap().len(), 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 4);
    }
}
