//! qs-tools: Web tools for quick-search
//!
//! This crate provides what the searcher agent can call:
//! - Search: Bing and 360 (Qihoo) adapters behind a filtering, retrying,
//!   caching `SearchEngine`
//! - Fetch: page download and HTML-to-text extraction
//! - Tools: `web_search` and `web_select`

pub mod config;
pub mod fetch;
pub mod search;
pub mod web;

pub use config::{BingSettings, FetchSettings, QihooSettings, SearchProviderKind, SearchSettings};
pub use fetch::{ContentFetcher, FetchCache, FetchOutcome};
pub use search::{
    filter_hits, BingSearch, QihooSearch, RawHit, RetryPolicy, SearchBackend, SearchCache,
    SearchEngine, SearchHit,
};
pub use web::{
    create_search_tools, WebSearchTool, WebSelectTool, SEARCH_RESULTS_KEY, WEB_SEARCH, WEB_SELECT,
};
