//! Page fetching and HTML-to-text extraction.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use scraper::{ElementRef, Html};
use serde::Serialize;
use tracing::debug;

use qs_core::TtlCache;

use crate::config::FetchSettings;

const USER_AGENT: &str = "Mozilla/5.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchOutcome {
    pub success: bool,
    /// Page text on success, error description otherwise.
    pub text: String,
}

impl FetchOutcome {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            success: true,
            text: text.into(),
        }
    }

    pub fn failed(text: impl Into<String>) -> Self {
        Self {
            success: false,
            text: text.into(),
        }
    }
}

pub type FetchCache = TtlCache<String, FetchOutcome>;

pub struct ContentFetcher {
    client: Client,
    cache: Arc<FetchCache>,
}

impl Default for ContentFetcher {
    fn default() -> Self {
        Self::new(&FetchSettings::default())
    }
}

impl ContentFetcher {
    pub fn new(settings: &FetchSettings) -> Self {
        Self {
            client: Client::builder()
                .user_agent(USER_AGENT)
                .timeout(Duration::from_secs(settings.timeout_secs))
                .build()
                .unwrap_or_default(),
            cache: Arc::new(FetchCache::new(
                settings.cache_capacity,
                Duration::from_secs(settings.cache_ttl_secs),
            )),
        }
    }

    pub fn with_cache(mut self, cache: Arc<FetchCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Fetch `url` and extract its text. Never fails; transport and status
    /// errors come back as an unsuccessful outcome.
    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        let key = url.to_string();
        if let Some(outcome) = self.cache.get(&key) {
            debug!(url, "Fetch cache hit");
            return outcome;
        }

        let outcome = match self.fetch_html(url).await {
            Ok(html) => FetchOutcome::ok(html_to_text(&html)),
            Err(e) => FetchOutcome::failed(e),
        };
        if outcome.success {
            self.cache.insert(key, outcome.clone());
        }
        outcome
    }

    async fn fetch_html(&self, url: &str) -> Result<String, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP error {status}: {url}"));
        }

        response.text().await.map_err(|e| e.to_string())
    }
}

fn is_block(tag: &str) -> bool {
    matches!(
        tag,
        "p" | "div" | "br" | "li" | "tr" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
            | "section" | "article" | "header" | "footer" | "table" | "ul" | "ol"
    )
}

/// Append text under `element`, skipping non-content subtrees.
fn extract_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            let tag = child_el.value().name();
            if matches!(tag, "script" | "style" | "noscript" | "template") {
                continue;
            }
            extract_text(child_el, out);
            if is_block(tag) {
                out.push('\n');
            }
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }
}

/// Collapse runs of newlines (and carriage returns) into one newline.
fn clean_text(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut prev_newline = false;
    for ch in text.chars() {
        if ch == '\n' || ch == '\r' {
            if !prev_newline {
                result.push('\n');
            }
            prev_newline = true;
        } else {
            result.push(ch);
            prev_newline = false;
        }
    }
    result
}

pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut text = String::new();
    extract_text(document.root_element(), &mut text);
    clean_text(&text)
}
