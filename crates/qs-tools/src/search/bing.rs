use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use qs_core::Error;

use super::{http_client, request_error, RawHit, SearchBackend};
use crate::config::SearchSettings;

pub const DEFAULT_ENDPOINT: &str = "https://api.bing.microsoft.com/v7.0/search";

/// Bing Web Search v7.
pub struct BingSearch {
    client: Client,
    api_key: String,
    market: String,
    endpoint: String,
    count: usize,
}

impl BingSearch {
    pub fn new(api_key: impl Into<String>, topk: usize) -> Self {
        Self {
            client: http_client(Duration::from_secs(10)),
            api_key: api_key.into(),
            market: "zh-CN".to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            // over-fetch so filtering still leaves topk
            count: topk * 2,
        }
    }

    pub fn from_settings(settings: &SearchSettings) -> Result<Self, Error> {
        let api_key = settings
            .bing
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::config("search.bing.api_key is not set"))?;

        Ok(Self::new(api_key, settings.topk)
            .with_market(&settings.bing.market)
            .with_endpoint(&settings.bing.endpoint)
            .with_timeout(Duration::from_secs(settings.timeout_secs)))
    }

    pub fn with_market(mut self, market: impl Into<String>) -> Self {
        self.market = market.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }
}

#[async_trait]
impl SearchBackend for BingSearch {
    fn name(&self) -> &str {
        "bing"
    }

    async fn fetch_raw(&self, query: &str) -> Result<Vec<RawHit>, Error> {
        let count = self.count.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .query(&[
                ("q", query),
                ("mkt", self.market.as_str()),
                ("count", count.as_str()),
            ])
            .send()
            .await
            .map_err(|e| request_error("bing", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(status.as_u16(), format!("bing: {body}")));
        }

        let body: BingResponse = response
            .json()
            .await
            .map_err(|e| Error::serialization(format!("bing: {e}")))?;
        Ok(parse_response(body))
    }
}

/// Walk the mainline ranking, resolving each entry against the answer
/// collections it points into.
fn parse_response(response: BingResponse) -> Vec<RawHit> {
    let pages: HashMap<&str, &WebPage> = response
        .web_pages
        .value
        .iter()
        .map(|page| (page.id.as_str(), page))
        .collect();

    let mut hits = Vec::new();
    for item in &response.ranking_response.mainline.items {
        let item_id = item.value.id.as_deref();
        match item.answer_type.as_str() {
            "WebPages" => {
                if let Some(page) = item_id.and_then(|id| pages.get(id)) {
                    hits.push(RawHit::new(&page.url, &page.snippet, &page.name));
                }
            }
            "News" if item_id.is_some() && item_id == response.news.id.as_deref() => {
                for news in &response.news.value {
                    hits.push(RawHit::new(&news.url, &news.description, &news.name));
                }
            }
            _ => {}
        }
    }
    hits
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BingResponse {
    web_pages: WebPages,
    news: News,
    ranking_response: RankingResponse,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WebPages {
    value: Vec<WebPage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WebPage {
    id: String,
    name: String,
    url: String,
    snippet: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct News {
    id: Option<String>,
    value: Vec<NewsArticle>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NewsArticle {
    name: String,
    url: String,
    description: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RankingResponse {
    mainline: Mainline,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Mainline {
    items: Vec<RankingItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RankingItem {
    answer_type: String,
    value: RankingValue,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RankingValue {
    id: Option<String>,
}
