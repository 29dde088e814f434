use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use md5::{Digest, Md5};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use qs_core::Error;

use super::{http_client, request_error, RawHit, SearchBackend};
use crate::config::SearchSettings;

pub const DEFAULT_ENDPOINT: &str = "https://api.360.cn/v2/mwebsearch";

const REF_PROM: &str = "360so-s4";

/// 360 (Qihoo) mobile web search.
pub struct QihooSearch {
    client: Client,
    api_key: String,
    key: String,
    cid: String,
    endpoint: String,
}

/// First 16 hex digits of the MD5 of `input`.
fn md5_prefix(input: &str) -> String {
    let hex = format!("{:x}", Md5::digest(input.as_bytes()));
    hex[..16].to_string()
}

impl QihooSearch {
    pub fn new(api_key: impl Into<String>, key: impl Into<String>, cid: impl Into<String>) -> Self {
        Self {
            client: http_client(Duration::from_secs(10)),
            api_key: api_key.into(),
            key: key.into(),
            cid: cid.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    pub fn from_settings(settings: &SearchSettings) -> Result<Self, Error> {
        let qihoo = &settings.qihoo;
        let api_key = qihoo
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::config("search.qihoo.api_key is not set"))?;

        Ok(Self::new(api_key, &qihoo.key, &qihoo.cid)
            .with_endpoint(&qihoo.endpoint)
            .with_timeout(Duration::from_secs(settings.timeout_secs)))
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    /// Request checksum over cid, query, signing key and timestamp.
    pub fn signature(&self, query: &str, timestamp: u64) -> String {
        md5_prefix(&format!("{}{}{}{}", self.cid, query, self.key, timestamp))
    }
}

#[async_trait]
impl SearchBackend for QihooSearch {
    fn name(&self) -> &str {
        "qihoo"
    }

    async fn fetch_raw(&self, query: &str) -> Result<Vec<RawHit>, Error> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let t = timestamp.to_string();
        let m = self.signature(query, timestamp);

        let response = self
            .client
            .get(&self.endpoint)
            .bearer_auth(&self.api_key)
            .query(&[
                ("q", query),
                ("t", t.as_str()),
                ("ref_prom", REF_PROM),
                ("cid", self.cid.as_str()),
                ("m", m.as_str()),
            ])
            .send()
            .await
            .map_err(|e| request_error("qihoo", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(status.as_u16(), format!("qihoo: {body}")));
        }

        let body: QihooResponse = response
            .json()
            .await
            .map_err(|e| Error::serialization(format!("qihoo: {e}")))?;
        Ok(parse_items(&body.items.unwrap_or_default()))
    }
}

fn non_empty<'a>(item: &'a Value, field: &str) -> Option<&'a str> {
    item.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn weather_text(data: Option<&Value>) -> Option<String> {
    let data = data?;
    let mut parts = Vec::new();
    if let Some(realtime) = data.get("realtime") {
        parts.push(format!("实时天气: {realtime}"));
    }
    if let Some(weather) = data.get("weather") {
        parts.push(format!("最近两周天气: {weather}"));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

/// Keep weather cards and regular results; every other item type is skipped.
fn parse_items(items: &[Value]) -> Vec<RawHit> {
    items
        .iter()
        .filter_map(|item| {
            let content = match item.get("type").and_then(Value::as_str) {
                Some("weather") => weather_text(item.get("data")),
                Some("regional") | Some("engine") => non_empty(item, "content_large")
                    .or_else(|| non_empty(item, "summary"))
                    .map(str::to_string),
                _ => None,
            }?;
            let url = item.get("url").and_then(Value::as_str).unwrap_or_default();
            let title = item.get("title").and_then(Value::as_str).unwrap_or_default();
            Some(RawHit::new(url, content, title))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct QihooResponse {
    #[serde(default)]
    items: Option<Vec<Value>>,
}
