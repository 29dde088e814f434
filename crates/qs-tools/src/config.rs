//! Settings for the search backends and the page fetcher.
//!
//! Every struct deserializes with defaults for missing keys, so a config
//! file only needs to name what it overrides.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProviderKind {
    #[default]
    Qihoo,
    Bing,
}

impl std::fmt::Display for SearchProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchProviderKind::Qihoo => write!(f, "qihoo"),
            SearchProviderKind::Bing => write!(f, "bing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub provider: SearchProviderKind,
    /// Hits kept per query after filtering.
    pub topk: usize,
    /// URL substrings that exclude a hit.
    pub blacklist: Vec<String>,
    pub max_retry: u32,
    /// Inclusive range of whole seconds to wait between attempts.
    pub backoff_secs: [u64; 2],
    pub timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    pub bing: BingSettings,
    pub qihoo: QihooSettings,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            provider: SearchProviderKind::default(),
            topk: 6,
            blacklist: ["enoN", "youtube.com", "bilibili.com", "researchgate.net"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_retry: 3,
            backoff_secs: [2, 5],
            timeout_secs: 10,
            cache_ttl_secs: 600,
            cache_capacity: 100,
            bing: BingSettings::default(),
            qihoo: QihooSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BingSettings {
    pub api_key: Option<String>,
    pub market: String,
    pub endpoint: String,
}

impl Default for BingSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            market: "zh-CN".to_string(),
            endpoint: crate::search::bing::DEFAULT_ENDPOINT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QihooSettings {
    /// Bearer token.
    pub api_key: Option<String>,
    /// Signing salt mixed into the request checksum.
    pub key: String,
    pub cid: String,
    pub endpoint: String,
}

impl Default for QihooSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            key: String::new(),
            cid: "saas_360zhengqi".to_string(),
            endpoint: crate::search::qihoo::DEFAULT_ENDPOINT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    /// Characters of page text kept per selected result.
    pub max_chars: usize,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            max_chars: 2048,
            cache_ttl_secs: 600,
            cache_capacity: 100,
        }
    }
}
