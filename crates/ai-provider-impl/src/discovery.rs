//! Discovers a locally reachable Ollama-style service (spec §4.C). Cloud
//! providers are never probed — they're "configured or absent". Every call
//! issues a fresh, short-timeout probe; nothing is cached and the client
//! pool is never touched.

use std::time::Duration;

use ai_provider_core::ModelInfo;
use tokio_util::sync::CancellationToken;

const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434";
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct DiscoveryResult {
    pub available: bool,
    pub endpoint: String,
    pub models: Vec<ModelInfo>,
}

pub struct Discovery {
    endpoint: String,
    client: reqwest::Client,
}

impl Discovery {
    pub fn new(endpoint: Option<String>) -> Self {
        let endpoint = endpoint
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_OLLAMA_ENDPOINT.to_string());
        Self {
            endpoint,
            client: reqwest::Client::new(),
        }
    }

    /// Probes `{endpoint}/api/tags`. Any failure — connect refused, timeout,
    /// malformed body — degrades to `available: false` with no error
    /// surfaced upward (spec §4.C).
    pub async fn probe(&self) -> DiscoveryResult {
        let ctx = CancellationToken::new();
        let url = format!("{}/api/tags", self.endpoint.trim_end_matches('/'));
        let result = crate::http_util::race(&ctx, PROBE_TIMEOUT, self.client.get(url).send()).await;

        let Ok(resp) = result else {
            return DiscoveryResult {
                available: false,
                endpoint: self.endpoint.clone(),
                models: Vec::new(),
            };
        };
        if !resp.status().is_success() {
            return DiscoveryResult {
                available: false,
                endpoint: self.endpoint.clone(),
                models: Vec::new(),
            };
        }

        #[derive(serde::Deserialize)]
        struct Tags {
            #[serde(default)]
            models: Vec<TagEntry>,
        }
        #[derive(serde::Deserialize)]
        struct TagEntry {
            name: String,
        }

        match resp.json::<Tags>().await {
            Ok(tags) => DiscoveryResult {
                available: true,
                endpoint: self.endpoint.clone(),
                models: tags.models.into_iter().map(|e| ModelInfo::new(e.name)).collect(),
            },
            Err(_) => DiscoveryResult {
                available: false,
                endpoint: self.endpoint.clone(),
                models: Vec::new(),
            },
        }
    }
}
