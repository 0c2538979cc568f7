//! Concrete provider clients (spec §4.B) and the local discovery path
//! (spec §4.C). Reuses one connection-pooled `reqwest::Client` per client
//! instance; no secrets are ever logged.

pub mod claude;
pub mod discovery;
mod http_util;
pub mod ollama;
pub mod openai_compat;

use std::sync::Arc;

use ai_provider_core::{CoreError, Provider, ProviderConfig, ProviderKind};

pub use claude::ClaudeProvider;
pub use discovery::{Discovery, DiscoveryResult};
pub use ollama::OllamaProvider;
pub use openai_compat::OpenAICompatProvider;

/// Dispatches on `config.kind` to build the matching concrete client
/// (spec §4.B). Used both for the long-lived pool (§4.E construction) and
/// for transient clients built from a per-request override (§4.E step 1).
pub fn build_provider(config: ProviderConfig) -> Result<Arc<dyn Provider>, CoreError> {
    match config.kind {
        ProviderKind::Ollama => Ok(Arc::new(OllamaProvider::new(config)?)),
        ProviderKind::Claude => Ok(Arc::new(ClaudeProvider::new(config)?)),
        ProviderKind::OpenAI | ProviderKind::DeepSeek | ProviderKind::Custom => {
            Ok(Arc::new(OpenAICompatProvider::new(config)?))
        }
    }
}
