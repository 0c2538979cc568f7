use std::time::Duration;

use ai_provider_core::{Health, ModelInfo, ProviderConfig, Usage};

/// The decoded request handed to the manager (spec §3 "GenerateRequest").
/// Prompt construction / dialect phrasing is an external collaborator
/// (spec §1); this crate treats `prompt` as already final.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub dialect: String,
    pub schema: Option<String>,
    pub preferred_model: Option<String>,
    pub runtime_override: Option<ProviderConfig>,
}

/// What `AIManager::generate` hands back to its caller — not yet the
/// RPC-facing `GenerateResponse` (confidence and explanation are the
/// dispatcher's job per spec §4.G).
#[derive(Debug, Clone)]
pub struct GenerateOutcome {
    pub text: String,
    pub usage: Usage,
    pub model: String,
    pub provider: String,
    pub duration: Duration,
}

/// A discovery record (spec §3 "ProviderInfo"). Freshly computed every
/// call, never cached.
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub provider: String,
    pub available: bool,
    pub endpoint: Option<String>,
    pub models: Vec<ModelInfo>,
}

/// Result of `AIManager::test_connection` (spec §4.E).
#[derive(Debug, Clone)]
pub struct TestConnectionResult {
    pub success: bool,
    pub message: String,
    pub response_time: Duration,
    pub provider_kind: String,
}

impl From<Health> for TestConnectionResult {
    fn from(health: Health) -> Self {
        Self {
            success: health.healthy,
            message: health.status,
            response_time: health.response_time,
            provider_kind: String::new(),
        }
    }
}
