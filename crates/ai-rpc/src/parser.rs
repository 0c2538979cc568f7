//! Decodes the flat host envelope into a typed, validated request (spec
//! §4.F). Any decode or validation failure becomes `BadRequest`.

use std::time::Duration;

use ai_provider_core::{CoreError, ProviderConfig, ProviderKind};
use serde::Deserialize;

use crate::envelope::RawRequest;

const DEFAULT_OVERRIDE_MAX_TOKENS: u32 = 1024;
const DEFAULT_OVERRIDE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub enum ParsedRequest {
    Generate {
        prompt: String,
        dialect: String,
        schema: Option<String>,
        model: Option<String>,
        runtime_override: Option<ProviderConfig>,
    },
    Models {
        provider_tag: String,
    },
    Capabilities,
    TestConnection {
        provider_config: ProviderConfig,
    },
    Discover,
}

#[derive(Debug, Deserialize)]
struct GenerateParams {
    prompt: String,
    dialect: String,
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsParams {
    provider: String,
}

#[derive(Debug, Deserialize)]
struct ProviderOverrideParams {
    provider: String,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    model: String,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

fn default_max_tokens() -> u32 {
    DEFAULT_OVERRIDE_MAX_TOKENS
}

fn default_timeout_secs() -> u64 {
    DEFAULT_OVERRIDE_TIMEOUT_SECS
}

impl ProviderOverrideParams {
    fn into_config(self) -> Result<ProviderConfig, CoreError> {
        ProviderConfig::new(
            &self.provider,
            self.endpoint,
            self.api_key,
            self.model,
            self.max_tokens,
            Duration::from_secs(self.timeout_secs),
        )
    }
}

/// `local` normalizes to `ollama`; any other tag passes through unchanged
/// (spec §4.F point 3, spec §8 scenario S5).
pub fn normalize_provider_tag(raw: &str) -> String {
    ProviderKind::parse_loose(raw)
        .map(|kind| kind.as_str().to_string())
        .unwrap_or_else(|| raw.to_string())
}

fn params_json<T: serde::de::DeserializeOwned>(raw: &RawRequest) -> Result<T, CoreError> {
    let sql = raw
        .sql
        .as_deref()
        .ok_or_else(|| CoreError::bad_request("missing 'sql' params payload"))?;
    serde_json::from_str(sql).map_err(|err| CoreError::bad_request(format!("invalid params json: {err}")))
}

pub fn parse(raw: &RawRequest) -> Result<ParsedRequest, CoreError> {
    match raw.key.as_str() {
        "generate" => {
            let params: GenerateParams = params_json(raw)?;
            if params.prompt.trim().is_empty() {
                return Err(CoreError::bad_request("prompt must not be empty"));
            }
            if params.dialect.trim().is_empty() {
                return Err(CoreError::bad_request("dialect must not be empty"));
            }
            let runtime_override = match raw.config.as_deref() {
                Some(json) if !json.trim().is_empty() => {
                    let override_params: ProviderOverrideParams = serde_json::from_str(json)
                        .map_err(|err| CoreError::bad_request(format!("invalid config json: {err}")))?;
                    Some(override_params.into_config()?)
                }
                _ => None,
            };
            Ok(ParsedRequest::Generate {
                prompt: params.prompt,
                dialect: params.dialect,
                schema: params.schema,
                model: params.model,
                runtime_override,
            })
        }
        "models" => {
            let params: ModelsParams = params_json(raw)?;
            Ok(ParsedRequest::Models {
                provider_tag: normalize_provider_tag(&params.provider),
            })
        }
        "capabilities" => Ok(ParsedRequest::Capabilities),
        "test_connection" => {
            let params: ProviderOverrideParams = params_json(raw)?;
            Ok(ParsedRequest::TestConnection {
                provider_config: params.into_config()?,
            })
        }
        "discover" => Ok(ParsedRequest::Discover),
        other => Err(CoreError::bad_request(format!("unknown method '{other}'"))),
    }
}
