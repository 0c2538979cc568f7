//! Provider capability contract, configuration, error taxonomy, and retry
//! policy for the atest-ext-ai core.
//!
//! This crate intentionally depends on nothing HTTP-specific: concrete
//! providers (reqwest-backed) live in `ai-provider-impl`.

pub mod config;
pub mod errors;
pub mod provider;
pub mod retry;

pub use config::{ProviderConfig, ProviderKind};
pub use errors::{CoreError, ProviderErrorKind};
pub use provider::{GenerateOptions, Health, ModelInfo, Provider, Usage};
pub use retry::{run_with_retry, RetryContext, RetryPolicy};
