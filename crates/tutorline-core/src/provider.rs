//! Contract with the external generative-text provider.

use crate::config::GenerationParams;
use crate::error::ProviderError;
use crate::session::ChatTurn;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_instruction: String,
    pub history: Vec<ChatTurn>,
    pub message: String,
    pub params: GenerationParams,
}

/// Text plus token usage for one successful call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// Model identifier reported in usage metadata.
    fn model(&self) -> &str;

    /// Whether credentials are present. An unconfigured provider still
    /// answers `generate`, with an auth error.
    fn is_configured(&self) -> bool {
        true
    }

    async fn generate(&self, request: GenerationRequest) -> Result<Generation, ProviderError>;
}
