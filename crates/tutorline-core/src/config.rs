use crate::error::{Result, TutorError};
use crate::responses::ResponseTables;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry lifetime in seconds. Default: 1800 (30 minutes).
    pub ttl_secs: u64,
    /// Maximum number of entries before LRU eviction. Default: 500.
    pub max_size: usize,
    /// Messages shorter than this (after trimming) are never cached. Default: 15.
    pub min_length: usize,
    /// Messages starting with any of these (lowercased, trimmed) are never cached.
    pub greetings: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30 * 60,
            max_size: 500,
            min_length: 15,
            greetings: ["привет", "здравствуй", "кто ты", "как дела", "хай", "hello"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(TutorError::Config("cache.max_size must be > 0".into()));
        }
        if self.ttl_secs == 0 {
            return Err(TutorError::Config("cache.ttl_secs must be > 0".into()));
        }
        Ok(())
    }
}

/// Session store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle lifetime in seconds. Default: 3600.
    pub ttl_secs: u64,
    /// Upper bound on retained history entries. Default: 20.
    pub max_history: usize,
    /// How many recent entries are handed to the provider. Default: 10.
    pub generation_history: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 60 * 60,
            max_history: 20,
            generation_history: 10,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    pub fn with_generation_history(mut self, n: usize) -> Self {
        self.generation_history = n;
        self
    }

    pub fn validate(&self) -> Result<()> {
        // Two anchor entries plus at least one recent entry.
        if self.max_history < 3 {
            return Err(TutorError::Config(
                "sessions.max_history must be >= 3".into(),
            ));
        }
        if self.generation_history == 0 {
            return Err(TutorError::Config(
                "sessions.generation_history must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Fixed-window rate limiting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Window length in seconds. Default: 60.
    pub window_secs: u64,
    /// Requests allowed per caller per window. Default: 30.
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 30,
        }
    }
}

impl RateLimitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window_secs = window.as_secs();
        self
    }

    pub fn with_max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_secs == 0 {
            return Err(TutorError::Config(
                "rate_limit.window_secs must be > 0".into(),
            ));
        }
        if self.max_requests == 0 {
            return Err(TutorError::Config(
                "rate_limit.max_requests must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Sampling parameters forwarded to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            top_p: 0.95,
            top_k: 50,
            max_output_tokens: 4000,
            stop_sequences: Vec::new(),
        }
    }
}

impl GenerationParams {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(TutorError::Config(
                "generation.temperature must be in [0.0, 2.0]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(TutorError::Config(
                "generation.top_p must be in [0.0, 1.0]".into(),
            ));
        }
        if self.max_output_tokens == 0 {
            return Err(TutorError::Config(
                "generation.max_output_tokens must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Everything the generation pipeline needs, in one block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub cache: CacheConfig,
    pub sessions: SessionConfig,
    pub rate_limit: RateLimitConfig,
    pub generation: GenerationParams,
    pub responses: ResponseTables,
    /// Provider deadline in seconds; exceeding it counts as a provider failure. Default: 30.
    pub provider_timeout_secs: u64,
    /// Longest accepted message, in characters. Default: 5000.
    pub max_message_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            sessions: SessionConfig::default(),
            rate_limit: RateLimitConfig::default(),
            generation: GenerationParams::default(),
            responses: ResponseTables::default(),
            provider_timeout_secs: 30,
            max_message_chars: 5000,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_sessions(mut self, sessions: SessionConfig) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_responses(mut self, responses: ResponseTables) -> Self {
        self.responses = responses;
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout_secs = timeout.as_secs();
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        self.sessions.validate()?;
        self.rate_limit.validate()?;
        self.generation.validate()?;
        self.responses.validate()?;

        if self.provider_timeout_secs == 0 {
            return Err(TutorError::Config(
                "provider_timeout_secs must be > 0".into(),
            ));
        }
        if self.max_message_chars == 0 {
            return Err(TutorError::Config("max_message_chars must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_degenerate_history_bound() {
        let config = PipelineConfig::new().with_sessions(SessionConfig::new().with_max_history(2));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_history"));
    }

    #[test]
    fn test_rejects_zero_rate_limit() {
        let config = RateLimitConfig::new().with_max_requests(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "cache": { "max_size": 10 } }"#).unwrap();
        assert_eq!(config.cache.max_size, 10);
        assert_eq!(config.cache.ttl_secs, 1800);
        assert_eq!(config.rate_limit.max_requests, 30);
        assert_eq!(config.sessions.max_history, 20);
    }
}
