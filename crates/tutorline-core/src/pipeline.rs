//! Per-message decision pipeline.
//!
//! `RateCheck → CannedMatch → CacheCheck → ContextAssembly → ProviderCall`,
//! with every provider failure recovered into a fallback reply. Apart from
//! input validation and rate limiting, [`Pipeline::handle_message`] always
//! produces a reply with `success == true`: the chat stays available even
//! when the provider is not.

use crate::cache::{CacheStats, ResponseCache};
use crate::clock::{Clock, SystemClock};
use crate::config::PipelineConfig;
use crate::context::{ContextBuilder, ConversationContext, SessionContextBuilder};
use crate::error::{ProviderError, Result, TutorError};
use crate::provider::{GenerationRequest, Provider};
use crate::ratelimit::{RateLimitStats, RateLimiter};
use crate::responses::ResponseTables;
use crate::session::{ChatTurn, Role, SessionMessage, SessionStats, SessionStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

pub const DEFAULT_MODE: &str = "tutor";
pub const CANNED_MODEL: &str = "quick-response";
pub const CACHE_MODEL: &str = "response-cache";
pub const FALLBACK_MODEL: &str = "fallback";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStyle {
    Brief,
    Detailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyFormat {
    Steps,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyOptions {
    #[serde(default)]
    pub style: Option<ReplyStyle>,
    #[serde(default)]
    pub format: Option<ReplyFormat>,
}

/// One inbound chat message.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Rate-limit identity (client address or session id).
    pub caller_key: String,
    pub session_key: Option<String>,
    pub mode: String,
    pub message: String,
    /// Used verbatim when there is no session key.
    pub history: Vec<ChatTurn>,
    pub options: ReplyOptions,
}

impl ChatRequest {
    pub fn new(caller_key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            caller_key: caller_key.into(),
            session_key: None,
            mode: DEFAULT_MODE.to_string(),
            message: message.into(),
            history: Vec::new(),
            options: ReplyOptions::default(),
        }
    }

    pub fn with_session(mut self, session_key: impl Into<String>) -> Self {
        self.session_key = Some(session_key.into());
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = mode.into();
        self
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_options(mut self, options: ReplyOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplySource {
    Canned,
    Cache,
    Provider,
    Fallback,
}

impl ReplySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplySource::Canned => "canned",
            ReplySource::Cache => "cache",
            ReplySource::Provider => "provider",
            ReplySource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub latency_ms: u64,
}

impl Usage {
    fn local(model: &str, started: Instant) -> Self {
        Self {
            model: model.to_string(),
            input_tokens: 0,
            output_tokens: 0,
            latency_ms: elapsed_ms(started),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub success: bool,
    pub reply: String,
    pub cached: bool,
    pub source: ReplySource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Replied(Reply),
    /// Caller exceeded its request budget; no reply text.
    RateLimited,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub cache: CacheStats,
    pub sessions: SessionStats,
    pub rate_limit: RateLimitStats,
    pub model: String,
    pub provider_configured: bool,
}

pub struct Pipeline {
    config: PipelineConfig,
    limiter: RateLimiter,
    cache: ResponseCache,
    sessions: Arc<SessionStore>,
    context: Box<dyn ContextBuilder>,
    provider: Arc<dyn Provider>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, provider: Arc<dyn Provider>) -> Self {
        Self::with_clock(config, provider, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: PipelineConfig,
        provider: Arc<dyn Provider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let topics = Arc::new(config.responses.topics.clone());
        let sessions = Arc::new(SessionStore::new(
            config.sessions.clone(),
            topics,
            clock.clone(),
        ));
        let context = Box::new(SessionContextBuilder::new(
            sessions.clone(),
            config.sessions.generation_history,
        ));

        Self {
            limiter: RateLimiter::new(config.rate_limit.clone(), clock.clone()),
            cache: ResponseCache::new(config.cache.clone(), clock),
            sessions,
            context,
            provider,
            config,
        }
    }

    /// Replace how provider context is derived from a session.
    pub fn with_context_builder(mut self, builder: Box<dyn ContextBuilder>) -> Self {
        self.context = builder;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    fn responses(&self) -> &ResponseTables {
        &self.config.responses
    }

    /// Reject input that should never enter the pipeline.
    pub fn validate(&self, request: &ChatRequest) -> Result<()> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(TutorError::Validation("message is required".into()));
        }
        let len = message.chars().count();
        if len > self.config.max_message_chars {
            return Err(TutorError::Validation(format!(
                "message is too long ({} > {} characters)",
                len, self.config.max_message_chars
            )));
        }
        Ok(())
    }

    /// Process one chat message.
    ///
    /// Errors only for invalid input. Every provider failure is turned into
    /// a fallback reply and recorded in the session like any other answer.
    pub async fn handle_message(&self, request: ChatRequest) -> Result<Outcome> {
        self.validate(&request)?;

        if !self.limiter.allow(&request.caller_key) {
            log::warn!("rate limited caller {}", request.caller_key);
            return Ok(Outcome::RateLimited);
        }

        let started = Instant::now();
        let message = request.message.trim();
        let session_key = request.session_key.as_deref();

        if let Some(canned) = self.responses().canned_reply(message) {
            let canned = canned.to_string();
            self.record_exchange(session_key, message, &canned);
            log::debug!("canned reply for {:?}", message);
            return Ok(Outcome::Replied(Reply {
                success: true,
                reply: canned,
                cached: false,
                source: ReplySource::Canned,
                usage: Some(Usage::local(CANNED_MODEL, started)),
            }));
        }

        let cacheable = self.cache.should_cache(message);
        if cacheable {
            if let Some(hit) = self.cache.get(message, &request.mode) {
                self.record_exchange(session_key, message, &hit);
                return Ok(Outcome::Replied(Reply {
                    success: true,
                    reply: hit,
                    cached: true,
                    source: ReplySource::Cache,
                    usage: Some(Usage::local(CACHE_MODEL, started)),
                }));
            }
        }

        let context = match session_key {
            Some(key) => {
                self.sessions.add_message(key, Role::User, message);
                self.context.build(key, message)
            }
            None => ConversationContext {
                history: request.history.clone(),
                summary: None,
            },
        };

        let generation_request = GenerationRequest {
            system_instruction: self.system_instruction(
                &request.mode,
                request.options,
                context.summary.as_deref(),
            ),
            history: context.history,
            message: message.to_string(),
            params: self.config.generation.clone(),
        };

        let result = match tokio::time::timeout(
            self.config.provider_timeout(),
            self.provider.generate(generation_request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::timeout(format!(
                "no response within {}s",
                self.config.provider_timeout_secs
            ))),
        };

        let reply = match result {
            Ok(generation) => {
                let usage = Usage {
                    model: self.provider.model().to_string(),
                    input_tokens: generation.input_tokens,
                    output_tokens: generation.output_tokens,
                    latency_ms: elapsed_ms(started),
                };

                let text = if generation.text.trim().chars().count() < 2 {
                    log::warn!("provider returned an empty or near-empty reply");
                    self.responses().empty_reply.clone()
                } else {
                    if cacheable {
                        self.cache.set(message, &generation.text, &request.mode);
                    }
                    generation.text
                };

                Reply {
                    success: true,
                    reply: text,
                    cached: false,
                    source: ReplySource::Provider,
                    usage: Some(usage),
                }
            }
            Err(err) => {
                let text = if err.is_quota() {
                    log::warn!("provider quota exhausted: {}", err.message);
                    self.responses().quota_apology.clone()
                } else {
                    log::error!("provider call failed ({}): {}", err.kind, err.message);
                    self.responses().fallback_for(message).to_string()
                };

                Reply {
                    success: true,
                    reply: text,
                    cached: false,
                    source: ReplySource::Fallback,
                    usage: Some(Usage::local(FALLBACK_MODEL, started)),
                }
            }
        };

        if let Some(key) = session_key {
            self.sessions.add_message(key, Role::Assistant, &reply.reply);
        }

        Ok(Outcome::Replied(reply))
    }

    fn record_exchange(&self, session_key: Option<&str>, message: &str, reply: &str) {
        if let Some(key) = session_key {
            self.sessions.add_message(key, Role::User, message);
            self.sessions.add_message(key, Role::Assistant, reply);
        }
    }

    /// Persona, then mode, style and format addenda, then the session summary.
    pub fn system_instruction(
        &self,
        mode: &str,
        options: ReplyOptions,
        summary: Option<&str>,
    ) -> String {
        let responses = self.responses();
        let mut parts: Vec<&str> = vec![responses.persona.as_str()];

        if let Some(extra) = responses.mode_instructions.get(mode) {
            parts.push(extra);
        }
        match options.style {
            Some(ReplyStyle::Brief) => parts.push(&responses.brief_instruction),
            Some(ReplyStyle::Detailed) => parts.push(&responses.detailed_instruction),
            None => {}
        }
        if options.format == Some(ReplyFormat::Steps) {
            parts.push(&responses.steps_instruction);
        }
        if let Some(summary) = summary {
            parts.push(summary);
        }

        parts.join("\n\n")
    }

    pub fn clear_session(&self, session_key: &str) -> bool {
        self.sessions.clear(session_key)
    }

    pub fn session_history(&self, session_key: &str) -> Vec<SessionMessage> {
        self.sessions.history(session_key)
    }

    pub fn flush_cache(&self) -> usize {
        self.cache.flush()
    }

    /// Read-only snapshot; no side effects.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            cache: self.cache.stats(),
            sessions: self.sessions.stats(),
            rate_limit: self.limiter.stats(),
            model: self.provider.model().to_string(),
            provider_configured: self.provider.is_configured(),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u64::MAX as u128) as u64
}
