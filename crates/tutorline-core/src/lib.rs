pub mod cache;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod provider;
pub mod ratelimit;
pub mod responses;
pub mod session;
pub mod topics;

pub use cache::{cache_key, normalize, CacheEntry, CacheStats, ResponseCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, GenerationParams, PipelineConfig, RateLimitConfig, SessionConfig};
pub use context::{ContextBuilder, ConversationContext, SessionContextBuilder};
pub use error::{ProviderError, ProviderErrorKind, Result, TutorError};
pub use pipeline::{
    ChatRequest, Outcome, Pipeline, PipelineStats, Reply, ReplyFormat, ReplyOptions, ReplySource,
    ReplyStyle, Usage,
};
pub use provider::{Generation, GenerationRequest, Provider};
pub use ratelimit::{RateLimitRecord, RateLimitStats, RateLimiter};
pub use responses::ResponseTables;
pub use session::{ChatTurn, Role, Session, SessionMessage, SessionStats, SessionStore};
pub use topics::{classify, TopicRule, TopicTable};
