use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TutorError>;

#[derive(Debug, Error)]
pub enum TutorError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl TutorError {
    /// True for errors caused by the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, TutorError::Validation(_))
    }
}

/// Failure classes reported by a generation provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    /// Quota exhausted or the provider is shedding load (HTTP 429).
    Quota,
    /// Missing, malformed or rejected credentials.
    Auth,
    /// Transport failure before a usable response arrived.
    Network,
    /// The provider answered with something we could not decode.
    Malformed,
    /// The call did not finish inside the configured deadline.
    Timeout,
}

impl ProviderErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderErrorKind::Quota => "quota",
            ProviderErrorKind::Auth => "auth",
            ProviderErrorKind::Network => "network",
            ProviderErrorKind::Malformed => "malformed",
            ProviderErrorKind::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn quota(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Quota, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Auth, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Network, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Malformed, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message)
    }

    pub fn is_quota(&self) -> bool {
        self.kind == ProviderErrorKind::Quota
    }
}
