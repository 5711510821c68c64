use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tutorline_core::PipelineConfig;

pub const API_KEY_ENV: &str = "TUTORLINE_API_KEY";
pub const GEMINI_KEY_ENV: &str = "GEMINI_API_KEY";

/// Top-level `tutorline.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TutorlineConfig {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub pipeline: PipelineConfig,
    pub sweeps: SweepConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub http_addr: String,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:5000".to_string(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub model: String,
    pub base_url: String,
    /// Prefer the environment; a key in the file is only a fallback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub connect_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            api_key: None,
            connect_timeout_secs: 10,
        }
    }
}

impl ProviderConfig {
    /// Environment first, then the file. Blank values count as missing.
    pub fn resolved_api_key(&self) -> Option<String> {
        [API_KEY_ENV, GEMINI_KEY_ENV]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .chain(self.api_key.clone())
            .map(|k| k.trim().to_string())
            .find(|k| !k.is_empty())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Intervals of the background cleanup tasks, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub cache_interval_secs: u64,
    pub session_interval_secs: u64,
    pub rate_limit_interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            cache_interval_secs: 10 * 60,
            session_interval_secs: 15 * 60,
            rate_limit_interval_secs: 5 * 60,
        }
    }
}

impl TutorlineConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        Ok(config)
    }

    /// Defaults when the file is missing or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn http_addr(&self) -> anyhow::Result<SocketAddr> {
        self.server
            .http_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid server.http_addr {:?}: {}", self.server.http_addr, e))
    }

    /// Every problem found, empty when the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.server.http_addr.parse::<SocketAddr>().is_err() {
            errors.push(format!(
                "server.http_addr is not a socket address: {}",
                self.server.http_addr
            ));
        }
        if self.provider.model.trim().is_empty() {
            errors.push("provider.model must not be empty".to_string());
        }
        if !self.provider.base_url.starts_with("http://")
            && !self.provider.base_url.starts_with("https://")
        {
            errors.push(format!(
                "provider.base_url must be an http(s) URL: {}",
                self.provider.base_url
            ));
        }
        if let Err(e) = self.pipeline.validate() {
            errors.push(format!("pipeline: {}", e));
        }

        let sweeps = [
            ("cache_interval_secs", self.sweeps.cache_interval_secs),
            ("session_interval_secs", self.sweeps.session_interval_secs),
            ("rate_limit_interval_secs", self.sweeps.rate_limit_interval_secs),
        ];
        for (name, secs) in sweeps {
            if secs == 0 {
                errors.push(format!("sweeps.{} must be > 0", name));
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(TutorlineConfig::default().validate().is_empty());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: TutorlineConfig = toml::from_str(
            r#"
            [server]
            http_addr = "127.0.0.1:8080"

            [pipeline.cache]
            max_size = 10

            [pipeline.rate_limit]
            max_requests = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.server.http_addr, "127.0.0.1:8080");
        assert_eq!(config.pipeline.cache.max_size, 10);
        assert_eq!(config.pipeline.cache.ttl_secs, 1800);
        assert_eq!(config.pipeline.rate_limit.max_requests, 5);
        assert_eq!(config.pipeline.rate_limit.window_secs, 60);
        assert_eq!(config.sweeps.session_interval_secs, 900);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_validate_collects_every_error() {
        let mut config = TutorlineConfig::default();
        config.server.http_addr = "nowhere".into();
        config.provider.base_url = "ftp://x".into();
        config.sweeps.cache_interval_secs = 0;

        let errors = config.validate();
        assert_eq!(errors.len(), 3, "{:?}", errors);
    }

    #[test]
    fn test_show_round_trips_through_toml() {
        let text = toml::to_string_pretty(&TutorlineConfig::default()).unwrap();
        let back: TutorlineConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.pipeline.sessions.max_history, 20);
        assert_eq!(back.provider.model, "gemini-1.5-flash");
    }
}
