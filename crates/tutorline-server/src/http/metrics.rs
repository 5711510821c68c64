use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;
use tutorline_core::{PipelineStats, ReplySource};

// ── Label types ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SourceLabel {
    pub source: String,
}

// ── Metrics registry ───────────────────────────────────────────────────────────

/// Counters are registered without the `_total` suffix; the encoder adds it.
pub struct TutorlineMetrics {
    pub registry: Registry,

    // Pipeline outcomes
    pub replies: Family<SourceLabel, Counter>,
    pub rate_limited: Counter,
    pub validation_rejected: Counter,
    pub provider_latency: Histogram,

    // State gauges, refreshed at scrape time
    pub cache_entries: Gauge,
    pub cache_hits: Gauge,
    pub active_sessions: Gauge,
    pub tracked_callers: Gauge,
    pub uptime_seconds: Gauge,
}

impl TutorlineMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let replies: Family<SourceLabel, Counter> = Family::default();
        registry.register(
            "tutorline_replies",
            "Replies served, by source",
            replies.clone(),
        );

        let rate_limited: Counter = Counter::default();
        registry.register(
            "tutorline_rate_limited",
            "Requests rejected by the rate limiter",
            rate_limited.clone(),
        );

        let validation_rejected: Counter = Counter::default();
        registry.register(
            "tutorline_validation_rejected",
            "Requests rejected for invalid input",
            validation_rejected.clone(),
        );

        let provider_latency = Histogram::new([0.25_f64, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0].into_iter());
        registry.register(
            "tutorline_provider_latency_seconds",
            "Latency of replies that reached the provider, fallbacks included",
            provider_latency.clone(),
        );

        let cache_entries: Gauge = Gauge::default();
        registry.register(
            "tutorline_cache_entries",
            "Entries currently in the response cache",
            cache_entries.clone(),
        );

        let cache_hits: Gauge = Gauge::default();
        registry.register(
            "tutorline_cache_hits",
            "Hits accumulated by live cache entries",
            cache_hits.clone(),
        );

        let active_sessions: Gauge = Gauge::default();
        registry.register(
            "tutorline_active_sessions",
            "Sessions currently held in memory",
            active_sessions.clone(),
        );

        let tracked_callers: Gauge = Gauge::default();
        registry.register(
            "tutorline_rate_limit_tracked_callers",
            "Callers with an open rate-limit record",
            tracked_callers.clone(),
        );

        let uptime_seconds: Gauge = Gauge::default();
        registry.register(
            "tutorline_uptime_seconds",
            "Server uptime in seconds",
            uptime_seconds.clone(),
        );

        Self {
            registry,
            replies,
            rate_limited,
            validation_rejected,
            provider_latency,
            cache_entries,
            cache_hits,
            active_sessions,
            tracked_callers,
            uptime_seconds,
        }
    }

    pub fn observe_reply(&self, source: ReplySource, latency_ms: u64) {
        self.replies
            .get_or_create(&SourceLabel {
                source: source.as_str().to_string(),
            })
            .inc();
        if matches!(source, ReplySource::Provider | ReplySource::Fallback) {
            self.provider_latency.observe(latency_ms as f64 / 1000.0);
        }
    }

    /// Refresh gauges from a stats snapshot and render the text exposition.
    pub fn render(&self, stats: &PipelineStats, uptime_secs: u64) -> Result<String, std::fmt::Error> {
        self.cache_entries.set(stats.cache.size as i64);
        self.cache_hits.set(stats.cache.total_hits as i64);
        self.active_sessions.set(stats.sessions.active_sessions as i64);
        self.tracked_callers.set(stats.rate_limit.tracked_callers as i64);
        self.uptime_seconds.set(uptime_secs as i64);

        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for TutorlineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
