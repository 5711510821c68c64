use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tutorline_core::Pipeline;

/// Which piece of pipeline state a sweeper cleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepTarget {
    Cache,
    Sessions,
    RateLimits,
}

impl SweepTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepTarget::Cache => "cache",
            SweepTarget::Sessions => "sessions",
            SweepTarget::RateLimits => "rate-limits",
        }
    }
}

/// Background task: periodically drops expired state from the pipeline.
pub struct Sweeper {
    pipeline: Arc<Pipeline>,
    target: SweepTarget,
    interval: Duration,
}

impl Sweeper {
    pub fn new(pipeline: Arc<Pipeline>, target: SweepTarget, interval: Duration) -> Self {
        Self {
            pipeline,
            target,
            interval,
        }
    }

    /// One pass; returns how many items were removed.
    pub fn sweep_once(&self) -> usize {
        match self.target {
            SweepTarget::Cache => self.pipeline.cache().purge_expired(),
            SweepTarget::Sessions => self.pipeline.sessions().purge_expired(),
            SweepTarget::RateLimits => self.pipeline.rate_limiter().purge_stale(),
        }
    }

    /// Run the sweep loop. Call via `tokio::spawn`.
    pub async fn run(self) {
        info!(
            "Sweeper started for {} (every {}s)",
            self.target.as_str(),
            self.interval.as_secs()
        );
        loop {
            tokio::time::sleep(self.interval).await;
            match self.sweep_once() {
                0 => debug!("Sweep {}: nothing expired", self.target.as_str()),
                n => info!("Sweep {}: removed {}", self.target.as_str(), n),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tutorline_core::{
        CacheConfig, Generation, GenerationRequest, ManualClock, PipelineConfig, Provider,
        ProviderError, Role,
    };

    struct NoProvider;

    #[async_trait]
    impl Provider for NoProvider {
        fn model(&self) -> &str {
            "none"
        }

        async fn generate(&self, _: GenerationRequest) -> Result<Generation, ProviderError> {
            Err(ProviderError::network("offline"))
        }
    }

    #[test]
    fn test_each_target_sweeps_its_own_state() {
        let clock = Arc::new(ManualClock::default());
        let config =
            PipelineConfig::default().with_cache(CacheConfig::new().with_ttl(Duration::from_secs(60)));
        let pipeline = Arc::new(Pipeline::with_clock(config, Arc::new(NoProvider), clock.clone()));

        pipeline
            .cache()
            .set("how do python decorators work", "wrapping", "tutor");
        pipeline.sessions().add_message("s", Role::User, "hi");
        pipeline.rate_limiter().allow("10.0.0.1");

        clock.advance(Duration::from_secs(2 * 3600));

        let sweep = |target| Sweeper::new(pipeline.clone(), target, Duration::from_secs(1)).sweep_once();
        assert_eq!(sweep(SweepTarget::Cache), 1);
        assert_eq!(sweep(SweepTarget::Sessions), 1);
        assert_eq!(sweep(SweepTarget::RateLimits), 1);
        assert_eq!(sweep(SweepTarget::Cache), 0);
    }
}
