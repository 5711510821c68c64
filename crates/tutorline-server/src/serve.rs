use crate::config::TutorlineConfig;
use crate::gemini::GeminiProvider;
use crate::http::{create_router, AppState};
use crate::sweeper::{SweepTarget, Sweeper};
use axum::http::HeaderValue;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};
use tutorline_core::Pipeline;

/// Build the pipeline from config with the Gemini provider behind it.
pub fn build_pipeline(config: &TutorlineConfig) -> anyhow::Result<Arc<Pipeline>> {
    let provider = GeminiProvider::new(&config.provider)?;
    Ok(Arc::new(Pipeline::new(
        config.pipeline.clone(),
        Arc::new(provider),
    )))
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return Ok(layer.allow_origin(Any));
    }
    let origins = origins
        .iter()
        .map(|o| o.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

pub async fn run(config: TutorlineConfig) -> anyhow::Result<()> {
    info!("Starting Tutorline server v{}", env!("CARGO_PKG_VERSION"));

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(anyhow::anyhow!(
            "invalid configuration:\n  - {}",
            errors.join("\n  - ")
        ));
    }

    let pipeline = build_pipeline(&config)?;
    let stats = pipeline.stats();
    if stats.provider_configured {
        info!("Provider: {}", stats.model);
    } else {
        warn!(
            "No API key found (set {} or {}); every reply will be a fallback",
            crate::config::API_KEY_ENV,
            crate::config::GEMINI_KEY_ENV
        );
    }
    info!(
        "Cache: max {} entries, ttl {}s; sessions: ttl {}s, max history {}; rate limit: {} per {}s",
        stats.cache.max_size,
        stats.cache.default_ttl_secs,
        stats.sessions.session_ttl_secs,
        stats.sessions.max_history_length,
        stats.rate_limit.max_requests,
        stats.rate_limit.window_secs
    );

    // Start sweepers
    let sweeps = [
        (SweepTarget::Cache, config.sweeps.cache_interval_secs),
        (SweepTarget::Sessions, config.sweeps.session_interval_secs),
        (SweepTarget::RateLimits, config.sweeps.rate_limit_interval_secs),
    ];
    let sweeper_tasks: Vec<_> = sweeps
        .into_iter()
        .map(|(target, secs)| {
            let sweeper = Sweeper::new(pipeline.clone(), target, Duration::from_secs(secs));
            tokio::spawn(sweeper.run())
        })
        .collect();

    // Start HTTP server
    let app = create_router(AppState::new(pipeline)).layer(cors_layer(&config.server.cors_origins)?);
    let addr = config.http_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP listening on {}", addr);

    let http_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        {
            tracing::error!("HTTP server failed: {}", e);
        }
    });

    info!("Tutorline server ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, terminating...");

    http_task.abort();
    for task in sweeper_tasks {
        task.abort();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_rejects_bad_origin() {
        assert!(cors_layer(&[]).is_ok());
        assert!(cors_layer(&["https://tutor.example".to_string()]).is_ok());
        assert!(cors_layer(&["bad\norigin".to_string()]).is_err());
    }

    #[test]
    fn test_build_pipeline_from_defaults() {
        let pipeline = build_pipeline(&TutorlineConfig::default()).unwrap();
        assert_eq!(pipeline.stats().model, "gemini-1.5-flash");
    }
}
