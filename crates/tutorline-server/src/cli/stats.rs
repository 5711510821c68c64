use crate::cli::{connect_error, read_envelope};
use anyhow::Result;
use serde::Deserialize;

#[derive(Deserialize)]
struct StatsData {
    cache: CacheData,
    sessions: SessionData,
    rate_limit: RateLimitData,
    model: String,
    provider_configured: bool,
}

#[derive(Deserialize)]
struct CacheData {
    size: usize,
    max_size: usize,
    total_hits: u64,
    oldest_entry_age_ms: i64,
    default_ttl_secs: u64,
}

#[derive(Deserialize)]
struct SessionData {
    active_sessions: usize,
    session_ttl_secs: u64,
    max_history_length: usize,
}

#[derive(Deserialize)]
struct RateLimitData {
    tracked_callers: usize,
    window_secs: u64,
    max_requests: u32,
}

pub async fn run(server: &str) -> Result<()> {
    let url = format!("{}/stats", server.trim_end_matches('/'));
    let resp = reqwest::get(&url).await.map_err(|e| connect_error(server, e))?;
    let stats: StatsData = read_envelope(resp).await?;

    let configured = if stats.provider_configured {
        "configured"
    } else {
        "NOT configured"
    };

    println!();
    println!("Pipeline Overview");
    println!("{}", "─".repeat(50));
    println!("Model:    {} ({})", stats.model, configured);
    println!("Cache:    {:>6} / {} entries", stats.cache.size, stats.cache.max_size);
    println!("  {:16} {:>8}", "total hits", stats.cache.total_hits);
    println!(
        "  {:16} {:>7.1}s",
        "oldest entry",
        stats.cache.oldest_entry_age_ms as f64 / 1000.0
    );
    println!("  {:16} {:>7}s", "ttl", stats.cache.default_ttl_secs);
    println!("Sessions: {:>6}", stats.sessions.active_sessions);
    println!("  {:16} {:>7}s", "ttl", stats.sessions.session_ttl_secs);
    println!("  {:16} {:>8}", "max history", stats.sessions.max_history_length);
    println!("Callers:  {:>6}", stats.rate_limit.tracked_callers);
    println!(
        "  {:16} {:>8}",
        "limit",
        format!("{}/{}s", stats.rate_limit.max_requests, stats.rate_limit.window_secs)
    );
    println!("{}", "─".repeat(50));
    println!();

    Ok(())
}
