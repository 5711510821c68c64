pub mod ask;
pub mod config_cmd;
pub mod stats;

use clap::{Args, Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tutorline")]
#[command(version, about = "Throttled, cached, context-aware tutoring chat server")]
pub struct Cli {
    /// Path to tutorline.toml
    #[arg(
        long,
        global = true,
        env = "TUTORLINE_CONFIG",
        default_value = "tutorline.toml"
    )]
    pub config: PathBuf,

    /// Tutorline server address for client commands
    #[arg(
        long,
        global = true,
        env = "TUTORLINE_ADDR",
        default_value = "http://localhost:5000"
    )]
    pub server: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    Serve,
    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Cache, session and rate-limit statistics from a running server
    Stats,
    /// Send one chat message to a running server
    Ask(AskArgs),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    Validate,
    Show,
}

#[derive(Args, Debug)]
pub struct AskArgs {
    /// The question to send
    pub message: String,
    /// Keep context across invocations under this session id
    #[arg(long)]
    pub session: Option<String>,
    /// Interaction mode, e.g. "tutor" or "debug"
    #[arg(long)]
    pub mode: Option<String>,
    /// "brief" or "detailed"
    #[arg(long)]
    pub style: Option<String>,
    /// Ask for a numbered step-by-step answer
    #[arg(long)]
    pub steps: bool,
}

/// Envelope returned by the server's JSON routes.
#[derive(Deserialize, Debug)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

/// Turn a server response into `T`, surfacing the server's error text.
pub async fn read_envelope<T: DeserializeOwned>(resp: reqwest::Response) -> anyhow::Result<T> {
    let status = resp.status();
    let envelope: Envelope<T> = resp
        .json()
        .await
        .map_err(|e| anyhow::anyhow!("Unexpected response (HTTP {}): {}", status, e))?;

    match (envelope.success, envelope.data) {
        (true, Some(data)) => Ok(data),
        _ => Err(anyhow::anyhow!(
            "Server error (HTTP {}): {}",
            status,
            envelope.error.unwrap_or_else(|| "unknown error".to_string())
        )),
    }
}

pub fn connect_error(server: &str, e: reqwest::Error) -> anyhow::Error {
    anyhow::anyhow!(
        "Failed to reach Tutorline server at {}: {}\nIs `tutorline serve` running?",
        server,
        e
    )
}
