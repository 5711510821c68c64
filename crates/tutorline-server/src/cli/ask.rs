use crate::cli::{connect_error, AskArgs};
use anyhow::Result;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct ChatResponse {
    success: bool,
    reply: Option<String>,
    #[serde(default)]
    cached: bool,
    source: Option<String>,
    error: Option<String>,
}

pub async fn run(args: AskArgs, server: &str) -> Result<()> {
    let mut options = serde_json::Map::new();
    if let Some(style) = &args.style {
        if style != "brief" && style != "detailed" {
            anyhow::bail!("--style must be \"brief\" or \"detailed\", got {:?}", style);
        }
        options.insert("style".into(), json!(style));
    }
    if args.steps {
        options.insert("format".into(), json!("steps"));
    }

    let body = json!({
        "message": args.message,
        "session_id": args.session,
        "mode": args.mode,
        "options": options,
    });

    let url = format!("{}/api/ai/chat", server.trim_end_matches('/'));
    let resp = reqwest::Client::new()
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|e| connect_error(server, e))?;
    let status = resp.status();
    let chat: ChatResponse = resp
        .json()
        .await
        .map_err(|e| anyhow::anyhow!("Unexpected response (HTTP {}): {}", status, e))?;

    match (chat.success, chat.reply) {
        (true, Some(reply)) => {
            println!("{}", reply);
            let source = chat.source.unwrap_or_default();
            if chat.cached {
                eprintln!("\n({}, cached)", source);
            } else {
                eprintln!("\n({})", source);
            }
            Ok(())
        }
        _ => Err(anyhow::anyhow!(
            "Server error (HTTP {}): {}",
            status,
            chat.error.unwrap_or_else(|| "unknown error".to_string())
        )),
    }
}
