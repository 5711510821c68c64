//! Gemini `generateContent` REST client.

use crate::config::ProviderConfig;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tutorline_core::{
    ChatTurn, Generation, GenerationParams, GenerationRequest, Provider, ProviderError, Role,
};

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];
const SAFETY_THRESHOLD: &str = "BLOCK_ONLY_HIGH";

pub struct GeminiProvider {
    client: Client,
    model: String,
    base_url: String,
    api_key: Option<String>,
}

impl GeminiProvider {
    pub fn new(config: &ProviderConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;

        Ok(Self {
            client,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.resolved_api_key(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate(&self, request: GenerationRequest) -> Result<Generation, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::auth("no API key configured"))?;

        let body = GenerateContentRequest::from_request(&request);
        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::network(format!("request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read body: {}", e)))?;

        if !status.is_success() {
            return Err(map_http_error(status, &text));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::malformed(format!("undecodable response: {}", e)))?;
        extract_generation(parsed)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

impl GenerateContentRequest {
    fn from_request(request: &GenerationRequest) -> Self {
        let mut contents: Vec<Content> = request.history.iter().map(Content::from_turn).collect();
        contents.push(Content::text(Some("user"), &request.message));

        let system_instruction = if request.system_instruction.is_empty() {
            None
        } else {
            Some(Content::text(None, &request.system_instruction))
        };

        Self {
            contents,
            system_instruction,
            generation_config: GenerationConfig::from(&request.params),
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|category| SafetySetting {
                    category,
                    threshold: SAFETY_THRESHOLD,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&'static str>, text: &str) -> Self {
        Self {
            role,
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }

    fn from_turn(turn: &ChatTurn) -> Self {
        let role = match turn.role {
            Role::User => "user",
            Role::Assistant => "model",
        };
        Self::text(Some(role), &turn.content)
    }
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
}

impl From<&GenerationParams> for GenerationConfig {
    fn from(p: &GenerationParams) -> Self {
        Self {
            temperature: p.temperature,
            top_p: p.top_p,
            top_k: p.top_k,
            max_output_tokens: p.max_output_tokens,
            stop_sequences: p.stop_sequences.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Debug, Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

fn extract_generation(response: GenerateContentResponse) -> Result<Generation, ProviderError> {
    let usage = response.usage_metadata.unwrap_or_default();
    let content = response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .and_then(|candidate| candidate.content)
        .ok_or_else(|| ProviderError::malformed("response has no candidates"))?;

    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();

    Ok(Generation {
        text,
        input_tokens: usage.prompt_token_count,
        output_tokens: usage.candidates_token_count,
    })
}

fn map_http_error(status: StatusCode, body: &str) -> ProviderError {
    let (status_text, message) = match serde_json::from_str::<ErrorWrapper>(body) {
        Ok(wrapper) => (
            wrapper.error.status.unwrap_or_default(),
            wrapper.error.message.unwrap_or_else(|| body.to_string()),
        ),
        Err(_) => (String::new(), body.to_string()),
    };
    let message = format!("HTTP {}: {} {}", status.as_u16(), status_text, message);

    if status == StatusCode::TOO_MANY_REQUESTS || status_text == "RESOURCE_EXHAUSTED" {
        ProviderError::quota(message)
    } else if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || body.contains("API_KEY_INVALID")
    {
        ProviderError::auth(message)
    } else {
        ProviderError::network(message)
    }
}
