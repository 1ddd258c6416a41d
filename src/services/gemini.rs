//! Image generation through the Gemini `generateContent` endpoint.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use super::{GeneratedImage, ImageGenerator, check_status};
use crate::error::ServiceError;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp-image-generation";

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

pub struct GeminiImages {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiImages {
    pub fn new(client: Client, api_key: &str, model: &str) -> Self {
        Self::with_base_url(client, api_key, model, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(client: Client, api_key: &str, model: &str, base_url: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait(?Send)]
impl ImageGenerator for GeminiImages {
    #[instrument(level = "debug", skip_all, fields(model = %self.model))]
    async fn generate(&self, prompt: &str) -> Result<Option<GeneratedImage>, ServiceError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] },
        });
        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let parsed: GenerateResponse = check_status(resp).await?.json().await?;

        let inline = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.inline_data.filter(|d| !d.data.is_empty()));

        let Some(inline) = inline else {
            return Ok(None);
        };
        let bytes = STANDARD
            .decode(inline.data.as_bytes())
            .map_err(|e| ServiceError::Malformed {
                service: "gemini",
                detail: format!("image payload is not base64: {e}"),
            })?;
        debug!(bytes = bytes.len(), mime_type = %inline.mime_type, "Received image");
        Ok(Some(GeneratedImage {
            bytes,
            mime_type: inline.mime_type,
        }))
    }
}
