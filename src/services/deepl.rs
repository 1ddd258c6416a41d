//! DeepL translation.
//!
//! Keys ending in `:fx` belong to the free plan and must use the free host.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{TextFormat, Translator, check_status};
use crate::error::ServiceError;

pub const PRO_BASE_URL: &str = "https://api.deepl.com";
pub const FREE_BASE_URL: &str = "https://api-free.deepl.com";

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    text: &'a [String],
    source_lang: &'static str,
    target_lang: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag_handling: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    text: String,
}

pub struct DeepL {
    client: Client,
    api_key: String,
    base_url: String,
}

/// Host matching the key's plan.
pub fn base_url_for_key(api_key: &str) -> &'static str {
    if api_key.trim_end().ends_with(":fx") {
        FREE_BASE_URL
    } else {
        PRO_BASE_URL
    }
}

impl DeepL {
    pub fn new(client: Client, api_key: &str) -> Self {
        Self::with_base_url(client, api_key, base_url_for_key(api_key))
    }

    pub fn with_base_url(client: Client, api_key: &str, base_url: &str) -> Self {
        Self {
            client,
            api_key: api_key.trim().to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait(?Send)]
impl Translator for DeepL {
    #[instrument(level = "debug", skip_all, fields(texts = texts.len(), target_lang = %target_lang, format = ?format))]
    async fn translate(
        &self,
        texts: &[String],
        target_lang: &str,
        format: TextFormat,
    ) -> Result<Vec<String>, ServiceError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = TranslateRequest {
            text: texts,
            source_lang: "EN",
            target_lang: target_lang.to_uppercase(),
            tag_handling: matches!(format, TextFormat::Html).then_some("html"),
        };
        let resp = self
            .client
            .post(format!("{}/v2/translate", self.base_url))
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .json(&request)
            .send()
            .await?;
        let parsed: TranslateResponse = check_status(resp).await?.json().await?;

        if parsed.translations.len() != texts.len() {
            return Err(ServiceError::Malformed {
                service: "deepl",
                detail: format!(
                    "expected {} translations, got {}",
                    texts.len(),
                    parsed.translations.len()
                ),
            });
        }
        debug!(count = parsed.translations.len(), "Translated texts");
        Ok(parsed.translations.into_iter().map(|t| t.text).collect())
    }
}
