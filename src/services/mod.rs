//! External collaborators the pipeline talks to.
//!
//! Each collaborator is a trait so the pipeline can be exercised with fakes;
//! each submodule is the production implementation over HTTP.
//!
//! | Capability | Trait | Module | Required |
//! |------------|-------|--------|----------|
//! | Trend evidence | [`TrendSource`] | [`google_trends`] | yes |
//! | Image generation | [`ImageGenerator`] | [`gemini`] | yes |
//! | Translation | [`Translator`] | [`deepl`] | no (`DEEPL_API_KEY`) |
//! | Publishing | [`PublishingTarget`] | [`wordpress`] | yes |
//! | Search notification | [`SearchNotifier`] | [`indexnow`] | no (`INDEXNOW_KEY`) |
//! | Social promotion | [`SocialPromoter`] | [`x`] | no (`X_BEARER_TOKEN`) |
//!
//! Text generation lives in [`crate::api`].
//!
//! All traits are `?Send`: the batch runs on a single task.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::models::{
    ArticleContent, ExistingPost, MediaUpload, PostDraft, PublishedPost, RelatedQueries,
};
use crate::utils::truncate_for_log;

pub mod deepl;
pub mod gemini;
pub mod google_trends;
pub mod indexnow;
pub mod wordpress;
pub mod x;

#[async_trait(?Send)]
pub trait TrendSource {
    /// Relative search interest over the last 12 months, oldest first.
    async fn interest_over_time(&self, term: &str) -> Result<Vec<u32>, ServiceError>;
    async fn related_queries(&self, term: &str) -> Result<RelatedQueries, ServiceError>;
    async fn related_topics(&self, term: &str) -> Result<Vec<String>, ServiceError>;
}

/// Raw image payload returned by a generator.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[async_trait(?Send)]
pub trait ImageGenerator {
    /// One prompt per call. `Ok(None)` means the reply carried no image.
    async fn generate(&self, prompt: &str) -> Result<Option<GeneratedImage>, ServiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    Html,
}

#[async_trait(?Send)]
pub trait Translator {
    /// Translate each text into `target_lang`, preserving order.
    async fn translate(
        &self,
        texts: &[String],
        target_lang: &str,
        format: TextFormat,
    ) -> Result<Vec<String>, ServiceError>;
}

#[async_trait(?Send)]
pub trait PublishingTarget {
    async fn upload_media(
        &self,
        bytes: &[u8],
        filename: &str,
        mime_type: &str,
        alt_text: &str,
    ) -> Result<MediaUpload, ServiceError>;

    async fn create_post(&self, draft: &PostDraft) -> Result<PublishedPost, ServiceError>;

    async fn update_post_meta(
        &self,
        post_id: u64,
        meta: &BTreeMap<String, String>,
    ) -> Result<(), ServiceError>;

    async fn recent_posts(&self, count: usize) -> Result<Vec<ExistingPost>, ServiceError>;
}

#[async_trait(?Send)]
pub trait SearchNotifier {
    async fn notify(&self, urls: &[String]) -> Result<(), ServiceError>;
}

#[async_trait(?Send)]
pub trait SocialPromoter {
    async fn promote(&self, content: &ArticleContent, post: &PublishedPost) -> Result<(), ServiceError>;
}

/// Build the shared HTTP client used by every collaborator.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
}

/// Turn a non-2xx response into [`ServiceError::Status`].
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ServiceError::Status {
        status,
        body: truncate_for_log(body.trim(), 300),
    })
}
