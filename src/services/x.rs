//! Promotion tweets on X via the v2 API (OAuth 2.0 user token).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use super::{SocialPromoter, check_status};
use crate::error::ServiceError;
use crate::models::{ArticleContent, PublishedPost};
use crate::utils::truncate_with_ellipsis;

pub const DEFAULT_BASE_URL: &str = "https://api.x.com";
pub const MAX_TWEET_CHARS: usize = 280;

#[derive(Debug, Deserialize)]
struct TweetResponse {
    data: TweetData,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
}

/// Title, first sentence of the excerpt, link, up to three hashtags.
///
/// The link and hashtags are never cut; only the title and summary give way
/// when the tweet runs long.
pub fn build_tweet(content: &ArticleContent, url: &str) -> String {
    const SEPARATOR: &str = "\n\n";

    let hashtags = content
        .tags
        .iter()
        .map(|tag| tag.split_whitespace().collect::<String>())
        .filter(|tag| !tag.is_empty())
        .take(3)
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<_>>()
        .join(" ");
    let summary = content.excerpt.split('.').next().unwrap_or_default().trim();

    let mut head = vec![content.title.trim().to_string()];
    if !summary.is_empty() {
        head.push(format!("{summary}."));
    }
    let mut tail = vec![url.to_string()];
    if !hashtags.is_empty() {
        tail.push(hashtags);
    }
    let head = head.join(SEPARATOR);
    let tail = tail.join(SEPARATOR);

    let budget = MAX_TWEET_CHARS.saturating_sub(tail.chars().count() + SEPARATOR.len());
    if budget <= 3 {
        return truncate_with_ellipsis(&tail, MAX_TWEET_CHARS);
    }
    format!("{}{SEPARATOR}{tail}", truncate_with_ellipsis(&head, budget))
}

pub struct XPromoter {
    client: Client,
    bearer_token: String,
    base_url: String,
}

impl XPromoter {
    pub fn new(client: Client, bearer_token: &str) -> Self {
        Self::with_base_url(client, bearer_token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(client: Client, bearer_token: &str, base_url: &str) -> Self {
        Self {
            client,
            bearer_token: bearer_token.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait(?Send)]
impl SocialPromoter for XPromoter {
    #[instrument(level = "info", skip_all, fields(post_id = post.post_id))]
    async fn promote(&self, content: &ArticleContent, post: &PublishedPost) -> Result<(), ServiceError> {
        let text = build_tweet(content, &post.url);
        let resp = self
            .client
            .post(format!("{}/2/tweets", self.base_url))
            .bearer_auth(&self.bearer_token)
            .json(&json!({ "text": text }))
            .send()
            .await?;
        let tweet: TweetResponse = check_status(resp).await?.json().await?;
        info!(tweet_id = %tweet.data.id, "Promotion tweet posted");
        Ok(())
    }
}
