//! WordPress REST API (`/wp-json/wp/v2`) with application-password auth.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use scraper::Html;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use super::{PublishingTarget, check_status};
use crate::error::ServiceError;
use crate::models::{ExistingPost, MediaUpload, PostDraft, PublishedPost};
use crate::utils::collect_best_effort;

const MAX_PER_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
struct MediaResponse {
    id: u64,
    #[serde(default)]
    source_url: String,
}

#[derive(Debug, Deserialize)]
struct Term {
    id: u64,
    name: String,
}

/// Body of the 400 WordPress returns when a term with that name exists.
#[derive(Debug, Deserialize)]
struct TermExists {
    code: String,
    data: TermExistsData,
}

#[derive(Debug, Deserialize)]
struct TermExistsData {
    term_id: u64,
}

#[derive(Debug, Serialize)]
struct CreatePost<'a> {
    title: &'a str,
    content: &'a str,
    excerpt: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    slug: Option<&'a str>,
    categories: Vec<u64>,
    tags: Vec<u64>,
    featured_media: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<&'a BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct PostResponse {
    id: u64,
    link: String,
}

#[derive(Debug, Deserialize)]
struct Rendered {
    rendered: String,
}

#[derive(Debug, Deserialize)]
struct RecentPost {
    title: Rendered,
    link: String,
    #[serde(rename = "_embedded", default)]
    embedded: Option<Embedded>,
}

#[derive(Debug, Deserialize)]
struct Embedded {
    #[serde(rename = "wp:term", default)]
    terms: Vec<Vec<EmbeddedTerm>>,
}

#[derive(Debug, Deserialize)]
struct EmbeddedTerm {
    name: String,
    #[serde(default)]
    taxonomy: String,
}

impl RecentPost {
    fn category(&self) -> String {
        self.embedded
            .iter()
            .flat_map(|e| e.terms.iter().flatten())
            .find(|t| t.taxonomy.is_empty() || t.taxonomy == "category")
            .map(|t| decode_entities(&t.name))
            .unwrap_or_default()
    }
}

/// WordPress returns names and titles HTML-escaped (`Food &amp; Drink`).
fn decode_entities(text: &str) -> String {
    Html::parse_fragment(text)
        .root_element()
        .text()
        .collect::<String>()
        .trim()
        .to_string()
}

pub struct WordPress {
    client: Client,
    api_base: String,
    username: String,
    app_password: String,
}

impl WordPress {
    pub fn new(client: Client, site_url: &str, username: &str, app_password: &str) -> Self {
        Self {
            client,
            api_base: format!("{}/wp-json/wp/v2", site_url.trim_end_matches('/')),
            username: username.to_string(),
            app_password: app_password.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.url(path))
            .basic_auth(&self.username, Some(&self.app_password))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .basic_auth(&self.username, Some(&self.app_password))
    }

    /// Find a category or tag by name (case-insensitive), creating it if absent.
    #[instrument(level = "debug", skip(self))]
    async fn resolve_term(&self, taxonomy: &str, name: &str) -> Result<u64, ServiceError> {
        let wanted = name.trim().to_lowercase();
        match self
            .get(taxonomy)
            .query(&[("search", name), ("per_page", "100")])
            .send()
            .await
        {
            Ok(resp) => match check_status(resp).await {
                Ok(resp) => {
                    let terms: Vec<Term> = resp.json().await?;
                    if let Some(term) = terms
                        .iter()
                        .find(|t| decode_entities(&t.name).to_lowercase() == wanted)
                    {
                        return Ok(term.id);
                    }
                }
                Err(e) => debug!(error = %e, "Term search failed; creating instead"),
            },
            Err(e) => debug!(error = %e, "Term search failed; creating instead"),
        }

        let resp = self
            .post(taxonomy)
            .json(&json!({ "name": name.trim() }))
            .send()
            .await?;
        if resp.status() == StatusCode::BAD_REQUEST {
            let body = resp.text().await?;
            return match serde_json::from_str::<TermExists>(&body) {
                Ok(exists) if exists.code == "term_exists" => Ok(exists.data.term_id),
                _ => Err(ServiceError::Status {
                    status: StatusCode::BAD_REQUEST,
                    body,
                }),
            };
        }
        let term: Term = check_status(resp).await?.json().await?;
        info!(taxonomy, id = term.id, name = %term.name, "Created term");
        Ok(term.id)
    }
}

#[async_trait(?Send)]
impl PublishingTarget for WordPress {
    #[instrument(level = "info", skip(self, bytes, alt_text), fields(bytes = bytes.len()))]
    async fn upload_media(
        &self,
        bytes: &[u8],
        filename: &str,
        mime_type: &str,
        alt_text: &str,
    ) -> Result<MediaUpload, ServiceError> {
        let resp = self
            .post("media")
            .header("Content-Type", mime_type)
            .header(
                "Content-Disposition",
                format!("attachment; filename=\"{filename}\""),
            )
            .body(bytes.to_vec())
            .send()
            .await?;
        let media: MediaResponse = check_status(resp).await?.json().await?;
        info!(media_id = media.id, url = %media.source_url, "Media uploaded");

        let meta = self
            .post(&format!("media/{}", media.id))
            .json(&json!({ "alt_text": alt_text, "caption": alt_text }))
            .send()
            .await;
        match meta {
            Ok(resp) => {
                if let Err(e) = check_status(resp).await {
                    warn!(media_id = media.id, error = %e, "Failed to set media alt text");
                }
            }
            Err(e) => warn!(media_id = media.id, error = %e, "Failed to set media alt text"),
        }

        Ok(MediaUpload {
            media_id: media.id,
            source_url: media.source_url,
        })
    }

    #[instrument(level = "info", skip_all, fields(title = %draft.title))]
    async fn create_post(&self, draft: &PostDraft) -> Result<PublishedPost, ServiceError> {
        let category_id = self.resolve_term("categories", &draft.category).await?;
        let tag_ids = collect_best_effort("tag", &draft.tags, |_, tag| async move {
            self.resolve_term("tags", tag).await.map(Some)
        })
        .await;

        let payload = CreatePost {
            title: &draft.title,
            content: &draft.html,
            excerpt: &draft.excerpt,
            status: "publish",
            slug: draft.slug.as_deref(),
            categories: vec![category_id],
            tags: tag_ids,
            featured_media: draft.featured_media,
            meta: (!draft.meta.is_empty()).then_some(&draft.meta),
        };
        let resp = self.post("posts").json(&payload).send().await?;
        let post: PostResponse = check_status(resp).await?.json().await?;
        info!(post_id = post.id, url = %post.link, "Post published");

        Ok(PublishedPost {
            post_id: post.id,
            url: post.link,
            title: draft.title.clone(),
            featured_media_id: draft.featured_media,
        })
    }

    #[instrument(level = "info", skip(self, meta))]
    async fn update_post_meta(
        &self,
        post_id: u64,
        meta: &BTreeMap<String, String>,
    ) -> Result<(), ServiceError> {
        let resp = self
            .post(&format!("posts/{post_id}"))
            .json(&json!({ "meta": meta }))
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    #[instrument(level = "info", skip(self))]
    async fn recent_posts(&self, count: usize) -> Result<Vec<ExistingPost>, ServiceError> {
        let per_page = count.clamp(1, MAX_PER_PAGE).to_string();
        let resp = self
            .get("posts")
            .query(&[
                ("per_page", per_page.as_str()),
                ("status", "publish"),
                ("_embed", "wp:term"),
            ])
            .send()
            .await?;
        let posts: Vec<RecentPost> = check_status(resp).await?.json().await?;
        let posts: Vec<ExistingPost> = posts
            .into_iter()
            .map(|p| ExistingPost {
                category: p.category(),
                title: decode_entities(&p.title.rendered),
                url: p.link,
            })
            .collect();
        info!(count = posts.len(), "Fetched recent posts");
        Ok(posts)
    }
}
