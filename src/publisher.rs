//! Publish step: media uploads, the English post, the Korean post and the
//! hreflang cross-link between them.
//!
//! Only the featured upload and the English post are allowed to fail the
//! niche. Inline uploads, the Korean post and the cross-link are best-effort.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, instrument, warn};

use crate::error::ServiceError;
use crate::images::GeneratedImages;
use crate::layout::place_inline_images;
use crate::models::{ArticleContent, ExistingPost, ImageAsset, ImageRole, InlineImage, MediaUpload, PostDraft, PublishedPost};
use crate::services::PublishingTarget;
use crate::utils::{collect_best_effort, current_year, seo_filename};

pub const META_HREFLANG_EN: &str = "hreflang_en";
pub const META_HREFLANG_KO: &str = "hreflang_ko";
pub const META_CONTENT_TYPE: &str = "content_type";
pub const META_FOCUS_KEYWORD: &str = "focus_keyword";

#[derive(Debug, Clone)]
pub struct PublishSettings {
    /// Pause between the English and the Korean post.
    pub korean_post_delay: Duration,
    /// Pause before the cross-link metadata update.
    pub cross_link_delay: Duration,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            korean_post_delay: Duration::from_secs(3),
            cross_link_delay: Duration::from_secs(2),
        }
    }
}

/// What went live for one article.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedArticle {
    pub english: PublishedPost,
    pub korean: Option<PublishedPost>,
    /// Whether the hreflang cross-link landed on the English post.
    pub linked: bool,
}

impl PublishedArticle {
    /// URLs to submit to search engines, English first.
    pub fn urls(&self) -> Vec<String> {
        std::iter::once(self.english.url.clone())
            .chain(self.korean.as_ref().map(|p| p.url.clone()))
            .collect()
    }
}

fn base_meta(content_type: &str, keyword: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (META_CONTENT_TYPE.to_string(), content_type.to_string()),
        (META_FOCUS_KEYWORD.to_string(), keyword.to_string()),
    ])
}

fn media_suffix(asset: &ImageAsset) -> String {
    match asset.role {
        ImageRole::Featured => "featured".to_string(),
        ImageRole::Inline(position) => format!("section-{position}"),
    }
}

pub struct Publisher {
    target: Box<dyn PublishingTarget>,
    settings: PublishSettings,
}

impl Publisher {
    pub fn new(target: Box<dyn PublishingTarget>, settings: PublishSettings) -> Self {
        Self { target, settings }
    }

    /// Recent site posts for internal linking. Empty on failure.
    #[instrument(level = "info", skip(self))]
    pub async fn recent_posts(&self, count: usize) -> Vec<ExistingPost> {
        match self.target.recent_posts(count).await {
            Ok(posts) => {
                info!(fetched = posts.len(), "Fetched existing posts for internal linking");
                posts
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch existing posts; continuing without internal links");
                Vec::new()
            }
        }
    }

    async fn upload(&self, asset: &ImageAsset, keyword: &str, alt_text: &str) -> Result<MediaUpload, ServiceError> {
        let filename = seo_filename(keyword, &media_suffix(asset), asset.extension(), current_year());
        let upload = self
            .target
            .upload_media(&asset.bytes, &filename, &asset.mime_type, alt_text)
            .await?;
        info!(%filename, media_id = upload.media_id, "Uploaded image");
        Ok(upload)
    }

    /// Upload the featured image. Its failure fails the niche.
    #[instrument(level = "info", skip_all, fields(keyword = %keyword))]
    pub async fn upload_featured(
        &self,
        asset: &ImageAsset,
        content: &ArticleContent,
        keyword: &str,
    ) -> Result<MediaUpload, ServiceError> {
        self.upload(asset, keyword, &content.caption_for(asset.prompt_index)).await
    }

    /// Upload every inline image, skipping the ones that fail.
    #[instrument(level = "info", skip_all, fields(keyword = %keyword, images = images.inline.len()))]
    pub async fn upload_inline(
        &self,
        images: &GeneratedImages,
        content: &ArticleContent,
        keyword: &str,
    ) -> Vec<InlineImage> {
        collect_best_effort("inline image upload", &images.inline, |_, asset| async move {
            let ImageRole::Inline(position) = asset.role else {
                return Ok(None);
            };
            let caption = content.caption_for(asset.prompt_index);
            let upload = self.upload(asset, keyword, &caption).await?;
            Ok::<_, ServiceError>(Some(InlineImage {
                url: upload.source_url,
                caption,
                position,
            }))
        })
        .await
    }

    #[instrument(level = "info", skip_all, fields(keyword = %keyword))]
    pub async fn publish_english(
        &self,
        content: &ArticleContent,
        featured: &MediaUpload,
        inline: &[InlineImage],
        content_type: &str,
        keyword: &str,
    ) -> Result<PublishedPost, ServiceError> {
        let draft = PostDraft {
            title: content.title.clone(),
            html: place_inline_images(&content.html, inline),
            excerpt: content.excerpt.clone(),
            slug: content.slug.clone(),
            category: content.category.clone(),
            tags: content.tags.clone(),
            featured_media: featured.media_id,
            meta: base_meta(content_type, keyword),
        };
        let post = self.target.create_post(&draft).await?;
        info!(post_id = post.post_id, url = %post.url, "English post published");
        Ok(post)
    }

    /// Create the standalone Korean post linked back to `english`.
    /// Returns `None` when it could not be created.
    #[instrument(level = "info", skip_all, fields(en_post_id = english.post_id))]
    pub async fn publish_korean(
        &self,
        content: &ArticleContent,
        english: &PublishedPost,
        featured: &MediaUpload,
        inline: &[InlineImage],
        content_type: &str,
        keyword: &str,
    ) -> Option<PublishedPost> {
        sleep(self.settings.korean_post_delay).await;

        let mut meta = base_meta(content_type, keyword);
        meta.insert(META_HREFLANG_EN.to_string(), english.url.clone());
        let draft = PostDraft {
            title: content.title_kr.clone(),
            html: place_inline_images(&content.html_kr, inline),
            excerpt: content.excerpt_kr.clone(),
            slug: content.slug.as_ref().map(|slug| format!("{slug}-ko")),
            category: content.category.clone(),
            tags: content.tags_kr.clone(),
            featured_media: featured.media_id,
            meta,
        };
        match self.target.create_post(&draft).await {
            Ok(post) => {
                info!(post_id = post.post_id, url = %post.url, "Korean post published");
                Some(post)
            }
            Err(e) => {
                warn!(error = %e, "Korean post creation failed; the English post stays live");
                None
            }
        }
    }

    /// Point the English post at its Korean twin. Failure is only logged.
    #[instrument(level = "info", skip_all, fields(en_post_id = english.post_id, kr_post_id = korean.post_id))]
    pub async fn link_translations(&self, english: &PublishedPost, korean: &PublishedPost) -> bool {
        sleep(self.settings.cross_link_delay).await;
        let meta = BTreeMap::from([(META_HREFLANG_KO.to_string(), korean.url.clone())]);
        match self.target.update_post_meta(english.post_id, &meta).await {
            Ok(()) => {
                info!("Bilingual posts linked");
                true
            }
            Err(e) => {
                warn!(error = %e, "Cross-link metadata update failed");
                false
            }
        }
    }

    /// English post, then the best-effort Korean post and cross-link.
    pub async fn publish(
        &self,
        content: &ArticleContent,
        featured: &MediaUpload,
        inline: &[InlineImage],
        content_type: &str,
        keyword: &str,
    ) -> Result<PublishedArticle, ServiceError> {
        let english = self
            .publish_english(content, featured, inline, content_type, keyword)
            .await?;
        let korean = self
            .publish_korean(content, &english, featured, inline, content_type, keyword)
            .await;
        let linked = match &korean {
            Some(korean) => self.link_translations(&english, korean).await,
            None => false,
        };
        Ok(PublishedArticle {
            english,
            korean,
            linked,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakePublisher;

    fn settings() -> PublishSettings {
        PublishSettings {
            korean_post_delay: Duration::ZERO,
            cross_link_delay: Duration::ZERO,
        }
    }

    fn asset(bytes: u8, role: ImageRole, prompt_index: usize) -> ImageAsset {
        ImageAsset {
            bytes: vec![bytes],
            mime_type: "image/png".to_string(),
            role,
            prompt_index,
        }
    }

    fn content() -> ArticleContent {
        ArticleContent {
            title: "Budget Meal Prep".to_string(),
            html: "<div><h2>A</h2><!--IMAGE_PLACEHOLDER_1--><h2>B</h2><!--IMAGE_PLACEHOLDER_2--></div>".to_string(),
            excerpt: "Excerpt".to_string(),
            category: "Food".to_string(),
            slug: Some("budget-meal-prep-2026".to_string()),
            title_kr: "예산 식단".to_string(),
            html_kr: "<div><h2>가</h2><!--IMAGE_PLACEHOLDER_1--></div>".to_string(),
            excerpt_kr: "요약".to_string(),
            image_captions: vec!["Hero".to_string(), "First".to_string(), "Second".to_string()],
            ..Default::default()
        }
    }

    fn featured() -> MediaUpload {
        MediaUpload {
            media_id: 1,
            source_url: "https://blog.example/hero.png".to_string(),
        }
    }

    #[tokio::test]
    async fn inline_upload_failures_are_skipped() {
        let target = FakePublisher {
            fail_uploads_matching: Some("section-1".to_string()),
            ..Default::default()
        };
        let log = target.log();
        let publisher = Publisher::new(Box::new(target), settings());
        let images = GeneratedImages {
            featured: Some(asset(0, ImageRole::Featured, 0)),
            inline: vec![asset(1, ImageRole::Inline(1), 1), asset(2, ImageRole::Inline(2), 2)],
        };

        let inline = publisher.upload_inline(&images, &content(), "budget meal prep").await;
        assert_eq!(inline.len(), 1);
        assert_eq!(inline[0].position, 2);
        assert_eq!(inline[0].caption, "Second");
        assert_eq!(
            log.borrow().uploads[0].0,
            format!("budget-meal-prep-section-2-{}.png", current_year())
        );
    }

    #[tokio::test]
    async fn featured_upload_uses_caption_as_alt_text() {
        let target = FakePublisher::default();
        let log = target.log();
        let publisher = Publisher::new(Box::new(target), settings());
        publisher
            .upload_featured(&asset(0, ImageRole::Featured, 0), &content(), "budget meal prep")
            .await
            .unwrap();
        assert_eq!(
            log.borrow().uploads[0],
            (format!("budget-meal-prep-featured-{}.png", current_year()), "Hero".to_string())
        );
    }

    #[tokio::test]
    async fn bilingual_posts_are_cross_linked() {
        let target = FakePublisher::default();
        let log = target.log();
        let publisher = Publisher::new(Box::new(target), settings());
        let inline = vec![InlineImage {
            url: "https://blog.example/first.png".to_string(),
            caption: "First".to_string(),
            position: 1,
        }];

        let article = publisher
            .publish(&content(), &featured(), &inline, "how-to", "budget meal prep")
            .await
            .unwrap();
        let korean = article.korean.clone().unwrap();
        assert!(article.linked);
        assert_eq!(article.urls(), vec![article.english.url.clone(), korean.url.clone()]);

        let log = log.borrow();
        let (en, kr) = (&log.posts[0], &log.posts[1]);
        assert!(en.html.contains("first.png") && !en.html.contains("IMAGE_PLACEHOLDER"));
        assert_eq!(en.meta[META_FOCUS_KEYWORD], "budget meal prep");
        assert_eq!(en.featured_media, 1);
        assert_eq!(kr.slug.as_deref(), Some("budget-meal-prep-2026-ko"));
        assert_eq!(kr.title, "예산 식단");
        assert_eq!(kr.meta[META_HREFLANG_EN], article.english.url);
        assert_eq!(kr.meta[META_CONTENT_TYPE], "how-to");
        assert_eq!(
            log.meta_updates,
            vec![(
                article.english.post_id,
                BTreeMap::from([(META_HREFLANG_KO.to_string(), korean.url)])
            )]
        );
    }

    #[tokio::test]
    async fn korean_failure_keeps_english_post() {
        let target = FakePublisher {
            fail_korean: true,
            ..Default::default()
        };
        let log = target.log();
        let publisher = Publisher::new(Box::new(target), settings());

        let article = publisher
            .publish(&content(), &featured(), &[], "how-to", "budget meal prep")
            .await
            .unwrap();
        assert!(article.korean.is_none());
        assert!(!article.linked);
        assert_eq!(article.urls().len(), 1);
        assert_eq!(log.borrow().posts.len(), 1);
        assert!(log.borrow().meta_updates.is_empty());
    }

    #[tokio::test]
    async fn cross_link_failure_keeps_both_posts() {
        let target = FakePublisher {
            fail_meta: true,
            ..Default::default()
        };
        let log = target.log();
        let publisher = Publisher::new(Box::new(target), settings());

        let article = publisher
            .publish(&content(), &featured(), &[], "how-to", "budget meal prep")
            .await
            .unwrap();
        assert!(article.korean.is_some());
        assert!(!article.linked);
        assert_eq!(article.urls().len(), 2);
        assert_eq!(log.borrow().posts.len(), 2);
        assert!(log.borrow().meta_updates.is_empty());
    }

    #[tokio::test]
    async fn english_failure_is_an_error() {
        let target = FakePublisher {
            fail_all_posts: true,
            ..Default::default()
        };
        let publisher = Publisher::new(Box::new(target), settings());
        let err = publisher
            .publish(&content(), &featured(), &[], "how-to", "k")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "500 Internal Server Error post rejected");
    }

    #[tokio::test]
    async fn recent_posts_failure_is_empty() {
        let target = FakePublisher {
            fail_recent: true,
            ..Default::default()
        };
        let publisher = Publisher::new(Box::new(target), settings());
        assert!(publisher.recent_posts(50).await.is_empty());
    }
}
