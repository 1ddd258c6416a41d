//! Content step: keyword decision in, normalized bilingual article out.
//!
//! The generator's JSON is parsed leniently ([`GeneratedArticle`] has no
//! required fields) and then normalized into an [`ArticleContent`] that the
//! rest of the pipeline can rely on. Only a missing title or body is fatal.

use itertools::Itertools;
use scraper::Html;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::api::AskAsync;
use crate::error::ContentError;
use crate::json_repair::parse_generated;
use crate::layout::{Language, append_byline};
use crate::models::{ArticleContent, ExistingPost, KeywordDecision, NicheConfig};
use crate::services::{TextFormat, Translator};
use crate::utils::{current_year, slugify_title, truncate_with_ellipsis};

const SAME_CATEGORY_LINKS: usize = 15;
const OTHER_CATEGORY_LINKS: usize = 10;
const TARGET_LANG: &str = "KO";

#[derive(Debug, Clone)]
pub struct ContentSettings {
    pub min_image_prompts: usize,
    /// Byline name appended to both bodies when set.
    pub site_owner: Option<String>,
    /// Meta description budget in characters.
    pub excerpt_budget: usize,
    /// Excerpts shorter than this are logged as a quality warning.
    pub excerpt_floor: usize,
    pub slug_words: usize,
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self {
            min_image_prompts: 4,
            site_owner: None,
            excerpt_budget: 160,
            excerpt_floor: 70,
            slug_words: 6,
        }
    }
}

/// Article as the generator returned it. Every field may be missing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GeneratedArticle {
    title: Option<String>,
    #[serde(alias = "content")]
    html: Option<String>,
    excerpt: Option<String>,
    tags: Option<Vec<String>>,
    category: Option<String>,
    slug: Option<String>,
    title_kr: Option<String>,
    html_kr: Option<String>,
    excerpt_kr: Option<String>,
    tags_kr: Option<Vec<String>>,
    image_prompts: Option<Vec<String>>,
    image_captions: Option<Vec<String>>,
}

fn non_blank(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

impl From<GeneratedArticle> for ArticleContent {
    fn from(raw: GeneratedArticle) -> Self {
        let clean_list = |list: Option<Vec<String>>| -> Vec<String> {
            list.unwrap_or_default()
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };
        ArticleContent {
            title: non_blank(raw.title),
            html: non_blank(raw.html),
            excerpt: non_blank(raw.excerpt),
            tags: clean_list(raw.tags),
            category: non_blank(raw.category),
            slug: raw.slug.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            title_kr: non_blank(raw.title_kr),
            html_kr: non_blank(raw.html_kr),
            excerpt_kr: non_blank(raw.excerpt_kr),
            tags_kr: clean_list(raw.tags_kr),
            image_prompts: clean_list(raw.image_prompts),
            // Blank captions keep their slot so they stay aligned with prompts.
            image_captions: raw
                .image_captions
                .unwrap_or_default()
                .into_iter()
                .map(|s| s.trim().to_string())
                .collect(),
        }
    }
}

/// Plain text of an HTML fragment, whitespace collapsed.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    fragment.root_element().text().flat_map(str::split_whitespace).join(" ")
}

/// Fill every gap in `content` so downstream steps can rely on it.
///
/// Idempotent: running it on its own output changes nothing.
pub fn normalize(
    content: &mut ArticleContent,
    keyword: &str,
    niche: &NicheConfig,
    settings: &ContentSettings,
) -> Result<(), ContentError> {
    if content.title.is_empty() {
        return Err(ContentError::Incomplete {
            keyword: keyword.to_string(),
            missing: "title",
        });
    }
    if content.html.is_empty() {
        return Err(ContentError::Incomplete {
            keyword: keyword.to_string(),
            missing: "html",
        });
    }

    normalize_images(content, keyword, settings.min_image_prompts);

    if content.category.is_empty() {
        warn!(fallback = %niche.category, "No category generated; using the niche category");
        content.category = niche.category.clone();
    }

    if content.slug.is_none() {
        let slug = slugify_title(&content.title, settings.slug_words, current_year());
        info!(%slug, "Derived slug from title");
        content.slug = Some(slug);
    }

    if content.excerpt.is_empty() {
        warn!("No excerpt generated; deriving one from the body");
        content.excerpt = html_to_text(&content.html);
    }
    content.excerpt = checked_excerpt(&content.excerpt, settings, "excerpt");

    if content.title_kr.is_empty() {
        warn!("Korean title missing; using the English title");
        content.title_kr = content.title.clone();
    }
    if content.html_kr.is_empty() {
        warn!("Korean body missing; using the English body");
        content.html_kr = content.html.clone();
    }
    if content.excerpt_kr.is_empty() {
        content.excerpt_kr = content.excerpt.clone();
    }
    if content.tags_kr.is_empty() {
        if !content.tags.is_empty() {
            warn!("Korean tags missing; using the English tags");
        }
        content.tags_kr = content.tags.clone();
    }
    Ok(())
}

fn checked_excerpt(excerpt: &str, settings: &ContentSettings, field: &str) -> String {
    let length = excerpt.chars().count();
    if length > settings.excerpt_budget {
        warn!(field, length, budget = settings.excerpt_budget, "Excerpt over budget; truncating");
        return truncate_with_ellipsis(excerpt, settings.excerpt_budget);
    }
    if length < settings.excerpt_floor {
        warn!(field, length, floor = settings.excerpt_floor, "Excerpt is short for a meta description");
    }
    excerpt.to_string()
}

/// Align captions with prompts, then pad both to `minimum`.
fn normalize_images(content: &mut ArticleContent, keyword: &str, minimum: usize) {
    if content.image_captions.iter().all(|c| c.is_empty()) && !content.image_prompts.is_empty() {
        warn!("No image captions generated; deriving them from the title");
    }
    let captions: Vec<String> = (0..content.image_prompts.len())
        .map(|i| content.caption_for(i))
        .collect();
    content.image_captions = captions;

    while content.image_prompts.len() < minimum {
        warn!(
            have = content.image_prompts.len(),
            minimum, "Too few image prompts; padding with a generic prompt"
        );
        content
            .image_prompts
            .push(format!("Detailed illustration related to {keyword}, vivid colors, editorial style"));
        content.image_captions.push(format!("{} related image", content.title));
    }
}

/// Internal-link candidates: same-category posts first, then a few others.
pub fn select_internal_links(posts: &[ExistingPost], category: &str) -> Vec<ExistingPost> {
    let (same, other): (Vec<&ExistingPost>, Vec<&ExistingPost>) = posts
        .iter()
        .partition(|p| p.category.eq_ignore_ascii_case(category));
    same.into_iter()
        .take(SAME_CATEGORY_LINKS)
        .chain(other.into_iter().take(OTHER_CATEGORY_LINKS))
        .cloned()
        .collect()
}

pub fn build_content_prompt(niche: &NicheConfig, decision: &KeywordDecision, links: &[ExistingPost]) -> String {
    let related = decision.related_keywords_to_include.join(", ");
    let mut prompt = format!(
        "Niche: \"{name}\" ({category})
Content Type: {content_type}
Primary Keyword: \"{keyword}\"
Suggested Title: \"{title}\"
Unique Angle: {angle}
Search Intent: {intent}
Related Keywords to Include: {related}

Write an in-depth {content_type} blog post about \"{keyword}\" for the {name} niche.
Use the unique angle: \"{angle}\"
Naturally incorporate these related keywords: {related}",
        name = niche.name,
        category = niche.category,
        content_type = decision.content_type,
        keyword = decision.selected_keyword,
        title = decision.suggested_title,
        angle = decision.unique_angle,
        intent = decision.search_intent,
    );

    if !links.is_empty() {
        prompt.push_str(
            "\n\n## Existing posts on this site\nWhere genuinely relevant, link to 2-3 of these with natural anchor text. Never invent other URLs.\n",
        );
        for post in links {
            prompt.push_str(&format!("- \"{}\" ({}) {}\n", post.title, post.category, post.url));
        }
    }
    prompt.push_str("\nRespond with pure JSON only.");
    prompt
}

pub struct ContentWriter {
    asker: Box<dyn AskAsync>,
    translator: Option<Box<dyn Translator>>,
    settings: ContentSettings,
}

impl ContentWriter {
    pub fn new(asker: Box<dyn AskAsync>, translator: Option<Box<dyn Translator>>, settings: ContentSettings) -> Self {
        Self {
            asker,
            translator,
            settings,
        }
    }

    #[instrument(level = "info", skip_all, fields(niche = %niche.id, keyword = %decision.selected_keyword))]
    pub async fn write(
        &self,
        niche: &NicheConfig,
        decision: &KeywordDecision,
        links: &[ExistingPost],
    ) -> Result<ArticleContent, ContentError> {
        let keyword = decision.selected_keyword.as_str();
        let prompt = build_content_prompt(niche, decision, links);
        let reply = self
            .asker
            .ask(&prompt)
            .await
            .map_err(|source| ContentError::Generation {
                keyword: keyword.to_string(),
                source,
            })?;
        let raw: GeneratedArticle = parse_generated(&reply).map_err(|source| ContentError::Parse {
            keyword: keyword.to_string(),
            source,
        })?;

        let mut content = ArticleContent::from(raw);
        normalize(&mut content, keyword, niche, &self.settings)?;
        if let Some(translator) = &self.translator {
            self.translate(translator.as_ref(), &mut content).await;
        }
        self.add_byline(&mut content);

        info!(title = %content.title, html_chars = content.html.len(), "Content generated");
        Ok(content)
    }

    /// Overwrite the Korean fields with machine translations of the English
    /// ones. A field whose translation fails keeps its current value.
    async fn translate(&self, translator: &dyn Translator, content: &mut ArticleContent) {
        info!("Translating content to Korean");
        let single = |field: &'static str, text: &str, format| {
            let texts = vec![text.to_string()];
            async move {
                match translator.translate(&texts, TARGET_LANG, format).await {
                    Ok(mut out) if out.len() == 1 => out.pop(),
                    Ok(_) => {
                        warn!(field, "Translation returned the wrong number of texts; keeping fallback");
                        None
                    }
                    Err(e) => {
                        warn!(field, error = %e, "Translation failed; keeping fallback");
                        None
                    }
                }
            }
        };

        if let Some(html) = single("html", &content.html, TextFormat::Html).await {
            content.html_kr = html;
        }
        if let Some(title) = single("title", &content.title, TextFormat::Plain).await {
            content.title_kr = title;
        }
        if let Some(excerpt) = single("excerpt", &content.excerpt, TextFormat::Plain).await {
            content.excerpt_kr = checked_excerpt(&excerpt, &self.settings, "excerpt_kr");
        }
        if !content.tags.is_empty() {
            match translator.translate(&content.tags, TARGET_LANG, TextFormat::Plain).await {
                Ok(tags) if tags.len() == content.tags.len() => content.tags_kr = tags,
                Ok(_) => warn!(field = "tags", "Translation returned the wrong number of tags; keeping fallback"),
                Err(e) => warn!(field = "tags", error = %e, "Translation failed; keeping fallback"),
            }
        }
    }

    fn add_byline(&self, content: &mut ArticleContent) {
        if let Some(owner) = self.settings.site_owner.as_deref() {
            content.html = append_byline(&content.html, owner, Language::English);
            content.html_kr = append_byline(&content.html_kr, owner, Language::Korean);
        }
    }
}
