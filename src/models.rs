//! Data models shared by the pipeline steps.
//!
//! - [`NicheConfig`]: a configured content vertical
//! - [`TrendSignal`] / [`TrendEvidence`]: research evidence, never persisted
//! - [`KeywordDecision`]: what the research step chose for one niche
//! - [`ArticleContent`]: the normalized bilingual article
//! - [`ImageAsset`], [`MediaUpload`], [`PostDraft`], [`PublishedPost`]: the
//!   publishing side
//! - [`HistoryEntry`] / [`HistoryData`]: the persisted ledger
//! - [`NicheResult`] / [`BatchReport`]: the run summary
//!
//! Types that cross the generator or ledger boundary use camelCase field
//! names to match the JSON they are exchanged as.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Static descriptor of a content vertical, loaded from the niches file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NicheConfig {
    pub id: String,
    pub name: String,
    pub category: String,
    /// Broad topic term used for the first trend lookup.
    pub broad_term: String,
    pub seed_keywords: Vec<String>,
    /// Allowed content-type tags, e.g. `how-to`, `best-x-for-y`, `x-vs-y`.
    pub content_types: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Rising,
    #[default]
    Stable,
    Declining,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrendDirection::Rising => "rising",
            TrendDirection::Stable => "stable",
            TrendDirection::Declining => "declining",
        };
        f.write_str(s)
    }
}

/// A related search query with its relative value.
///
/// For rising queries `value` is the growth percentage; Google reports very
/// large growth as `formatted_value == "Breakout"`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct RankedQuery {
    pub query: String,
    pub value: u64,
    pub formatted_value: String,
}

/// Related queries split into steady-state (`top`) and growing (`rising`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RelatedQueries {
    pub top: Vec<RankedQuery>,
    pub rising: Vec<RankedQuery>,
}

/// Trend evidence for one term. Derived fields are computed by the research
/// step from the raw series and query lists.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrendSignal {
    pub term: String,
    pub interest_over_time: Vec<u32>,
    pub related_topics: Vec<String>,
    pub rising_queries: Vec<RankedQuery>,
    pub top_queries: Vec<RankedQuery>,
    pub average_interest: u32,
    pub direction: TrendDirection,
    pub has_breakout: bool,
}

impl TrendSignal {
    pub fn has_queries(&self) -> bool {
        !self.rising_queries.is_empty() || !self.top_queries.is_empty()
    }

    pub fn has_data(&self) -> bool {
        self.has_queries() || !self.interest_over_time.is_empty() || !self.related_topics.is_empty()
    }
}

/// Everything the research step managed to gather for a niche.
#[derive(Debug, Clone, PartialEq)]
pub enum TrendEvidence {
    Signals(Vec<TrendSignal>),
    /// Every trend fetch failed or came back empty.
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Competition {
    Low,
    #[default]
    Medium,
    High,
}

impl<'de> Deserialize<'de> for Competition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.trim().to_lowercase().as_str() {
            "low" | "low-medium" => Competition::Low,
            "high" | "medium-high" => Competition::High,
            _ => Competition::Medium,
        })
    }
}

impl fmt::Display for Competition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Competition::Low => "low",
            Competition::Medium => "medium",
            Competition::High => "high",
        };
        f.write_str(s)
    }
}

/// The keyword chosen for one niche in one run.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordDecision {
    pub selected_keyword: String,
    pub content_type: String,
    #[serde(default)]
    pub suggested_title: String,
    #[serde(default)]
    pub unique_angle: String,
    #[serde(default)]
    pub search_intent: String,
    #[serde(default)]
    pub estimated_competition: Competition,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default, alias = "relatedKeywords")]
    pub related_keywords_to_include: Vec<String>,
}

/// A normalized bilingual article, ready for publishing.
///
/// Korean fields are never empty: they default to the English ones.
/// `image_prompts` and `image_captions` always have at least the configured
/// minimum number of entries.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleContent {
    pub title: String,
    pub html: String,
    pub excerpt: String,
    pub tags: Vec<String>,
    pub category: String,
    pub slug: Option<String>,
    pub title_kr: String,
    pub html_kr: String,
    pub excerpt_kr: String,
    pub tags_kr: Vec<String>,
    pub image_prompts: Vec<String>,
    pub image_captions: Vec<String>,
}

impl ArticleContent {
    /// Caption for the image generated from prompt `index`.
    pub fn caption_for(&self, index: usize) -> String {
        match self.image_captions.get(index) {
            Some(caption) if !caption.trim().is_empty() => caption.clone(),
            _ if index == 0 => self.title.clone(),
            _ => format!("{} image {}", self.title, index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    Featured,
    /// 1-based position among the inline images.
    Inline(usize),
}

/// One accepted image from a generation batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAsset {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub role: ImageRole,
    /// Index of the prompt that produced this image.
    pub prompt_index: usize,
}

impl ImageAsset {
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        }
    }
}

/// Result of uploading one media file.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaUpload {
    pub media_id: u64,
    pub source_url: String,
}

/// An uploaded inline image waiting to be placed in a post body.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    pub url: String,
    pub caption: String,
    /// 1-based placeholder number this image belongs to.
    pub position: usize,
}

/// Fields sent to the publishing target when creating a post.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PostDraft {
    pub title: String,
    pub html: String,
    pub excerpt: String,
    pub slug: Option<String>,
    pub category: String,
    pub tags: Vec<String>,
    pub featured_media: u64,
    pub meta: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedPost {
    pub post_id: u64,
    pub url: String,
    pub title: String,
    pub featured_media_id: u64,
}

/// A post already on the site, offered to the writer as an internal link.
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingPost {
    pub title: String,
    pub url: String,
    pub category: String,
}

/// One persisted record per successfully published article.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub keyword: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub niche: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub post_id: u64,
    pub post_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id_kr: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_url_kr: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// On-disk shape of the ledger file.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryData {
    #[serde(default)]
    pub entries: Vec<HistoryEntry>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_posts: usize,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum NicheOutcome {
    #[serde(rename_all = "camelCase")]
    Published {
        post_id: u64,
        post_url: String,
        post_id_kr: Option<u64>,
        post_url_kr: Option<String>,
    },
    Skipped,
    #[serde(rename_all = "camelCase")]
    Failed { error: String, stage: String },
}

/// Outcome of one niche in one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NicheResult {
    pub niche: String,
    /// Selected keyword, or the niche display name when research never finished.
    pub keyword: String,
    pub outcome: NicheOutcome,
    pub duration_ms: u64,
}

impl NicheResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, NicheOutcome::Published { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, NicheOutcome::Failed { .. })
    }

    /// One-line outcome for the run summary.
    pub fn summary_line(&self) -> String {
        match &self.outcome {
            NicheOutcome::Published {
                post_url,
                post_url_kr,
                ..
            } => {
                let kr = post_url_kr
                    .as_deref()
                    .map(|url| format!(" | KR: {url}"))
                    .unwrap_or_default();
                format!(
                    "[OK] [{}] \"{}\" → {}{} ({}ms)",
                    self.niche, self.keyword, post_url, kr, self.duration_ms
                )
            }
            NicheOutcome::Skipped => {
                format!("[SKIP] [{}] \"{}\" already posted", self.niche, self.keyword)
            }
            NicheOutcome::Failed { error, stage } => {
                format!(
                    "[FAIL] [{}] \"{}\" at {} → {}",
                    self.niche, self.keyword, stage, error
                )
            }
        }
    }
}

/// Aggregate result of one batch invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub total_niches: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub skipped_count: usize,
    pub results: Vec<NicheResult>,
}

impl BatchReport {
    pub fn new(started_at: DateTime<Utc>, total_niches: usize, results: Vec<NicheResult>) -> Self {
        let success_count = results.iter().filter(|r| r.is_success()).count();
        let failure_count = results.iter().filter(|r| r.is_failure()).count();
        let skipped_count = results.len() - success_count - failure_count;
        Self {
            started_at,
            completed_at: Utc::now(),
            total_niches,
            success_count,
            failure_count,
            skipped_count,
            results,
        }
    }

    /// True when nothing was published and at least one niche failed.
    /// Skip-only runs are not failures.
    pub fn is_total_failure(&self) -> bool {
        self.success_count == 0 && self.failure_count > 0
    }
}
