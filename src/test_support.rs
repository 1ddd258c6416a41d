//! In-memory fakes for the collaborator traits, shared by the unit tests.
//!
//! Each fake hands out an `Rc<RefCell<..>>` log so a test can keep a handle
//! after boxing the fake into the pipeline.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::rc::Rc;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::api::AskAsync;
use crate::error::{ApiError, ServiceError};
use crate::models::{
    ArticleContent, ExistingPost, MediaUpload, NicheConfig, PostDraft, PublishedPost, RelatedQueries,
};
use crate::services::{
    GeneratedImage, ImageGenerator, PublishingTarget, SearchNotifier, SocialPromoter, TextFormat,
    TrendSource, Translator,
};

pub type Log<T> = Rc<RefCell<Vec<T>>>;

/// The three niches shipped in `niches.yaml`.
pub fn niche(id: &str) -> NicheConfig {
    let (name, category, broad, seeds, types): (&str, &str, &str, &[&str], &[&str]) = match id {
        "food-recipe" => (
            "Food & Recipes",
            "Food",
            "recipes",
            &["easy chicken recipes", "Korean recipes", "Korean street food at home"],
            &["how-to", "best-x-for-y"],
        ),
        "personal-finance" => (
            "Personal Finance",
            "Finance",
            "personal finance",
            &["How to save money", "passive income ideas", "budgeting tips"],
            &["how-to", "best-x-for-y", "x-vs-y"],
        ),
        _ => (
            "AI Tools & Reviews",
            "Technology",
            "AI tools",
            &["Best AI tools for writing", "ChatGPT vs Gemini"],
            &["best-x-for-y", "x-vs-y", "how-to"],
        ),
    };
    NicheConfig {
        id: id.to_string(),
        name: name.to_string(),
        category: category.to_string(),
        broad_term: broad.to_string(),
        seed_keywords: seeds.iter().map(|s| s.to_string()).collect(),
        content_types: types.iter().map(|s| s.to_string()).collect(),
    }
}

fn unavailable(service: &'static str) -> ServiceError {
    ServiceError::Status {
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: format!("{service} unavailable"),
    }
}

#[derive(Default)]
pub struct FakeTrends {
    series: HashMap<String, Vec<u32>>,
    queries: HashMap<String, RelatedQueries>,
    topics: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    calls: Log<String>,
}

impl FakeTrends {
    pub fn with_series(mut self, term: &str, series: Vec<u32>) -> Self {
        self.series.insert(term.to_string(), series);
        self
    }

    pub fn with_queries(mut self, term: &str, queries: RelatedQueries) -> Self {
        self.queries.insert(term.to_string(), queries);
        self
    }

    pub fn with_topics(mut self, term: &str, topics: &[&str]) -> Self {
        self.topics
            .insert(term.to_string(), topics.iter().map(|t| t.to_string()).collect());
        self
    }

    /// Every lookup for `term` fails.
    pub fn failing(mut self, term: &str) -> Self {
        self.failing.insert(term.to_string());
        self
    }

    /// `"<method>:<term>"` per call.
    pub fn calls(&self) -> Log<String> {
        Rc::clone(&self.calls)
    }

    fn record(&self, method: &str, term: &str) -> Result<(), ServiceError> {
        self.calls.borrow_mut().push(format!("{method}:{term}"));
        if self.failing.contains(term) {
            return Err(unavailable("trends"));
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl TrendSource for FakeTrends {
    async fn interest_over_time(&self, term: &str) -> Result<Vec<u32>, ServiceError> {
        self.record("interest_over_time", term)?;
        Ok(self.series.get(term).cloned().unwrap_or_default())
    }

    async fn related_queries(&self, term: &str) -> Result<RelatedQueries, ServiceError> {
        self.record("related_queries", term)?;
        Ok(self.queries.get(term).cloned().unwrap_or_default())
    }

    async fn related_topics(&self, term: &str) -> Result<Vec<String>, ServiceError> {
        self.record("related_topics", term)?;
        Ok(self.topics.get(term).cloned().unwrap_or_default())
    }
}

/// Replies from a script; the last reply repeats once the script runs out.
pub struct ScriptedAsker {
    replies: RefCell<VecDeque<Result<String, String>>>,
    prompts: Log<String>,
}

impl ScriptedAsker {
    pub fn new(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            prompts: Rc::default(),
        }
    }

    pub fn replying(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn failing(message: &str) -> Self {
        Self::new(vec![Err(message.to_string())])
    }

    pub fn prompts(&self) -> Log<String> {
        Rc::clone(&self.prompts)
    }
}

#[async_trait(?Send)]
impl AskAsync for ScriptedAsker {
    async fn ask(&self, prompt: &str) -> Result<String, ApiError> {
        self.prompts.borrow_mut().push(prompt.to_string());
        let mut replies = self.replies.borrow_mut();
        let reply = if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        };
        reply
            .unwrap_or_else(|| Err("no scripted reply".to_string()))
            .map_err(ApiError::Generation)
    }
}

/// Returns scripted image bytes in order, then no image.
pub struct FakeImages {
    outputs: RefCell<VecDeque<Result<Option<Vec<u8>>, String>>>,
    prompts: Log<String>,
}

impl FakeImages {
    pub fn new(outputs: Vec<Result<Option<Vec<u8>>, String>>) -> Self {
        Self {
            outputs: RefCell::new(outputs.into()),
            prompts: Rc::default(),
        }
    }

    /// `count` distinct images.
    pub fn distinct(count: u8) -> Self {
        Self::new((0..count).map(|i| Ok(Some(vec![i; 8]))).collect())
    }

    pub fn prompts(&self) -> Log<String> {
        Rc::clone(&self.prompts)
    }
}

#[async_trait(?Send)]
impl ImageGenerator for FakeImages {
    async fn generate(&self, prompt: &str) -> Result<Option<GeneratedImage>, ServiceError> {
        self.prompts.borrow_mut().push(prompt.to_string());
        match self.outputs.borrow_mut().pop_front() {
            Some(Ok(bytes)) => Ok(bytes.map(|bytes| GeneratedImage {
                bytes,
                mime_type: "image/png".to_string(),
            })),
            Some(Err(detail)) => Err(ServiceError::Malformed {
                service: "images",
                detail,
            }),
            None => Ok(None),
        }
    }
}

/// Prefixes every text with `[ko] `. HTML batches can be made to fail.
#[derive(Default)]
pub struct FakeTranslator {
    pub fail_html: bool,
    pub(crate) calls: Log<(usize, TextFormat)>,
}

impl FakeTranslator {
    pub fn calls(&self) -> Log<(usize, TextFormat)> {
        Rc::clone(&self.calls)
    }
}

#[async_trait(?Send)]
impl Translator for FakeTranslator {
    async fn translate(
        &self,
        texts: &[String],
        target_lang: &str,
        format: TextFormat,
    ) -> Result<Vec<String>, ServiceError> {
        assert_eq!(target_lang, "KO");
        self.calls.borrow_mut().push((texts.len(), format));
        if self.fail_html && format == TextFormat::Html {
            return Err(unavailable("translator"));
        }
        Ok(texts.iter().map(|t| format!("[ko] {t}")).collect())
    }
}

#[derive(Debug, Default)]
pub struct PublisherLog {
    /// `(filename, alt_text)` per upload.
    pub uploads: Vec<(String, String)>,
    pub posts: Vec<PostDraft>,
    pub meta_updates: Vec<(u64, BTreeMap<String, String>)>,
    pub recent_requests: usize,
}

#[derive(Default)]
pub struct FakePublisher {
    /// Fail drafts whose slug ends with `-ko`.
    pub fail_korean: bool,
    pub fail_all_posts: bool,
    /// Fail uploads whose filename contains this text.
    pub fail_uploads_matching: Option<String>,
    pub fail_recent: bool,
    pub fail_meta: bool,
    pub recent: Vec<ExistingPost>,
    pub(crate) next_id: Cell<u64>,
    pub(crate) log: Rc<RefCell<PublisherLog>>,
}

impl FakePublisher {
    pub fn log(&self) -> Rc<RefCell<PublisherLog>> {
        Rc::clone(&self.log)
    }

    fn next_id(&self) -> u64 {
        let id = self.next_id.get() + 100;
        self.next_id.set(self.next_id.get() + 1);
        id
    }
}

#[async_trait(?Send)]
impl PublishingTarget for FakePublisher {
    async fn upload_media(
        &self,
        _bytes: &[u8],
        filename: &str,
        _mime_type: &str,
        alt_text: &str,
    ) -> Result<MediaUpload, ServiceError> {
        if let Some(pattern) = &self.fail_uploads_matching
            && filename.contains(pattern.as_str())
        {
            return Err(unavailable("media"));
        }
        self.log
            .borrow_mut()
            .uploads
            .push((filename.to_string(), alt_text.to_string()));
        let media_id = self.next_id();
        Ok(MediaUpload {
            media_id,
            source_url: format!("https://blog.example/uploads/{filename}"),
        })
    }

    async fn create_post(&self, draft: &PostDraft) -> Result<PublishedPost, ServiceError> {
        let korean = draft.slug.as_deref().is_some_and(|s| s.ends_with("-ko"));
        if self.fail_all_posts || (self.fail_korean && korean) {
            return Err(ServiceError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: "post rejected".to_string(),
            });
        }
        self.log.borrow_mut().posts.push(draft.clone());
        let post_id = self.next_id();
        Ok(PublishedPost {
            post_id,
            url: format!("https://blog.example/{}/", draft.slug.as_deref().unwrap_or("post")),
            title: draft.title.clone(),
            featured_media_id: draft.featured_media,
        })
    }

    async fn update_post_meta(&self, post_id: u64, meta: &BTreeMap<String, String>) -> Result<(), ServiceError> {
        if self.fail_meta {
            return Err(unavailable("post meta"));
        }
        self.log.borrow_mut().meta_updates.push((post_id, meta.clone()));
        Ok(())
    }

    async fn recent_posts(&self, count: usize) -> Result<Vec<ExistingPost>, ServiceError> {
        self.log.borrow_mut().recent_requests += 1;
        if self.fail_recent {
            return Err(unavailable("posts"));
        }
        Ok(self.recent.iter().take(count).cloned().collect())
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    pub fail: bool,
    pub(crate) calls: Log<Vec<String>>,
}

impl FakeNotifier {
    pub fn calls(&self) -> Log<Vec<String>> {
        Rc::clone(&self.calls)
    }
}

#[async_trait(?Send)]
impl SearchNotifier for FakeNotifier {
    async fn notify(&self, urls: &[String]) -> Result<(), ServiceError> {
        self.calls.borrow_mut().push(urls.to_vec());
        if self.fail {
            return Err(unavailable("indexnow"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePromoter {
    pub fail: bool,
    pub(crate) calls: Log<u64>,
}

impl FakePromoter {
    pub fn calls(&self) -> Log<u64> {
        Rc::clone(&self.calls)
    }
}

#[async_trait(?Send)]
impl SocialPromoter for FakePromoter {
    async fn promote(&self, _content: &ArticleContent, post: &PublishedPost) -> Result<(), ServiceError> {
        self.calls.borrow_mut().push(post.post_id);
        if self.fail {
            return Err(ServiceError::Rejected {
                service: "x",
                detail: "duplicate content".to_string(),
            });
        }
        Ok(())
    }
}
