//! Batch driver: runs every niche through research, content, images and
//! publishing, one niche at a time.
//!
//! A niche either ends `SKIPPED`, `RECORDED`, or `FAILED`. Niche-fatal
//! errors ([`PipelineError`]) are caught here and turned into a failed
//! [`NicheResult`]; ledger errors ([`HistoryError`]) abort the run.

use std::fmt;
use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::content::{ContentWriter, select_internal_links};
use crate::error::{HistoryError, PipelineError, describe_error};
use crate::history::PostHistory;
use crate::images::ImageStudio;
use crate::models::{BatchReport, ExistingPost, HistoryEntry, KeywordDecision, NicheConfig, NicheOutcome, NicheResult};
use crate::publisher::{PublishedArticle, Publisher};
use crate::research::KeywordResearcher;
use crate::services::{SearchNotifier, SocialPromoter};

/// How many recent site posts are fetched as internal-link candidates.
pub const RECENT_POSTS_COUNT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NicheStage {
    Pending,
    Researched,
    Skipped,
    ContentGenerated,
    ImagesGenerated,
    Published,
    Linked,
    Notified,
    Recorded,
    Failed,
}

impl fmt::Display for NicheStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NicheStage::Pending => "PENDING",
            NicheStage::Researched => "RESEARCHED",
            NicheStage::Skipped => "SKIPPED",
            NicheStage::ContentGenerated => "CONTENT_GENERATED",
            NicheStage::ImagesGenerated => "IMAGES_GENERATED",
            NicheStage::Published => "PUBLISHED",
            NicheStage::Linked => "LINKED",
            NicheStage::Notified => "NOTIFIED",
            NicheStage::Recorded => "RECORDED",
            NicheStage::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Where a niche got to, kept outside the fallible part so a failure can
/// still report it.
struct Progress {
    stage: NicheStage,
    keyword: String,
}

impl Progress {
    fn advance(&mut self, stage: NicheStage) {
        info!(from = %self.stage, to = %stage, "Niche stage");
        self.stage = stage;
    }
}

enum Processed {
    Skipped,
    Published {
        decision: KeywordDecision,
        article: PublishedArticle,
    },
}

pub struct BatchDriver {
    researcher: KeywordResearcher,
    writer: ContentWriter,
    studio: ImageStudio,
    publisher: Publisher,
    notifier: Option<Box<dyn SearchNotifier>>,
    promoter: Option<Box<dyn SocialPromoter>>,
}

impl BatchDriver {
    pub fn new(researcher: KeywordResearcher, writer: ContentWriter, studio: ImageStudio, publisher: Publisher) -> Self {
        Self {
            researcher,
            writer,
            studio,
            publisher,
            notifier: None,
            promoter: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Option<Box<dyn SearchNotifier>>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_promoter(mut self, promoter: Option<Box<dyn SocialPromoter>>) -> Self {
        self.promoter = promoter;
        self
    }

    /// Process `niches` in order and return the aggregate report.
    ///
    /// The ledger's last-run stamp is written after the last niche whatever
    /// the niches' outcomes. Only ledger persistence errors are returned.
    #[instrument(level = "info", skip_all, fields(niches = niches.len()))]
    pub async fn run(&self, niches: &[NicheConfig], history: &mut PostHistory) -> Result<BatchReport, HistoryError> {
        let started_at = Utc::now();
        let existing = self.publisher.recent_posts(RECENT_POSTS_COUNT).await;

        let mut results = Vec::with_capacity(niches.len());
        for niche in niches {
            let t0 = Instant::now();
            info!(niche = %niche.id, name = %niche.name, "=== Processing niche ===");
            let mut progress = Progress {
                stage: NicheStage::Pending,
                keyword: niche.name.clone(),
            };

            let outcome = match self.process(niche, history, &existing, &mut progress).await {
                Ok(Processed::Skipped) => NicheOutcome::Skipped,
                Ok(Processed::Published { decision, article }) => {
                    history
                        .add_entry(HistoryEntry {
                            keyword: decision.selected_keyword.clone(),
                            niche: Some(niche.id.clone()),
                            content_type: Some(decision.content_type.clone()),
                            post_id: article.english.post_id,
                            post_url: article.english.url.clone(),
                            post_id_kr: article.korean.as_ref().map(|p| p.post_id),
                            post_url_kr: article.korean.as_ref().map(|p| p.url.clone()),
                            published_at: Utc::now(),
                        })
                        .await?;
                    progress.advance(NicheStage::Recorded);
                    NicheOutcome::Published {
                        post_id: article.english.post_id,
                        post_url: article.english.url,
                        post_id_kr: article.korean.as_ref().map(|p| p.post_id),
                        post_url_kr: article.korean.map(|p| p.url),
                    }
                }
                Err(e) => {
                    let message = describe_error(&e);
                    let reached = progress.stage;
                    error!(niche = %niche.name, stage = %reached, error = %message, "Failed to process niche");
                    progress.advance(NicheStage::Failed);
                    NicheOutcome::Failed {
                        error: message,
                        stage: reached.to_string(),
                    }
                }
            };

            results.push(NicheResult {
                niche: niche.id.clone(),
                keyword: progress.keyword,
                outcome,
                duration_ms: t0.elapsed().as_millis() as u64,
            });
        }

        history.update_last_run().await?;
        let report = BatchReport::new(started_at, niches.len(), results);
        log_summary(&report);
        Ok(report)
    }

    #[instrument(level = "info", skip_all, fields(niche = %niche.id))]
    async fn process(
        &self,
        niche: &NicheConfig,
        history: &PostHistory,
        existing: &[ExistingPost],
        progress: &mut Progress,
    ) -> Result<Processed, PipelineError> {
        let posted = history.posted_keywords_for_niche(&niche.id);
        let decision = self.researcher.research(niche, &posted).await?;
        progress.keyword = decision.selected_keyword.clone();
        progress.advance(NicheStage::Researched);

        if history.is_posted(&decision.selected_keyword, Some(&niche.id)) {
            info!(keyword = %decision.selected_keyword, "Keyword already posted for this niche; skipping");
            progress.advance(NicheStage::Skipped);
            return Ok(Processed::Skipped);
        }

        let links = select_internal_links(existing, &niche.category);
        let content = self.writer.write(niche, &decision, &links).await?;
        progress.advance(NicheStage::ContentGenerated);

        let images = self.studio.generate(&content.image_prompts).await;
        progress.advance(NicheStage::ImagesGenerated);

        let keyword = decision.selected_keyword.as_str();
        let Some(featured_asset) = images.featured.as_ref() else {
            return Err(PipelineError::MissingFeaturedImage {
                keyword: keyword.to_string(),
            });
        };
        let featured = self
            .publisher
            .upload_featured(featured_asset, &content, keyword)
            .await
            .map_err(|source| PipelineError::FeaturedUpload {
                keyword: keyword.to_string(),
                source,
            })?;
        let inline = self.publisher.upload_inline(&images, &content, keyword).await;

        let article = self
            .publisher
            .publish(&content, &featured, &inline, &decision.content_type, keyword)
            .await
            .map_err(|source| PipelineError::Publish {
                keyword: keyword.to_string(),
                source,
            })?;
        progress.advance(NicheStage::Published);
        if article.linked {
            progress.advance(NicheStage::Linked);
        }

        if let Some(notifier) = &self.notifier {
            match notifier.notify(&article.urls()).await {
                Ok(()) => info!(urls = article.urls().len(), "Search engines notified"),
                Err(e) => warn!(error = %e, "Search engine notification failed"),
            }
        }
        if let Some(promoter) = &self.promoter
            && let Err(e) = promoter.promote(&content, &article.english).await
        {
            warn!(error = %e, "Social promotion failed");
        }
        progress.advance(NicheStage::Notified);

        Ok(Processed::Published { decision, article })
    }
}

fn log_summary(report: &BatchReport) {
    info!(
        total = report.total_niches,
        success = report.success_count,
        failure = report.failure_count,
        skipped = report.skipped_count,
        "=== Batch complete ==="
    );
    for result in &report.results {
        if result.is_failure() {
            error!("{}", result.summary_line());
        } else {
            info!("{}", result.summary_line());
        }
    }
}
