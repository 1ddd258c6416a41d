//! # trendpress
//!
//! A batch pipeline that researches trending keywords, writes bilingual
//! (English and Korean) blog posts with an LLM, illustrates them with
//! generated images and publishes them to WordPress, keeping a ledger of
//! what was already posted.
//!
//! ## Usage
//!
//! ```sh
//! trendpress --niches-file niches.yaml --report-dir ./reports
//! ```
//!
//! ## Architecture
//!
//! Niches are processed one at a time. For each niche:
//! 1. **Research**: gather Google Trends evidence and let the LLM pick a keyword
//! 2. **Skip check**: stop if the keyword is already in the post history
//! 3. **Content**: generate the article, normalize it, translate it, add the byline
//! 4. **Images**: generate the featured and inline images
//! 5. **Publish**: upload media, create the English and Korean posts, cross-link them
//! 6. **Notify**: IndexNow submission and a promotion tweet (both optional)
//! 7. **Record**: append the post to the history ledger
//!
//! The process exits non-zero when configuration or the ledger fails, or
//! when every attempted niche failed.

use std::error::Error;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod content;
mod error;
mod history;
mod images;
mod json_repair;
mod layout;
mod models;
mod outputs;
mod pipeline;
mod publisher;
mod research;
mod retry;
mod services;
#[cfg(test)]
mod test_support;
mod utils;

use api::{load_llm_config, template_asker};
use cli::Cli;
use config::{Settings, load_niches};
use content::{ContentSettings, ContentWriter};
use error::{ConfigError, describe_error};
use history::PostHistory;
use images::ImageStudio;
use models::BatchReport;
use outputs::json;
use pipeline::BatchDriver;
use publisher::{PublishSettings, Publisher};
use research::{KeywordResearcher, ResearchSettings};
use services::deepl::DeepL;
use services::gemini::GeminiImages;
use services::google_trends::GoogleTrends;
use services::indexnow::IndexNow;
use services::wordpress::WordPress;
use services::x::XPromoter;
use services::{SearchNotifier, SocialPromoter, Translator, http_client};
use utils::ensure_writable_dir;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const LLM_RETRIES: u32 = 2;
const LLM_RETRY_DELAY: Duration = Duration::from_secs(3);
const IMAGE_SPACING: Duration = Duration::from_secs(3);

#[tokio::main]
#[instrument]
async fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("trendpress starting up");
    match dotenv {
        Ok(path) => debug!(path = %path.display(), "Loaded .env"),
        Err(e) if e.not_found() => debug!("No .env file found"),
        Err(e) => warn!(error = %e, "Failed to load .env; continuing with the process environment"),
    }

    let args = Cli::parse();
    debug!(?args.niches_file, ?args.history_file, ?args.report_dir, "Parsed CLI arguments");

    let code = match run(&args).await {
        Ok(report) if report.is_total_failure() => {
            error!(
                failed = report.failure_count,
                total = report.total_niches,
                "Every attempted niche failed"
            );
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %describe_error(e.as_ref()), "Run aborted");
            ExitCode::FAILURE
        }
    };

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    code
}

async fn run(args: &Cli) -> Result<BatchReport, Box<dyn Error>> {
    let settings = Settings::from_cli(args)?;
    let niches = load_niches(&settings.niches_file).await?;

    // Early check: the ledger directory must be writable before anything is published.
    let history_dir = settings
        .history_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    if let Err(e) = ensure_writable_dir(&history_dir.to_string_lossy()).await {
        error!(
            path = %history_dir.display(),
            error = %e,
            "History directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }

    // ---- Text generation ----
    let llm_config = load_llm_config(settings.aj_config.as_deref())?;
    let research_asker = template_asker(
        Arc::clone(&llm_config),
        &settings.research_template,
        LLM_RETRIES,
        LLM_RETRY_DELAY,
    )
    .await?;
    let content_asker = template_asker(llm_config, &settings.content_template, LLM_RETRIES, LLM_RETRY_DELAY).await?;

    // ---- HTTP collaborators ----
    let client = http_client(HTTP_TIMEOUT).map_err(ConfigError::HttpClient)?;
    let trends = GoogleTrends::new(client.clone(), &settings.trends_geo)?;
    let images = GeminiImages::new(client.clone(), &settings.gemini_api_key, &settings.gemini_image_model);
    let wordpress = WordPress::new(
        client.clone(),
        &settings.wp_url,
        &settings.wp_username,
        &settings.wp_app_password,
    );

    let translator: Option<Box<dyn Translator>> = match settings.deepl_api_key.as_deref() {
        Some(key) => {
            info!("DeepL translation enabled");
            Some(Box::new(DeepL::new(client.clone(), key)))
        }
        None => {
            info!("DEEPL_API_KEY not set; Korean fields come from the generator");
            None
        }
    };
    let notifier: Option<Box<dyn SearchNotifier>> = match settings.indexnow_key.as_deref() {
        Some(key) => match IndexNow::new(client.clone(), &settings.wp_url, key) {
            Ok(indexnow) => Some(Box::new(indexnow)),
            Err(e) => {
                warn!(error = %e, "IndexNow disabled");
                None
            }
        },
        None => {
            info!("INDEXNOW_KEY not set; search engine notification disabled");
            None
        }
    };
    let promoter: Option<Box<dyn SocialPromoter>> = match settings.x_bearer_token.as_deref() {
        Some(token) => Some(Box::new(XPromoter::new(client.clone(), token))),
        None => {
            info!("X_BEARER_TOKEN not set; promotion tweets disabled");
            None
        }
    };

    // ---- Pipeline ----
    let researcher = KeywordResearcher::new(Box::new(trends), Box::new(research_asker), ResearchSettings::default());
    let writer = ContentWriter::new(
        Box::new(content_asker),
        translator,
        ContentSettings {
            min_image_prompts: settings.min_image_prompts,
            site_owner: settings.site_owner.clone(),
            ..Default::default()
        },
    );
    let studio = ImageStudio::new(Box::new(images), IMAGE_SPACING);
    let publisher = Publisher::new(Box::new(wordpress), PublishSettings::default());
    let driver = BatchDriver::new(researcher, writer, studio, publisher)
        .with_notifier(notifier)
        .with_promoter(promoter);

    let mut history = PostHistory::load(&settings.history_file).await?;
    let report = driver.run(&niches, &mut history).await?;

    if let Some(report_dir) = &settings.report_dir
        && let Err(e) = json::write_report(&report, report_dir).await
    {
        error!(error = %e, "Failed to write run report");
    }
    Ok(report)
}
