//! Error taxonomy for the batch.
//!
//! Errors are grouped by how far they are allowed to travel:
//!
//! - [`ServiceError`] and [`ApiError`] come out of external collaborators and
//!   are handled at the nearest boundary (sub-fetch, image, or niche).
//! - [`ResearchError`], [`ContentError`] and [`PipelineError`] abort only the
//!   current niche.
//! - [`ConfigError`] and [`HistoryError`] abort the whole run.

use std::error::Error as StdError;
use std::path::PathBuf;

use thiserror::Error;

use crate::utils::truncate_for_log;

/// Startup configuration problems. Always run-fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("failed to read niches file {}: {source}", path.display())]
    NichesRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse niches file {}: {source}", path.display())]
    NichesParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid niche \"{id}\": {reason}")]
    Niche { id: String, reason: String },

    #[error("text generator setup failed: {0}")]
    TextGenerator(String),

    #[error("HTTP client setup failed: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Ledger persistence failures. Never downgraded to a niche failure.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to read post history {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to move corrupt post history {} aside: {source}", path.display())]
    Quarantine {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write post history {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize post history: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure converting a generated image to WebP.
#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),

    #[error("WebP encoding failed: {0}")]
    Encode(String),
}

/// Failure of a text-generation call.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("text generation failed: {0}")]
    Generation(String),
}

/// Failure of the generator-output repair chain.
#[derive(Debug, Error)]
pub enum RepairError {
    #[error("no JSON object found in generator output")]
    NoObject,

    #[error("incomplete JSON object in generator output")]
    Unbalanced,

    #[error("generator output is not valid JSON after repair: {0}")]
    Invalid(#[source] serde_json::Error),
}

/// Errors from HTTP collaborators (trends, images, translation, WordPress, ...).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{status} {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("malformed response from {service}: {detail}")]
    Malformed {
        service: &'static str,
        detail: String,
    },

    #[error("{service} rejected the request: {detail}")]
    Rejected {
        service: &'static str,
        detail: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("keyword analysis failed for niche \"{niche}\": {source}")]
    Generation {
        niche: String,
        #[source]
        source: ApiError,
    },

    #[error("failed to parse keyword analysis for niche \"{niche}\": {source}")]
    Parse {
        niche: String,
        #[source]
        source: RepairError,
    },

    #[error("keyword analysis for niche \"{niche}\" selected no keyword")]
    EmptyKeyword { niche: String },
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content generation failed for \"{keyword}\": {source}")]
    Generation {
        keyword: String,
        #[source]
        source: ApiError,
    },

    #[error("failed to parse generated content for \"{keyword}\": {source}")]
    Parse {
        keyword: String,
        #[source]
        source: RepairError,
    },

    #[error("incomplete content generated for \"{keyword}\": missing {missing}")]
    Incomplete {
        keyword: String,
        missing: &'static str,
    },
}

/// Niche-fatal failures, caught by the batch driver.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Research(#[from] ResearchError),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error("featured image is required but generation failed for \"{keyword}\"")]
    MissingFeaturedImage { keyword: String },

    #[error("featured image upload failed for \"{keyword}\": {source}")]
    FeaturedUpload {
        keyword: String,
        #[source]
        source: ServiceError,
    },

    #[error("publishing failed for \"{keyword}\": {source}")]
    Publish {
        keyword: String,
        #[source]
        source: ServiceError,
    },
}

/// Render an error and its sources as one line for the run summary.
///
/// Sources already spelled out by their parent's message are not repeated.
pub fn describe_error(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    truncate_for_log(&message, 400)
}
