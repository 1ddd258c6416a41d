//! Validated run settings and the niche list.
//!
//! [`Settings::from_cli`] turns raw CLI/env input into settings the rest of
//! the program can trust; [`load_niches`] reads and checks the niches file.
//! Both fail with [`ConfigError`], which ends the run before any niche starts.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

use crate::cli::Cli;
use crate::error::ConfigError;
use crate::models::NicheConfig;

pub const MAX_IMAGE_PROMPTS: usize = 8;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Site root without a trailing slash.
    pub wp_url: String,
    pub wp_username: String,
    pub wp_app_password: String,
    pub gemini_api_key: String,
    pub gemini_image_model: String,
    pub trends_geo: String,
    pub site_owner: Option<String>,
    pub deepl_api_key: Option<String>,
    pub indexnow_key: Option<String>,
    pub x_bearer_token: Option<String>,
    pub niches_file: PathBuf,
    pub history_file: PathBuf,
    pub report_dir: Option<String>,
    pub min_image_prompts: usize,
    pub aj_config: Option<String>,
    pub research_template: String,
    pub content_template: String,
}

fn required(name: &'static str, value: &str) -> Result<String, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Invalid {
            name,
            reason: "must not be empty".to_string(),
        });
    }
    Ok(value.to_string())
}

/// Blank optional values count as unset.
fn optional(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

impl Settings {
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let wp_url = required("WP_URL", &cli.wp_url)?;
        let parsed = Url::parse(&wp_url).map_err(|e| ConfigError::Invalid {
            name: "WP_URL",
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(ConfigError::Invalid {
                name: "WP_URL",
                reason: format!("expected an http(s) site URL, got {wp_url}"),
            });
        }

        if !(1..=MAX_IMAGE_PROMPTS).contains(&cli.min_image_prompts) {
            return Err(ConfigError::Invalid {
                name: "MIN_IMAGE_PROMPTS",
                reason: format!("must be between 1 and {MAX_IMAGE_PROMPTS}, got {}", cli.min_image_prompts),
            });
        }

        Ok(Self {
            wp_url: wp_url.trim_end_matches('/').to_string(),
            wp_username: required("WP_USERNAME", &cli.wp_username)?,
            wp_app_password: required("WP_APP_PASSWORD", &cli.wp_app_password)?,
            gemini_api_key: required("GEMINI_API_KEY", &cli.gemini_api_key)?,
            gemini_image_model: required("GEMINI_IMAGE_MODEL", &cli.gemini_image_model)?,
            trends_geo: required("TRENDS_GEO", &cli.trends_geo)?.to_uppercase(),
            site_owner: optional(cli.site_owner.as_deref()),
            deepl_api_key: optional(cli.deepl_api_key.as_deref()),
            indexnow_key: optional(cli.indexnow_key.as_deref()),
            x_bearer_token: optional(cli.x_bearer_token.as_deref()),
            niches_file: PathBuf::from(required("NICHES_FILE", &cli.niches_file)?),
            history_file: PathBuf::from(required("HISTORY_FILE", &cli.history_file)?),
            report_dir: optional(cli.report_dir.as_deref()),
            min_image_prompts: cli.min_image_prompts,
            aj_config: optional(cli.config.as_deref()),
            research_template: required("RESEARCH_TEMPLATE", &cli.research_template)?,
            content_template: required("CONTENT_TEMPLATE", &cli.content_template)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct NichesFile {
    niches: Vec<NicheConfig>,
}

/// Check the niche list as a whole and each niche on its own.
pub fn validate_niches(niches: &[NicheConfig]) -> Result<(), ConfigError> {
    if niches.is_empty() {
        return Err(ConfigError::Invalid {
            name: "niches",
            reason: "at least one niche is required".to_string(),
        });
    }
    let mut seen = HashSet::new();
    for niche in niches {
        let invalid = |reason: &str| ConfigError::Niche {
            id: niche.id.clone(),
            reason: reason.to_string(),
        };
        if niche.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if !seen.insert(niche.id.as_str()) {
            return Err(invalid("duplicate id"));
        }
        if niche.name.trim().is_empty() || niche.broad_term.trim().is_empty() {
            return Err(invalid("name and broad_term must not be empty"));
        }
        if niche.seed_keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(invalid("at least one seed keyword is required"));
        }
        if niche.content_types.iter().all(|t| t.trim().is_empty()) {
            return Err(invalid("at least one content type is required"));
        }
    }
    Ok(())
}

pub fn parse_niches(yaml: &str, path: &Path) -> Result<Vec<NicheConfig>, ConfigError> {
    let file: NichesFile = serde_yaml::from_str(yaml).map_err(|source| ConfigError::NichesParse {
        path: path.to_path_buf(),
        source,
    })?;
    validate_niches(&file.niches)?;
    Ok(file.niches)
}

#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_niches(path: &Path) -> Result<Vec<NicheConfig>, ConfigError> {
    let yaml = fs::read_to_string(path).await.map_err(|source| ConfigError::NichesRead {
        path: path.to_path_buf(),
        source,
    })?;
    let niches = parse_niches(&yaml, path)?;
    info!(count = niches.len(), ids = ?niches.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(), "Loaded niches");
    Ok(niches)
}
