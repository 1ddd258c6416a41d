//! Durable post history used for duplicate suppression.
//!
//! The ledger is a single pretty-printed JSON file. It is read once at
//! startup and rewritten (temp file + rename) after every mutation, so a
//! published article is on disk before the next niche starts.

use std::path::{Path, PathBuf};

use chrono::Utc;
use itertools::Itertools;
use tokio::fs;
use tracing::{info, instrument, warn};

use crate::error::HistoryError;
use crate::models::{HistoryData, HistoryEntry};

fn normalize(keyword: &str) -> String {
    keyword.trim().to_lowercase()
}

#[derive(Debug)]
pub struct PostHistory {
    path: PathBuf,
    data: HistoryData,
}

impl PostHistory {
    /// Load the ledger at `path`.
    ///
    /// A missing file is a fresh start. A file that does not decode is moved
    /// aside to `<path>.corrupt` and also treated as a fresh start. Any other
    /// read failure is returned, since saving over an unread ledger would
    /// lose its history.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let path = path.as_ref().to_path_buf();
        let data = match fs::read(&path).await {
            Ok(raw) => match serde_json::from_slice::<HistoryData>(&raw) {
                Ok(data) => {
                    info!(entries = data.entries.len(), "Loaded post history");
                    data
                }
                Err(e) => {
                    let quarantine = quarantine_path(&path);
                    warn!(error = %e, quarantine = %quarantine.display(), "Post history is corrupt; moving it aside and starting fresh");
                    fs::rename(&path, &quarantine)
                        .await
                        .map_err(|source| HistoryError::Quarantine {
                            path: path.clone(),
                            source,
                        })?;
                    HistoryData::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No existing post history found, starting fresh");
                HistoryData::default()
            }
            Err(source) => return Err(HistoryError::Read { path, source }),
        };
        Ok(Self { path, data })
    }

    /// Exact-title duplicate check, case-insensitive and whitespace-trimmed.
    ///
    /// With `niche` set, only entries recorded for that niche match.
    pub fn is_posted(&self, keyword: &str, niche: Option<&str>) -> bool {
        let wanted = normalize(keyword);
        self.data.entries.iter().any(|entry| {
            normalize(&entry.keyword) == wanted
                && niche.is_none_or(|n| entry.niche.as_deref() == Some(n))
        })
    }

    /// Keywords already used for `niche`, oldest first, without duplicates.
    pub fn posted_keywords_for_niche(&self, niche: &str) -> Vec<String> {
        self.data
            .entries
            .iter()
            .filter(|entry| entry.niche.as_deref() == Some(niche))
            .map(|entry| entry.keyword.trim().to_string())
            .unique_by(|keyword| keyword.to_lowercase())
            .collect()
    }

    pub async fn add_entry(&mut self, entry: HistoryEntry) -> Result<(), HistoryError> {
        info!(keyword = %entry.keyword, post_id = entry.post_id, "Recording post in history");
        self.data.entries.push(entry);
        self.data.total_posts = self.data.entries.len();
        self.save().await
    }

    pub async fn update_last_run(&mut self) -> Result<(), HistoryError> {
        self.data.last_run_at = Some(Utc::now());
        self.save().await
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.data.entries
    }

    pub fn last_run_at(&self) -> Option<chrono::DateTime<Utc>> {
        self.data.last_run_at
    }

    async fn save(&self) -> Result<(), HistoryError> {
        let json = serde_json::to_string_pretty(&self.data)?;
        let write_err = |source| HistoryError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await.map_err(write_err)?;
        fs::rename(&tmp, &self.path).await.map_err(write_err)?;
        Ok(())
    }
}

fn quarantine_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".corrupt");
    PathBuf::from(name)
}
