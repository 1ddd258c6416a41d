//! Utility functions for string manipulation, file system checks and
//! best-effort iteration.
//!
//! This module provides helper functions used throughout the application:
//! - String truncation for logging and meta descriptions
//! - Slug and SEO filename generation
//! - JSON error detection for truncated generator responses
//! - File system validation for the ledger and report directories
//! - [`collect_best_effort`], the "process each item, keep what worked" loop

use std::fmt;
use std::future::{self, Future};

use chrono::{Datelike, Utc};
use futures::stream::{self, StreamExt};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (on a char boundary) with an
/// ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Truncate to at most `max_chars` characters, ending with `...` when cut.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let head: String = s.chars().take(keep).collect();
    format!("{}...", head.trim_end())
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// When the generator response is cut off (e.g., due to token limits), the
/// resulting JSON fails with an EOF error.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

pub fn current_year() -> i32 {
    Utc::now().year()
}

/// Derive a post slug from a title.
///
/// Lowercases, strips everything that is not an ASCII letter, digit or
/// whitespace, keeps the first `max_words` words, joins them with hyphens
/// and appends `year` (unless the title already ends with it).
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slugify_title("Best AI Tools: A Guide!", 6, 2026), "best-ai-tools-a-guide-2026");
/// ```
pub fn slugify_title(title: &str, max_words: usize, year: i32) -> String {
    let cleaned: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' { ' ' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();

    let year = year.to_string();
    let mut words: Vec<&str> = cleaned.split_whitespace().take(max_words).collect();
    if words.last() != Some(&year.as_str()) {
        words.push(&year);
    }
    words.join("-")
}

/// Build an SEO-friendly media filename.
///
/// e.g. `("Claude AI: 7 Best Features", "featured", "png")` →
/// `claude-ai-7-best-features-featured-2026.png`
pub fn seo_filename(keyword: &str, suffix: &str, extension: &str, year: i32) -> String {
    let lowered = keyword.to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if (c.is_whitespace() || c == '-') && !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let mut slug: String = slug.chars().take(60).collect();
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        format!("{suffix}-{year}.{extension}")
    } else {
        format!("{slug}-{suffix}-{year}.{extension}")
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then performs a write test by
/// creating and immediately deleting a marker file.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> std::io::Result<()> {
    fs::create_dir_all(path).await?;
    let marker_path = format!("{}/..__write_check__", path.trim_end_matches('/'));
    fs::write(&marker_path, b"").await?;
    let _ = fs::remove_file(&marker_path).await;
    info!("Directory is writable");
    Ok(())
}

/// Run `f` over each item strictly in order and keep only what succeeded.
///
/// `Ok(Some(_))` is collected, `Ok(None)` ("no usable data") is logged at
/// debug level and skipped, `Err(_)` is logged as a warning and skipped. A
/// failing item never stops the items after it.
pub async fn collect_best_effort<T, U, E, I, F, Fut>(what: &str, items: I, mut f: F) -> Vec<U>
where
    I: IntoIterator<Item = T>,
    F: FnMut(usize, T) -> Fut,
    Fut: Future<Output = Result<Option<U>, E>>,
    E: fmt::Display,
{
    stream::iter(items.into_iter().enumerate())
        .then(|(index, item)| {
            let fut = f(index, item);
            async move { (index, fut.await) }
        })
        .filter_map(|(index, result)| {
            let kept = match result {
                Ok(Some(value)) => Some(value),
                Ok(None) => {
                    debug!(what, index, "Item produced no usable data; skipping");
                    None
                }
                Err(e) => {
                    warn!(what, index, error = %e, "Item failed; skipping");
                    None
                }
            };
            future::ready(kept)
        })
        .collect()
        .await
}
