//! HTML assembly for post bodies: image figures, placeholder placement and
//! the author byline.
//!
//! Generated bodies are a single wrapper `<div>` with `<h2>` sections and
//! `<!--IMAGE_PLACEHOLDER_N-->` comments marking where inline image N goes.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::models::InlineImage;

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!--\s*IMAGE_PLACEHOLDER_(\d+)\s*-->").expect("valid placeholder regex"));

const BYLINE_CLASS: &str = "trendpress-byline";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    English,
    Korean,
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

pub fn figure_block(url: &str, caption: &str) -> String {
    let caption = escape_html(caption);
    format!(
        r#"<figure style="margin:30px 0; text-align:center;"><img src="{}" alt="{caption}" style="max-width:100%; height:auto; border-radius:8px;" /><figcaption style="margin-top:8px; font-size:13px; color:#888;">{caption}</figcaption></figure>"#,
        escape_html(url)
    )
}

pub fn byline_block(owner: &str, language: Language) -> String {
    let initial = owner
        .trim()
        .chars()
        .next()
        .map(|c| c.to_uppercase().collect::<String>())
        .unwrap_or_default();
    let (label, role) = match language {
        Language::English => ("Written by:", "Trend Analysis Expert"),
        Language::Korean => ("작성자:", "트렌드 분석 전문가"),
    };
    format!(
        concat!(
            r#"<div class="{class}" style="margin:30px 0 0 0; padding:20px 24px; background:#f8f9fa; border-radius:8px; display:flex; align-items:center; gap:16px;">"#,
            r#"<div style="width:48px; height:48px; background:#0066FF; border-radius:50%; display:flex; align-items:center; justify-content:center; color:#fff; font-size:20px; font-weight:700; flex-shrink:0;">{initial}</div>"#,
            r#"<div><p style="margin:0; font-weight:700; font-size:15px; color:#222;">{label} {owner}</p>"#,
            r#"<p style="margin:4px 0 0 0; font-size:13px; color:#888;">{role}</p></div></div>"#
        ),
        class = BYLINE_CLASS,
        initial = escape_html(&initial),
        label = label,
        owner = escape_html(owner.trim()),
        role = role,
    )
}

pub fn has_byline(html: &str) -> bool {
    html.contains(BYLINE_CLASS)
}

/// Insert the byline as the last element of the outermost wrapper.
///
/// Goes right before the last `</div>`, or at the end when there is none.
/// A body that already carries a byline is returned unchanged.
pub fn append_byline(html: &str, owner: &str, language: Language) -> String {
    if owner.trim().is_empty() || has_byline(html) {
        return html.to_string();
    }
    let block = byline_block(owner, language);
    match html.rfind("</div>") {
        Some(idx) => format!("{}{}\n{}", &html[..idx], block, &html[idx..]),
        None => format!("{html}{block}"),
    }
}

/// Insert `block` at the end of the content: before the byline if there is
/// one, else before the closing wrapper, else at the very end.
pub fn insert_before_tail(html: &str, block: &str) -> String {
    let anchor = html
        .find(&format!("<div class=\"{BYLINE_CLASS}\""))
        .or_else(|| html.rfind("</div>"));
    match anchor {
        Some(idx) => format!("{}{}\n{}", &html[..idx], block, &html[idx..]),
        None => format!("{html}\n{block}"),
    }
}

/// Byte offset just past the `n`th (1-based) `</h2>`.
fn after_nth_heading(html: &str, n: usize) -> Option<usize> {
    html.match_indices("</h2>")
        .nth(n.checked_sub(1)?)
        .map(|(idx, tag)| idx + tag.len())
}

fn placeholder_span(html: &str, position: usize) -> Option<(usize, usize)> {
    PLACEHOLDER_RE
        .captures_iter(html)
        .find(|caps| caps[1].parse::<usize>().ok() == Some(position))
        .and_then(|caps| caps.get(0))
        .map(|m| (m.start(), m.end()))
}

/// Place every uploaded inline image into `html`.
///
/// Image N replaces `<!--IMAGE_PLACEHOLDER_N-->`. Without that placeholder it
/// goes after the Nth `</h2>`, and without enough headings before the end of
/// the content. Placeholders left over afterwards are removed.
pub fn place_inline_images(html: &str, images: &[InlineImage]) -> String {
    let mut body = html.to_string();
    for image in images {
        let figure = figure_block(&image.url, &image.caption);
        if let Some((start, end)) = placeholder_span(&body, image.position) {
            body.replace_range(start..end, &figure);
            debug!(position = image.position, "Image placed at placeholder");
        } else if let Some(idx) = after_nth_heading(&body, image.position) {
            warn!(position = image.position, "Image placeholder missing; placing after heading");
            body.insert_str(idx, &format!("\n{figure}"));
        } else {
            warn!(position = image.position, "Image placeholder and heading missing; placing at end");
            body = insert_before_tail(&body, &figure);
        }
    }
    PLACEHOLDER_RE.replace_all(&body, "").into_owned()
}
