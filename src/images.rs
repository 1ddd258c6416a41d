//! Image step: one generator call per prompt, strictly in order.
//!
//! Accepted images are re-encoded as WebP before upload. The encoder steps
//! quality down until the file fits [`WEBP_CEILING_BYTES`], then downscales
//! once if it still does not.

use std::time::Duration;

use image::DynamicImage;
use image::imageops::FilterType;
use tracing::{debug, info, instrument, warn};
use webp::Encoder;

use crate::error::{CompressionError, ServiceError};
use crate::models::{ImageAsset, ImageRole};
use crate::retry::RateLimiter;
use crate::services::{GeneratedImage, ImageGenerator};
use crate::utils::collect_best_effort;

const FEATURED_STYLE: &str = ", digital illustration, wide composition for blog hero banner, vivid colors, high detail, 16:9 aspect ratio, professional editorial quality, no text or watermark";
const INLINE_STYLE: &str = ", digital illustration, clean composition, bright natural lighting, detailed and sharp, editorial blog style, no text or watermark, 16:9 aspect ratio";

pub const WEBP_CEILING_BYTES: usize = 200 * 1024;
const WEBP_MIME: &str = "image/webp";
const START_QUALITY: f32 = 80.0;
const MIN_QUALITY: f32 = 20.0;
const QUALITY_STEP: f32 = 10.0;
const RESIZED_QUALITY: f32 = 75.0;

/// Accepted images of one batch. Either part may be empty.
#[derive(Debug, Default)]
pub struct GeneratedImages {
    pub featured: Option<ImageAsset>,
    pub inline: Vec<ImageAsset>,
}

impl GeneratedImages {
    pub fn count(&self) -> usize {
        usize::from(self.featured.is_some()) + self.inline.len()
    }
}

pub fn styled_prompt(prompt: &str, index: usize) -> String {
    let style = if index == 0 { FEATURED_STYLE } else { INLINE_STYLE };
    format!("{}{style}", prompt.trim_end().trim_end_matches('.'))
}

/// Drop byte-identical repeats, keeping the first occurrence. The first
/// survivor is the featured image; the rest are numbered inline images.
fn assign_roles(generated: Vec<(usize, GeneratedImage)>) -> GeneratedImages {
    let mut accepted: Vec<(usize, GeneratedImage)> = Vec::with_capacity(generated.len());
    for (index, image) in generated {
        if accepted.iter().any(|(_, seen)| seen.bytes == image.bytes) {
            warn!(prompt_index = index, "Generated image duplicates an earlier one; dropping it");
            continue;
        }
        accepted.push((index, image));
    }

    let mut assets = accepted
        .into_iter()
        .enumerate()
        .map(|(position, (prompt_index, image))| ImageAsset {
            bytes: image.bytes,
            mime_type: image.mime_type,
            role: if position == 0 {
                ImageRole::Featured
            } else {
                ImageRole::Inline(position)
            },
            prompt_index,
        });
    GeneratedImages {
        featured: assets.next(),
        inline: assets.collect(),
    }
}

fn encode_webp(image: &DynamicImage, quality: f32) -> Result<Vec<u8>, CompressionError> {
    let rgba = image.to_rgba8();
    Encoder::from_rgba(&rgba, rgba.width(), rgba.height())
        .encode_simple(false, quality)
        .map(|memory| memory.to_vec())
        .map_err(|e| CompressionError::Encode(format!("{e:?}")))
}

/// Re-encode `bytes` as lossy WebP no larger than `ceiling` where possible.
pub fn compress_to_webp(bytes: &[u8], ceiling: usize) -> Result<Vec<u8>, CompressionError> {
    let image = image::load_from_memory(bytes)?;

    let mut quality = START_QUALITY;
    let mut encoded = encode_webp(&image, quality)?;
    while encoded.len() > ceiling && quality > MIN_QUALITY {
        quality -= QUALITY_STEP;
        encoded = encode_webp(&image, quality)?;
    }

    if encoded.len() > ceiling {
        let scale = (ceiling as f64 / encoded.len() as f64).sqrt();
        let width = ((f64::from(image.width()) * scale).round() as u32).max(1);
        let height = ((f64::from(image.height()) * scale).round() as u32).max(1);
        debug!(width, height, bytes = encoded.len(), "Still over the size ceiling; downscaling");
        encoded = encode_webp(&image.resize(width, height, FilterType::Lanczos3), RESIZED_QUALITY)?;
    }

    debug!(
        original_bytes = bytes.len(),
        webp_bytes = encoded.len(),
        quality,
        "Converted image to WebP"
    );
    Ok(encoded)
}

/// WebP version of `asset`, or the asset untouched when conversion fails.
fn into_webp(mut asset: ImageAsset, ceiling: usize) -> ImageAsset {
    match compress_to_webp(&asset.bytes, ceiling) {
        Ok(bytes) => {
            asset.bytes = bytes;
            asset.mime_type = WEBP_MIME.to_string();
        }
        Err(e) => warn!(prompt_index = asset.prompt_index, error = %e, "WebP conversion failed; keeping the original image"),
    }
    asset
}

pub struct ImageStudio {
    generator: Box<dyn ImageGenerator>,
    limiter: RateLimiter,
    webp_ceiling: usize,
}

impl ImageStudio {
    /// `spacing` is the minimum pause between two generator calls.
    pub fn new(generator: Box<dyn ImageGenerator>, spacing: Duration) -> Self {
        Self {
            generator,
            limiter: RateLimiter::new(spacing),
            webp_ceiling: WEBP_CEILING_BYTES,
        }
    }

    #[instrument(level = "info", skip_all, fields(prompts = prompts.len()))]
    pub async fn generate(&self, prompts: &[String]) -> GeneratedImages {
        let generated = collect_best_effort("image prompt", prompts, |index, prompt| async move {
            self.limiter.wait().await;
            let image = self.generator.generate(&styled_prompt(prompt, index)).await?;
            if image.is_none() {
                warn!(prompt_index = index, "Generator returned no image for prompt");
            }
            Ok::<_, ServiceError>(image.map(|image| (index, image)))
        })
        .await;

        let GeneratedImages { featured, inline } = assign_roles(generated);
        let images = GeneratedImages {
            featured: featured.map(|asset| into_webp(asset, self.webp_ceiling)),
            inline: inline
                .into_iter()
                .map(|asset| into_webp(asset, self.webp_ceiling))
                .collect(),
        };
        info!(
            requested = prompts.len(),
            accepted = images.count(),
            featured = images.featured.is_some(),
            "Image generation finished"
        );
        images
    }
}
