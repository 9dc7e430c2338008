//! Test fixtures: configurations and image bytes.

use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::Path;

use crate::config::{RunConfig, RunPolicy, TopicConfig};

/// A black PNG of `width` x `height`.
#[must_use]
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    tagged_png(width, height, b"")
}

/// A PNG whose leading pixels carry `tag`, so different tags encode to
/// different bytes.
#[must_use]
pub fn tagged_png(width: u32, height: u32, tag: &[u8]) -> Vec<u8> {
    let mut image = RgbImage::new(width, height);
    for (channel, byte) in image.iter_mut().zip(tag) {
        *channel = *byte;
    }
    encode(&DynamicImage::ImageRgb8(image), ImageFormat::Png)
}

/// A black baseline JPEG of `width` x `height`.
#[must_use]
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(
        &DynamicImage::ImageRgb8(RgbImage::new(width, height)),
        ImageFormat::Jpeg,
    )
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    match image.write_to(&mut cursor, format) {
        Ok(()) => cursor.into_inner(),
        Err(e) => {
            tracing::error!(error = %e, ?format, "Failed to encode fixture image");
            Vec::new()
        }
    }
}

/// A policy with millisecond backoff for tests.
#[must_use]
pub fn fast_policy() -> RunPolicy {
    RunPolicy::new()
        .with_max_retries(2)
        .with_base_delay_ms(1)
        .with_max_delay_ms(4)
        .with_stage_timeout_ms(5_000)
}

/// A run over `labels`, each with the query `"{label} news"`, writing to
/// `root`.
#[must_use]
pub fn sample_config(root: &Path, labels: &[&str]) -> RunConfig {
    let config = RunConfig::new(root)
        .with_sites(&["techcrunch.com", "theverge.com", "wired.com"])
        .with_modifiers(&["latest", "announcement"])
        .with_seed(7)
        .with_policy(fast_policy());
    labels.iter().fold(config, |config, label| {
        let query = format!("{label} news");
        config.with_topic(TopicConfig::new(*label, &[query.as_str()]))
    })
}
