//! Picking the media file to play for a surface size.

use crate::models::MediaFile;
use crate::surface::{Size, VideoElement};

/// Media files the video element can play natively
pub fn playable_media<'a>(media_files: &'a [MediaFile], video: &dyn VideoElement) -> Vec<&'a MediaFile> {
    media_files
        .iter()
        .filter(|media| !media.is_vpaid() && video.can_play_type(&media.mime_type))
        .collect()
}

/// The file whose width is closest to the surface; the first one wins ties
pub fn best_fit<'a>(candidates: &[&'a MediaFile], size: Size) -> Option<&'a MediaFile> {
    candidates
        .iter()
        .copied()
        .min_by(|a, b| width_delta(a, size).total_cmp(&width_delta(b, size)))
}

/// Width delta first, then the closest aspect ratio
///
/// Not used by default; install it through `Hooks::get_media_file`.
pub fn width_then_aspect_ratio(candidates: &[MediaFile], size: Size) -> Option<MediaFile> {
    let target_ratio = ratio(size.width, size.height);

    candidates
        .iter()
        .min_by(|a, b| {
            width_delta(a, size)
                .total_cmp(&width_delta(b, size))
                .then_with(|| aspect_delta(a, target_ratio).total_cmp(&aspect_delta(b, target_ratio)))
        })
        .cloned()
}

fn width_delta(media: &MediaFile, size: Size) -> f64 {
    (f64::from(media.width.unwrap_or(0)) - size.width).abs()
}

fn aspect_delta(media: &MediaFile, target: f64) -> f64 {
    let width = f64::from(media.width.unwrap_or(0));
    let height = f64::from(media.height.unwrap_or(0));
    (ratio(width, height) - target).abs()
}

fn ratio(width: f64, height: f64) -> f64 {
    if height > 0.0 { width / height } else { 0.0 }
}
