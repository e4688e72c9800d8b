//! Cosmetic pixel filters applied to stored photos at capture time.
//!
//! Each filter is a pure transform over an RGB image. Detection frames are
//! never filtered; the orchestrator only routes the currently selected
//! filter into the countdown capture path.

use crate::types::FilterKind;
use image::{imageops, Rgb, RgbImage};

/// Apply a cosmetic filter to an RGB image.
pub fn apply(filter: FilterKind, image: RgbImage) -> RgbImage {
    match filter {
        FilterKind::None => image,
        FilterKind::Grayscale => grayscale(image),
        FilterKind::Sepia => sepia(image),
        FilterKind::Blur => imageops::blur(&image, 2.0),
        FilterKind::Vivid => vivid(image),
    }
}

/// Convert RGB to luminance
fn luminance(rgb: &Rgb<u8>) -> f32 {
    0.299 * rgb[0] as f32 + 0.587 * rgb[1] as f32 + 0.114 * rgb[2] as f32
}

fn grayscale(mut image: RgbImage) -> RgbImage {
    for pixel in image.pixels_mut() {
        let lum = luminance(pixel).round().clamp(0.0, 255.0) as u8;
        *pixel = Rgb([lum, lum, lum]);
    }
    image
}

fn sepia(mut image: RgbImage) -> RgbImage {
    for pixel in image.pixels_mut() {
        let (r, g, b) = (pixel[0] as f32, pixel[1] as f32, pixel[2] as f32);
        let out_r = (0.393 * r + 0.769 * g + 0.189 * b).min(255.0);
        let out_g = (0.349 * r + 0.686 * g + 0.168 * b).min(255.0);
        let out_b = (0.272 * r + 0.534 * g + 0.131 * b).min(255.0);
        *pixel = Rgb([out_r as u8, out_g as u8, out_b as u8]);
    }
    image
}

/// Saturation boost: push each channel away from its luminance.
fn vivid(mut image: RgbImage) -> RgbImage {
    const SATURATION: f32 = 1.4;
    for pixel in image.pixels_mut() {
        let lum = luminance(pixel);
        for c in 0..3 {
            let boosted = lum + (pixel[c] as f32 - lum) * SATURATION;
            pixel[c] = boosted.round().clamp(0.0, 255.0) as u8;
        }
    }
    image
}
