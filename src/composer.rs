//! Strip composition.
//!
//! Takes exactly three captured photos and lays them out vertically on a
//! fixed-size canvas, each in its own bordered region, preserving capture
//! order top to bottom. An optional caption is rendered centered beneath
//! the last frame; the canvas grows by a fixed band to make room for it.
//! The three JPEG decodes run as independent blocking tasks and are joined
//! explicitly before any compositing happens.

use crate::config::StripSettings;
use crate::errors::BoothError;
use crate::session::Session;
use crate::source::encode_jpeg;
use crate::types::{PhotoFrame, PhotoStrip};
use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use chrono::{Local, Utc};
use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use std::path::PathBuf;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const INK: Rgb<u8> = Rgb([40, 40, 40]);

/// Font locations tried when none is configured.
const DEFAULT_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

pub struct StripComposer {
    settings: StripSettings,
}

impl StripComposer {
    pub fn new(settings: StripSettings) -> Self {
        Self { settings }
    }

    /// Compose the strip from exactly three photos.
    pub async fn compose(
        &self,
        photos: &[PhotoFrame],
        caption: Option<&str>,
    ) -> Result<PhotoStrip, BoothError> {
        if photos.len() != Session::MAX_PHOTOS {
            return Err(BoothError::InvalidPhotoCount {
                expected: Session::MAX_PHOTOS,
                actual: photos.len(),
            });
        }

        let decode = |bytes: Vec<u8>| {
            tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
        };

        // Explicit join over the three decodes; completion order is
        // irrelevant, the strip is only rendered once all have loaded.
        let (first, second, third) = tokio::try_join!(
            decode(photos[0].data.clone()),
            decode(photos[1].data.clone()),
            decode(photos[2].data.clone()),
        )
        .map_err(|e| BoothError::Composition(format!("decode task failed: {}", e)))?;

        let mut frames = Vec::with_capacity(Session::MAX_PHOTOS);
        for result in [first, second, third] {
            let decoded = result
                .map_err(|e| BoothError::Composition(format!("photo decode failed: {}", e)))?;
            frames.push(decoded.to_rgb8());
        }

        let settings = self.settings.clone();
        let caption = caption
            .map(|text| text.chars().take(Session::MAX_CAPTION_CHARS).collect::<String>())
            .filter(|text| !text.is_empty());

        tokio::task::spawn_blocking(move || render(&settings, &frames, caption.as_deref()))
            .await
            .map_err(|e| BoothError::Composition(format!("render task failed: {}", e)))?
    }
}

fn render(
    settings: &StripSettings,
    frames: &[RgbImage],
    caption: Option<&str>,
) -> Result<PhotoStrip, BoothError> {
    let frame_w = settings.frame_width;
    let frame_h = settings.frame_height;
    let border = settings.border;

    let width = frame_w + 2 * border;
    let base_height = 3 * frame_h + 4 * border;
    let height = if caption.is_some() {
        base_height + settings.caption_height
    } else {
        base_height
    };

    let mut canvas = RgbImage::from_pixel(width, height, BACKGROUND);

    for (i, frame) in frames.iter().enumerate() {
        let resized = imageops::resize(frame, frame_w, frame_h, FilterType::Triangle);
        let x = border as i64;
        let y = (border + i as u32 * (frame_h + border)) as i64;
        imageops::replace(&mut canvas, &resized, x, y);
    }

    if let Some(text) = caption {
        match load_font(settings.caption_font.as_deref()) {
            Some(font) => draw_caption(
                &mut canvas,
                &font,
                text,
                settings.caption_px,
                base_height,
                settings.caption_height,
            ),
            None => log::warn!("No caption font available; leaving caption band empty"),
        }
    }

    let data = encode_jpeg(&canvas, settings.jpeg_quality)?;
    let filename = format!(
        "{}_{}.jpg",
        settings.filename_prefix,
        Local::now().format("%Y%m%d_%H%M%S")
    );

    Ok(PhotoStrip {
        data,
        width,
        height,
        filename,
        created_at: Utc::now(),
    })
}

fn load_font(configured: Option<&str>) -> Option<FontVec> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(path) = configured {
        candidates.push(PathBuf::from(path));
    }
    candidates.extend(DEFAULT_FONT_PATHS.iter().map(PathBuf::from));

    for path in candidates {
        if let Ok(bytes) = std::fs::read(&path) {
            match FontVec::try_from_vec(bytes) {
                Ok(font) => {
                    log::debug!("Caption font loaded from {:?}", path);
                    return Some(font);
                }
                Err(e) => log::warn!("Unusable caption font {:?}: {}", path, e),
            }
        }
    }
    None
}

/// Rasterize the caption centered inside the band at the bottom of the
/// canvas, coverage-blended over the background.
fn draw_caption(
    canvas: &mut RgbImage,
    font: &FontVec,
    text: &str,
    px: f32,
    band_top: u32,
    band_height: u32,
) {
    let scale = PxScale::from(px);
    let scaled = font.as_scaled(scale);

    let mut text_width = 0.0f32;
    let mut prev = None;
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(p) = prev {
            text_width += scaled.kern(p, id);
        }
        text_width += scaled.h_advance(id);
        prev = Some(id);
    }

    let start_x = ((canvas.width() as f32 - text_width) / 2.0).max(0.0);
    let text_height = scaled.ascent() - scaled.descent();
    let baseline_y =
        band_top as f32 + (band_height as f32 - text_height) / 2.0 + scaled.ascent();

    let (canvas_w, canvas_h) = canvas.dimensions();
    let mut caret = start_x;
    let mut prev = None;
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(p) = prev {
            caret += scaled.kern(p, id);
        }
        let glyph = id.with_scale_and_position(scale, ab_glyph::point(caret, baseline_y));
        caret += scaled.h_advance(id);
        prev = Some(id);

        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let x = bounds.min.x as i32 + gx as i32;
                let y = bounds.min.y as i32 + gy as i32;
                if x >= 0 && y >= 0 && (x as u32) < canvas_w && (y as u32) < canvas_h {
                    let pixel = canvas.get_pixel_mut(x as u32, y as u32);
                    for c in 0..3 {
                        let background = pixel[c] as f32;
                        let blended = background + (INK[c] as f32 - background) * coverage;
                        pixel[c] = blended.round().clamp(0.0, 255.0) as u8;
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FilterKind;

    fn photo(color: Rgb<u8>) -> PhotoFrame {
        let img = RgbImage::from_pixel(32, 24, color);
        let bytes = encode_jpeg(&img, 90).unwrap();
        PhotoFrame::new(bytes, 32, 24, FilterKind::None)
    }

    fn settings() -> StripSettings {
        StripSettings {
            frame_width: 64,
            frame_height: 48,
            border: 4,
            caption_height: 20,
            caption_px: 12.0,
            caption_font: None,
            jpeg_quality: 90,
            filename_prefix: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_compose_requires_three_photos() {
        let composer = StripComposer::new(settings());
        let photos = vec![photo(Rgb([200, 0, 0])), photo(Rgb([0, 200, 0]))];
        let result = composer.compose(&photos, None).await;
        assert!(matches!(
            result,
            Err(BoothError::InvalidPhotoCount { actual: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_compose_layout_without_caption() {
        let composer = StripComposer::new(settings());
        let photos = vec![
            photo(Rgb([200, 0, 0])),
            photo(Rgb([0, 200, 0])),
            photo(Rgb([0, 0, 200])),
        ];
        let strip = composer.compose(&photos, None).await.unwrap();
        assert_eq!(strip.width, 64 + 8);
        assert_eq!(strip.height, 3 * 48 + 4 * 4);
        assert_eq!(&strip.data[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_caption_grows_canvas() {
        let composer = StripComposer::new(settings());
        let photos = vec![
            photo(Rgb([200, 0, 0])),
            photo(Rgb([0, 200, 0])),
            photo(Rgb([0, 0, 200])),
        ];
        let plain = composer.compose(&photos, None).await.unwrap();
        let captioned = composer.compose(&photos, Some("Hello")).await.unwrap();
        assert_eq!(captioned.height, plain.height + 20);
    }

    #[tokio::test]
    async fn test_capture_order_preserved_top_to_bottom() {
        let composer = StripComposer::new(settings());
        let photos = vec![
            photo(Rgb([200, 0, 0])),
            photo(Rgb([0, 200, 0])),
            photo(Rgb([0, 0, 200])),
        ];
        let strip = composer.compose(&photos, None).await.unwrap();
        let canvas = image::load_from_memory(&strip.data).unwrap().to_rgb8();

        // Sample the center of each photo region: red, then green, then blue.
        let cx = strip.width / 2;
        let checks = [(4 + 24, 0usize), (4 + 48 + 4 + 24, 1), (4 + 2 * (48 + 4) + 24, 2)];
        for (cy, channel) in checks {
            let pixel = canvas.get_pixel(cx, cy as u32);
            // JPEG is lossy; just check the dominant channel.
            assert!(
                pixel[channel] > 100,
                "region at y={} expected channel {} bright, got {:?}",
                cy,
                channel,
                pixel
            );
        }
    }

    #[tokio::test]
    async fn test_long_caption_truncated() {
        let composer = StripComposer::new(settings());
        let photos = vec![
            photo(Rgb([200, 0, 0])),
            photo(Rgb([0, 200, 0])),
            photo(Rgb([0, 0, 200])),
        ];
        // Must not panic or overflow the canvas.
        let caption = "x".repeat(200);
        let strip = composer.compose(&photos, Some(&caption)).await.unwrap();
        assert_eq!(strip.height, 3 * 48 + 4 * 4 + 20);
    }

    #[test]
    fn test_filename_has_prefix_and_extension() {
        let strip = render(
            &settings(),
            &[
                RgbImage::from_pixel(8, 8, Rgb([1, 2, 3])),
                RgbImage::from_pixel(8, 8, Rgb([1, 2, 3])),
                RgbImage::from_pixel(8, 8, Rgb([1, 2, 3])),
            ],
            None,
        )
        .unwrap();
        assert!(strip.filename.starts_with("test_"));
        assert!(strip.filename.ends_with(".jpg"));
    }
}
