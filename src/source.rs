//! Frame acquisition: the seam between the orchestrator and the camera.
//!
//! `FrameSource` opens live streams on demand; `FrameStream` produces still
//! snapshots from an open stream. The production implementation wraps
//! nokhwa; tests use the synthetic source from [`crate::testing`].

use crate::config::CameraSettings;
use crate::errors::BoothError;
use crate::types::RawFrame;
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;
use std::io::Cursor;

/// Opens live frame streams on demand.
///
/// A fresh stream is opened for every capturing session, including retakes.
pub trait FrameSource: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameStream>, BoothError>;
}

/// An open camera stream that can snapshot still frames.
///
/// `snapshot` may block; callers run it on the blocking pool.
pub trait FrameStream: Send {
    fn snapshot(&mut self) -> Result<RawFrame, BoothError>;
    fn stop(&mut self);
}

/// Webcam-backed frame source.
pub struct CameraSource {
    settings: CameraSettings,
}

impl CameraSource {
    pub fn new(settings: CameraSettings) -> Self {
        Self { settings }
    }
}

impl FrameSource for CameraSource {
    fn open(&self) -> Result<Box<dyn FrameStream>, BoothError> {
        let index = CameraIndex::Index(self.settings.device_index);
        let format = CameraFormat::new(
            Resolution::new(self.settings.resolution[0], self.settings.resolution[1]),
            FrameFormat::MJPEG,
            self.settings.fps,
        );
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

        let mut camera = Camera::new(index, requested)
            .map_err(|e| BoothError::device_access(format!("failed to open camera: {}", e)))?;

        camera
            .open_stream()
            .map_err(|e| BoothError::device_access(format!("failed to start stream: {}", e)))?;

        log::info!(
            "Camera stream opened at {}x{}",
            camera.resolution().width(),
            camera.resolution().height()
        );

        // Discard warmup frames while exposure and focus settle.
        for i in 0..self.settings.warmup_frames {
            if let Err(e) = camera.frame() {
                log::debug!("Warmup frame {} failed (normal during startup): {}", i + 1, e);
            }
        }

        Ok(Box::new(CameraStream { camera }))
    }
}

struct CameraStream {
    camera: Camera,
}

impl FrameStream for CameraStream {
    fn snapshot(&mut self) -> Result<RawFrame, BoothError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| BoothError::capture(format!("failed to capture frame: {}", e)))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| BoothError::capture(format!("failed to decode frame: {}", e)))?;

        let (width, height) = decoded.dimensions();
        Ok(RawFrame::new(decoded.into_raw(), width, height))
    }

    fn stop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            log::warn!("Failed to stop camera stream: {}", e);
        }
    }
}

/// Encode an RGB image as JPEG at the given quality.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, BoothError> {
    let mut bytes = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, quality);
    image
        .write_with_encoder(encoder)
        .map_err(|e| BoothError::Encoding(format!("JPEG encoding failed: {}", e)))?;
    Ok(bytes.into_inner())
}

/// Convert a raw RGB frame into an `RgbImage` for filtering or encoding.
pub fn raw_to_image(frame: RawFrame) -> Result<RgbImage, BoothError> {
    let (width, height) = (frame.width, frame.height);
    RgbImage::from_vec(width, height, frame.data)
        .ok_or_else(|| BoothError::capture("frame buffer does not match dimensions"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_encode_jpeg_produces_jpeg_magic() {
        let img = RgbImage::from_pixel(16, 16, Rgb([200, 100, 50]));
        let bytes = encode_jpeg(&img, 90).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]); // SOI marker
    }

    #[test]
    fn test_raw_to_image_round_trip() {
        let raw = RawFrame::new(vec![7u8; 4 * 4 * 3], 4, 4);
        let img = raw_to_image(raw).unwrap();
        assert_eq!(img.dimensions(), (4, 4));
        assert_eq!(img.get_pixel(0, 0), &Rgb([7, 7, 7]));
    }

    #[test]
    fn test_raw_to_image_rejects_bad_buffer() {
        let raw = RawFrame::new(vec![0u8; 10], 4, 4);
        assert!(raw_to_image(raw).is_err());
    }
}
