//! Core data types shared across the booth pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cosmetic filter applied to stored photos at capture time.
///
/// Detection frames are always captured unfiltered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    #[default]
    None,
    Grayscale,
    Sepia,
    Blur,
    Vivid,
}

impl FilterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::None => "none",
            FilterKind::Grayscale => "grayscale",
            FilterKind::Sepia => "sepia",
            FilterKind::Blur => "blur",
            FilterKind::Vivid => "vivid",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "none" => Some(FilterKind::None),
            "grayscale" => Some(FilterKind::Grayscale),
            "sepia" => Some(FilterKind::Sepia),
            "blur" => Some(FilterKind::Blur),
            "vivid" => Some(FilterKind::Vivid),
            _ => None,
        }
    }

    pub fn all() -> &'static [FilterKind] {
        &[
            FilterKind::None,
            FilterKind::Grayscale,
            FilterKind::Sepia,
            FilterKind::Blur,
            FilterKind::Vivid,
        ]
    }
}

/// Session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoothPhase {
    Idle,
    Capturing,
    Preview,
    Final,
}

impl BoothPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoothPhase::Idle => "idle",
            BoothPhase::Capturing => "capturing",
            BoothPhase::Preview => "preview",
            BoothPhase::Final => "final",
        }
    }
}

/// An uncompressed RGB frame straight from the camera stream.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl RawFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

/// A committed photo: JPEG bytes plus the filter applied at capture time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoFrame {
    pub id: Uuid,
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub filter: FilterKind,
    pub captured_at: DateTime<Utc>,
}

impl PhotoFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, filter: FilterKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            data,
            width,
            height,
            filter,
            captured_at: Utc::now(),
        }
    }
}

/// Outcome of one detection request.
///
/// `NoDecision` marks a cancelled request: it is distinguished from
/// `NoSmile` internally but both leave the polling loop unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Smile,
    NoSmile,
    NoDecision,
}

/// Connectivity of the detection backend, as seen by the health monitor.
///
/// Timeout and unreachability differ only in the user-facing message; both
/// gate the manual trigger the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityStatus {
    Connected,
    TimedOut,
    Unreachable,
}

impl ConnectivityStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectivityStatus::Connected)
    }

    pub fn message(&self) -> &'static str {
        match self {
            ConnectivityStatus::Connected => "detection backend connected",
            ConnectivityStatus::TimedOut => "detection backend timed out",
            ConnectivityStatus::Unreachable => "detection backend unreachable",
        }
    }
}

/// Events published by the orchestrator for a rendering layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BoothEvent {
    PhaseChanged { phase: BoothPhase },
    CountdownTick { remaining: u32 },
    PhotoCaptured { slot: usize, count: usize },
    StripComposed { filename: String },
}

/// The composed strip artifact, offered for download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoStrip {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub filename: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_round_trip() {
        for filter in FilterKind::all() {
            assert_eq!(FilterKind::parse(filter.as_str()), Some(*filter));
        }
        assert_eq!(FilterKind::parse("solarize"), None);
    }

    #[test]
    fn test_default_filter_is_none() {
        assert_eq!(FilterKind::default(), FilterKind::None);
    }

    #[test]
    fn test_photo_frame_ids_unique() {
        let a = PhotoFrame::new(vec![1, 2, 3], 4, 4, FilterKind::None);
        let b = PhotoFrame::new(vec![1, 2, 3], 4, 4, FilterKind::None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_connectivity_gating() {
        assert!(ConnectivityStatus::Connected.is_connected());
        assert!(!ConnectivityStatus::TimedOut.is_connected());
        assert!(!ConnectivityStatus::Unreachable.is_connected());
    }

    #[test]
    fn test_phase_serialization() {
        let json = serde_json::to_string(&BoothPhase::Preview).unwrap();
        assert_eq!(json, "\"preview\"");
    }
}
