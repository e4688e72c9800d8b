//! Session state container.
//!
//! Holds the photo sequence, current phase, retake target, and caption.
//! Enforces the structural invariants (photo cap, caption length, retake
//! index validity); all sequencing logic lives in the orchestrator.

use crate::errors::BoothError;
use crate::types::{BoothPhase, PhotoFrame};
use serde::{Deserialize, Serialize};

/// Snapshot of session state for host-side rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: BoothPhase,
    pub photo_count: usize,
    pub retake_target: Option<usize>,
    pub caption: Option<String>,
}

#[derive(Debug)]
pub struct Session {
    phase: BoothPhase,
    photos: Vec<PhotoFrame>,
    retake_target: Option<usize>,
    caption: Option<String>,
}

impl Session {
    pub const MAX_PHOTOS: usize = 3;
    pub const MAX_CAPTION_CHARS: usize = 60;

    pub fn new() -> Self {
        Self {
            phase: BoothPhase::Idle,
            photos: Vec::with_capacity(Self::MAX_PHOTOS),
            retake_target: None,
            caption: None,
        }
    }

    pub fn phase(&self) -> BoothPhase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: BoothPhase) {
        self.phase = phase;
    }

    pub fn photos(&self) -> &[PhotoFrame] {
        &self.photos
    }

    pub fn caption(&self) -> Option<&str> {
        self.caption.as_deref()
    }

    pub fn retake_target(&self) -> Option<usize> {
        self.retake_target
    }

    /// The photo set is complete when all slots are filled and no retake
    /// is pending. The polling loop keys its stop condition off this, so a
    /// retake-in-progress keeps the loop alive without appending a slot.
    pub fn is_complete(&self) -> bool {
        self.photos.len() == Self::MAX_PHOTOS && self.retake_target.is_none()
    }

    /// Set the caption, truncated to the character cap. `None` clears it.
    pub fn set_caption(&mut self, caption: Option<String>) {
        self.caption = caption
            .filter(|text| !text.is_empty())
            .map(|text| text.chars().take(Self::MAX_CAPTION_CHARS).collect());
    }

    /// Mark a slot for overwrite by the next committed photo.
    pub fn begin_retake(&mut self, index: usize) -> Result<(), BoothError> {
        if index >= self.photos.len() {
            return Err(BoothError::InvalidSlot {
                index,
                count: self.photos.len(),
            });
        }
        self.retake_target = Some(index);
        Ok(())
    }

    /// Commit a captured photo: overwrite the retake target if one is set,
    /// otherwise append. Returns the slot written.
    pub fn commit_photo(&mut self, photo: PhotoFrame) -> Result<usize, BoothError> {
        if let Some(index) = self.retake_target.take() {
            // The target was validated when the retake began, but the
            // sequence cannot have shrunk since photos are never removed
            // outside clear(). Re-check anyway before indexing.
            if index >= self.photos.len() {
                return Err(BoothError::InvalidSlot {
                    index,
                    count: self.photos.len(),
                });
            }
            self.photos[index] = photo;
            return Ok(index);
        }

        if self.photos.len() >= Self::MAX_PHOTOS {
            return Err(BoothError::InvalidPhotoCount {
                expected: Self::MAX_PHOTOS,
                actual: self.photos.len() + 1,
            });
        }
        self.photos.push(photo);
        Ok(self.photos.len() - 1)
    }

    /// Return to a pristine idle session.
    pub fn clear(&mut self) {
        self.phase = BoothPhase::Idle;
        self.photos.clear();
        self.retake_target = None;
        self.caption = None;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            photo_count: self.photos.len(),
            retake_target: self.retake_target,
            caption: self.caption.clone(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
