use thiserror::Error;

/// Errors surfaced by the booth library.
///
/// Detection-request failures are deliberately absent: the detection client
/// swallows them and reports `Verdict::NoSmile`, per the failure policy.
#[derive(Debug, Error)]
pub enum BoothError {
    #[error("Device access error: {0}")]
    DeviceAccess(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Composition error: {0}")]
    Composition(String),

    #[error("Strip requires exactly {expected} photos, got {actual}")]
    InvalidPhotoCount { expected: usize, actual: usize },

    #[error("Operation not valid in phase {phase}: {operation}")]
    InvalidPhase { phase: String, operation: String },

    #[error("Photo slot {index} out of range (have {count} photos)")]
    InvalidSlot { index: usize, count: usize },

    #[error("Detection backend is not reachable")]
    DetectorOffline,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BoothError {
    pub fn device_access(msg: impl Into<String>) -> Self {
        BoothError::DeviceAccess(msg.into())
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        BoothError::Capture(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = BoothError::device_access("camera busy");
        assert!(err.to_string().contains("Device access error"));
        assert!(err.to_string().contains("camera busy"));

        let err = BoothError::InvalidPhotoCount {
            expected: 3,
            actual: 2,
        };
        assert!(err.to_string().contains("exactly 3"));
        assert!(err.to_string().contains("got 2"));
    }

    #[test]
    fn test_implements_error_trait() {
        let err = BoothError::DetectorOffline;
        let _as_dyn: &dyn std::error::Error = &err;
    }
}
