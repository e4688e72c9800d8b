//! SmileBooth: smile-activated photobooth capture orchestration for Tauri applications
//!
//! This crate drives a webcam photobooth end to end: it samples frames to a
//! remote smile-detection service, runs a countdown-then-capture sequence on
//! detection (or manual trigger), and composes the three captured photos
//! into a downloadable strip.
//!
//! # Features
//! - Smile-driven and manual capture triggers
//! - Race-free orchestration of polling, countdown, retake, and reset
//! - Per-request cancellation of in-flight detection calls
//! - Cosmetic capture filters (grayscale, sepia, blur, vivid)
//! - Vertical strip composition with optional caption
//! - Connectivity health monitoring for the detection backend
//!
//! # Usage
//! Add this to your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! smilebooth = "0.2"
//! tauri = { version = "2.0", features = ["protocol-asset"] }
//! ```
//!
//! Then in your Tauri app:
//! ```rust,ignore
//! fn main() {
//!     tauri::Builder::default()
//!         .plugin(smilebooth::init())
//!         .run(tauri::generate_context!())
//!         .expect("error while running tauri application");
//! }
//! ```
pub mod commands;
pub mod composer;
pub mod config;
pub mod detector;
pub mod errors;
pub mod filters;
pub mod orchestrator;
pub mod session;
pub mod source;
pub mod types;

// Testing utilities - synthetic sources for offline testing
pub mod testing;

// Re-exports for convenience
pub use composer::StripComposer;
pub use config::BoothConfig;
pub use detector::{cancel_pair, CancelHandle, CancelToken, DetectionClient, SmileDetector};
pub use errors::BoothError;
pub use orchestrator::{AlwaysConfirm, BoothOrchestrator, RetakeConfirm};
pub use session::{Session, SessionSnapshot};
pub use source::{CameraSource, FrameSource, FrameStream};
pub use types::{
    BoothEvent, BoothPhase, ConnectivityStatus, FilterKind, PhotoFrame, PhotoStrip, RawFrame,
    Verdict,
};

use tauri::{
    plugin::{Builder, TauriPlugin},
    Runtime,
};

/// Initialize the SmileBooth plugin with all commands
pub fn init<R: Runtime>() -> TauriPlugin<R> {
    Builder::new("smilebooth")
        .invoke_handler(tauri::generate_handler![
            // Lifecycle commands
            commands::booth::initialize_booth,
            commands::booth::shutdown_booth,
            commands::booth::start_session,
            commands::booth::reset_session,
            // Capture commands
            commands::booth::manual_capture,
            commands::booth::retake_photo,
            commands::booth::set_filter,
            commands::booth::list_filters,
            commands::booth::set_caption,
            // Composition commands
            commands::booth::compose_strip,
            commands::booth::save_strip_to_disk,
            // State commands
            commands::booth::get_session_state,
            commands::booth::get_connectivity,
            commands::booth::poll_booth_event,
        ])
        .build()
}

/// Initialize logging for the booth
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "smilebooth=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}
