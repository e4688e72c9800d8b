//! Tauri commands exposing the booth to the webview UI.
//!
//! One booth per process; commands go through a global registry. The UI is
//! expected to run its own confirmation dialog before invoking
//! `retake_photo`, so the registry wires `AlwaysConfirm` into the
//! orchestrator.

use crate::config::BoothConfig;
use crate::detector::DetectionClient;
use crate::orchestrator::{AlwaysConfirm, BoothOrchestrator};
use crate::session::SessionSnapshot;
use crate::source::CameraSource;
use crate::types::{BoothEvent, ConnectivityStatus, FilterKind, PhotoStrip};
use std::sync::Arc;
use tauri::command;
use tokio::sync::{broadcast, Mutex, RwLock};

struct BoothHandle {
    orchestrator: BoothOrchestrator<DetectionClient>,
    events: Mutex<broadcast::Receiver<BoothEvent>>,
}

lazy_static::lazy_static! {
    static ref BOOTH: Arc<RwLock<Option<BoothHandle>>> = Arc::new(RwLock::new(None));
}

async fn orchestrator() -> Result<BoothOrchestrator<DetectionClient>, String> {
    let guard = BOOTH.read().await;
    guard
        .as_ref()
        .map(|handle| handle.orchestrator.clone())
        .ok_or_else(|| "Booth not initialized".to_string())
}

/// Initialize the booth from a config file (or defaults when absent).
#[command]
pub async fn initialize_booth(config_path: Option<String>) -> Result<String, String> {
    let mut guard = BOOTH.write().await;
    if guard.is_some() {
        return Ok("Booth already initialized".to_string());
    }

    let config = match config_path {
        Some(path) => BoothConfig::load_from_file(path).map_err(|e| e.to_string())?,
        None => BoothConfig::load_or_default(),
    };
    config
        .validate()
        .map_err(|e| format!("Invalid configuration: {}", e))?;

    let client = DetectionClient::new(config.detector.clone()).map_err(|e| e.to_string())?;
    let connectivity = client.spawn_health_monitor();
    let source = Arc::new(CameraSource::new(config.camera.clone()));

    let orchestrator = BoothOrchestrator::new(
        source,
        Arc::new(client),
        connectivity,
        Arc::new(AlwaysConfirm),
        &config,
    );
    let events = Mutex::new(orchestrator.subscribe());

    *guard = Some(BoothHandle {
        orchestrator,
        events,
    });
    log::info!("Booth initialized");
    Ok("Booth initialized".to_string())
}

/// Tear the booth down, resetting any active session first.
#[command]
pub async fn shutdown_booth() -> Result<String, String> {
    let mut guard = BOOTH.write().await;
    if let Some(handle) = guard.take() {
        handle.orchestrator.reset().await;
        log::info!("Booth shut down");
        Ok("Booth shut down".to_string())
    } else {
        Ok("Booth not initialized".to_string())
    }
}

/// Start a capture session (Idle -> Capturing).
#[command]
pub async fn start_session() -> Result<String, String> {
    let booth = orchestrator().await?;
    match booth.start().await {
        Ok(()) => Ok("Session started".to_string()),
        Err(e) => {
            log::error!("Failed to start session: {}", e);
            Err(format!("Failed to start session: {}", e))
        }
    }
}

/// Reset the session from any state.
#[command]
pub async fn reset_session() -> Result<String, String> {
    let booth = orchestrator().await?;
    booth.reset().await;
    Ok("Session reset".to_string())
}

/// Manual capture trigger; only available while the backend is reachable.
#[command]
pub async fn manual_capture() -> Result<String, String> {
    let booth = orchestrator().await?;
    match booth.manual_trigger().await {
        Ok(()) => Ok("Manual capture triggered".to_string()),
        Err(e) => Err(format!("Manual capture unavailable: {}", e)),
    }
}

/// Retake one photo. The UI prompts before invoking this.
#[command]
pub async fn retake_photo(index: usize) -> Result<bool, String> {
    let booth = orchestrator().await?;
    booth
        .retake(index)
        .await
        .map_err(|e| format!("Retake failed: {}", e))
}

/// Select the cosmetic filter applied to subsequent captures.
#[command]
pub async fn set_filter(filter: String) -> Result<String, String> {
    let parsed =
        FilterKind::parse(&filter).ok_or_else(|| format!("Unknown filter: {}", filter))?;
    let booth = orchestrator().await?;
    booth.set_filter(parsed);
    Ok(format!("Filter set to {}", parsed.as_str()))
}

/// List the available filter identifiers.
#[command]
pub async fn list_filters() -> Result<Vec<String>, String> {
    Ok(FilterKind::all()
        .iter()
        .map(|f| f.as_str().to_string())
        .collect())
}

/// Set or clear the strip caption (truncated to 60 characters).
#[command]
pub async fn set_caption(caption: Option<String>) -> Result<String, String> {
    let booth = orchestrator().await?;
    booth.set_caption(caption);
    Ok("Caption updated".to_string())
}

/// Compose the strip from the three captured photos (Preview -> Final).
/// Returns `None` when the precondition is not met.
#[command]
pub async fn compose_strip() -> Result<Option<PhotoStrip>, String> {
    let booth = orchestrator().await?;
    booth
        .compose_strip()
        .await
        .map_err(|e| format!("Composition failed: {}", e))
}

/// Write a composed strip to disk, named by its timestamp filename.
#[command]
pub async fn save_strip_to_disk(
    strip: PhotoStrip,
    directory: Option<String>,
) -> Result<String, String> {
    let dir = directory.unwrap_or_else(|| ".".to_string());
    let path = std::path::Path::new(&dir).join(&strip.filename);
    let path_str = path.display().to_string();
    let data = strip.data;

    match tokio::task::spawn_blocking(move || std::fs::write(&path, data)).await {
        Ok(Ok(())) => {
            log::info!("Strip saved to {}", path_str);
            Ok(path_str)
        }
        Ok(Err(e)) => {
            log::error!("Failed to save strip: {}", e);
            Err(format!("Failed to save strip: {}", e))
        }
        Err(e) => Err(format!("Task join error: {}", e)),
    }
}

/// Current session snapshot for rendering.
#[command]
pub async fn get_session_state() -> Result<SessionSnapshot, String> {
    let booth = orchestrator().await?;
    Ok(booth.session_snapshot())
}

/// Latest detection-backend connectivity, for the status banner and the
/// manual-trigger affordance.
#[command]
pub async fn get_connectivity() -> Result<ConnectivityStatus, String> {
    let booth = orchestrator().await?;
    Ok(booth.connectivity())
}

/// Poll for booth events (non-blocking).
#[command]
pub async fn poll_booth_event() -> Result<Option<BoothEvent>, String> {
    let guard = BOOTH.read().await;
    let handle = guard
        .as_ref()
        .ok_or_else(|| "Booth not initialized".to_string())?;

    let mut events = handle.events.lock().await;
    loop {
        match events.try_recv() {
            Ok(event) => return Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
            Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                log::warn!("Event consumer lagged, skipped {} events", missed);
                continue;
            }
            Err(broadcast::error::TryRecvError::Closed) => return Ok(None),
        }
    }
}
