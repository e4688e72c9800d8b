//! Smile detection backend client.
//!
//! Wraps the remote detection service behind the [`SmileDetector`] trait:
//! `POST /predict` returns a boolean smile decision, `POST /manual_capture`
//! is a fire-and-forget notification, and `GET /health` backs a recurring
//! connectivity probe. Every predict call carries its own cancellation
//! token; the orchestrator cancels the previous token before issuing a new
//! request so at most one is ever outstanding.

use crate::config::DetectorSettings;
use crate::errors::BoothError;
use crate::types::{ConnectivityStatus, Verdict};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

/// Cancels the detection request it is paired with.
///
/// Dropping the handle without calling [`cancel`](CancelHandle::cancel) also
/// cancels the request; the orchestrator holds the handle for exactly as
/// long as the request should stay alive.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Observes cancellation of a single detection request.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

/// Create a connected cancellation pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the paired handle cancels or is dropped.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Remote smile oracle.
pub trait SmileDetector: Send + Sync + 'static {
    /// Classify one JPEG frame. Never fails: request errors degrade to
    /// `NoSmile`, cancellation degrades to `NoDecision`.
    fn predict(
        &self,
        image_jpeg: Vec<u8>,
        cancel: CancelToken,
    ) -> impl Future<Output = Verdict> + Send;

    /// Best-effort notification that a manual capture happened. Failures
    /// are logged and ignored.
    fn notify_manual(&self, image_jpeg: Vec<u8>) -> impl Future<Output = ()> + Send;
}

#[derive(Serialize)]
struct ImagePayload {
    image: String,
}

#[derive(Deserialize)]
struct PredictResponse {
    smile: bool,
    #[serde(default)]
    #[allow(dead_code)]
    score: f32,
}

#[derive(Deserialize)]
struct HealthResponse {
    status: String,
}

/// HTTP client for the detection service.
pub struct DetectionClient {
    http: Client,
    settings: DetectorSettings,
}

impl DetectionClient {
    pub fn new(settings: DetectorSettings) -> Result<Self, BoothError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(settings.predict_timeout_ms))
            .build()
            .map_err(|e| BoothError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, settings })
    }

    fn data_url(image_jpeg: &[u8]) -> String {
        format!("data:image/jpeg;base64,{}", BASE64.encode(image_jpeg))
    }

    async fn post_predict(&self, image_jpeg: &[u8]) -> Result<bool, reqwest::Error> {
        let url = format!("{}/predict", self.settings.base_url);
        let payload = ImagePayload {
            image: Self::data_url(image_jpeg),
        };

        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let decision: PredictResponse = response.json().await?;
        Ok(decision.smile)
    }

    async fn post_manual(&self, image_jpeg: &[u8]) -> Result<(), reqwest::Error> {
        let url = format!("{}/manual_capture", self.settings.base_url);
        let payload = ImagePayload {
            image: Self::data_url(image_jpeg),
        };

        self.http
            .post(&url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn probe_health(http: &Client, base_url: &str, timeout: Duration) -> ConnectivityStatus {
        let url = format!("{}/health", base_url);

        match http.get(&url).timeout(timeout).send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<HealthResponse>().await {
                    Ok(health) if health.status == "healthy" || health.status == "ok" => {
                        ConnectivityStatus::Connected
                    }
                    Ok(health) => {
                        log::warn!("Health check returned status {:?}", health.status);
                        ConnectivityStatus::Unreachable
                    }
                    Err(e) => {
                        log::warn!("Health check body malformed: {}", e);
                        ConnectivityStatus::Unreachable
                    }
                }
            }
            Ok(response) => {
                log::warn!("Health check failed: HTTP {}", response.status());
                ConnectivityStatus::Unreachable
            }
            Err(e) if e.is_timeout() => ConnectivityStatus::TimedOut,
            Err(e) => {
                log::debug!("Health check error: {}", e);
                ConnectivityStatus::Unreachable
            }
        }
    }

    /// Spawn the recurring connectivity probe.
    ///
    /// Runs on its own fixed interval, independent of the detection polling
    /// loop. The returned receiver always holds the latest status; the task
    /// ends when every receiver is dropped.
    pub fn spawn_health_monitor(&self) -> watch::Receiver<ConnectivityStatus> {
        let (tx, rx) = watch::channel(ConnectivityStatus::Unreachable);
        let http = self.http.clone();
        let base_url = self.settings.base_url.clone();
        let interval = Duration::from_secs(self.settings.health_interval_secs);
        let timeout = Duration::from_secs(self.settings.health_timeout_secs);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let status = Self::probe_health(&http, &base_url, timeout).await;
                let changed = *tx.borrow() != status;
                if changed {
                    log::info!("Connectivity changed: {}", status.message());
                }
                if tx.send(status).is_err() {
                    // All receivers gone; stop probing.
                    break;
                }
            }
        });

        rx
    }
}

impl SmileDetector for DetectionClient {
    async fn predict(&self, image_jpeg: Vec<u8>, mut cancel: CancelToken) -> Verdict {
        tokio::select! {
            _ = cancel.cancelled() => {
                log::debug!("Detection request cancelled");
                Verdict::NoDecision
            }
            result = self.post_predict(&image_jpeg) => match result {
                Ok(true) => Verdict::Smile,
                Ok(false) => Verdict::NoSmile,
                Err(e) => {
                    log::warn!("Smile detection failed, treating as no smile: {}", e);
                    Verdict::NoSmile
                }
            }
        }
    }

    async fn notify_manual(&self, image_jpeg: Vec<u8>) {
        if let Err(e) = self.post_manual(&image_jpeg).await {
            log::debug!("Manual capture notification failed (ignored): {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_url_prefix() {
        let url = DetectionClient::data_url(&[0xFF, 0xD8, 0xFF]);
        assert!(url.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_cancel_pair_starts_live() {
        let (_handle, token) = cancel_pair();
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_resolves_token() {
        let (handle, mut token) = cancel_pair();
        handle.cancel();
        token.cancelled().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropping_handle_cancels() {
        let (handle, mut token) = cancel_pair();
        drop(handle);
        // Must resolve rather than hang.
        token.cancelled().await;
    }
}
