//! Services the host platform provides to the update flow.
//!
//! The core only sees these traits; the Tauri implementations live in
//! `tauri_host` and tests use scripted fakes.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::PlatformError;
use super::types::{InstallEvent, UpdateManifest};

/// Remote update source (e.g. the updater plugin's `latest.json` endpoint).
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// `Ok(None)` means the running version is current.
    async fn check_for_update(&self) -> Result<Option<UpdateManifest>, PlatformError>;

    /// Download and install the update found by the last successful check.
    ///
    /// Events go to `events` in the order they happen. Every clone of the
    /// sender must be dropped by the time this resolves.
    async fn download_and_install(
        &self,
        events: mpsc::Sender<InstallEvent>,
    ) -> Result<(), PlatformError>;
}

/// The application's main window.
#[async_trait]
pub trait WindowControl: Send + Sync {
    /// Show, unminimize and focus. Best-effort; the window may already be visible.
    async fn show_main_window(&self) -> Result<(), PlatformError>;
}

/// Process lifecycle.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Restart the application. On success this normally does not return.
    async fn relaunch(&self) -> Result<(), PlatformError>;
}

