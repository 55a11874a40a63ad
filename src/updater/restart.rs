use std::sync::Arc;
use std::time::Duration;

use super::error::FailureKind;
use super::platform::{ProcessControl, WindowControl};

/// Pause after raising the window so it is on screen before the first prompt.
pub const DEFAULT_FOREGROUND_GRACE: Duration = Duration::from_millis(400);

/// Raises the main window before prompting and relaunches after install.
pub struct RestartCoordinator {
    window: Arc<dyn WindowControl>,
    process: Arc<dyn ProcessControl>,
    grace: Duration,
}

impl RestartCoordinator {
    pub fn new(window: Arc<dyn WindowControl>, process: Arc<dyn ProcessControl>, grace: Duration) -> Self {
        Self { window, process, grace }
    }

    pub async fn bring_to_foreground(&self) -> Result<(), FailureKind> {
        self.window
            .show_main_window()
            .await
            .map_err(|e| FailureKind::Unexpected(e.to_string()))
    }

    /// Best-effort foreground. Failures are logged and ignored; the grace
    /// delay only applies after a successful request.
    pub async fn prepare_for_prompt(&self) {
        match self.bring_to_foreground().await {
            Ok(()) => {
                if !self.grace.is_zero() {
                    tokio::time::sleep(self.grace).await;
                }
            }
            Err(e) => tracing::warn!("Could not show main window before prompting: {e}"),
        }
    }

    pub async fn relaunch(&self) -> Result<(), FailureKind> {
        tracing::info!("Relaunching application...");
        self.process
            .relaunch()
            .await
            .map_err(|e| FailureKind::RelaunchFailed(e.to_string()))
    }
}
