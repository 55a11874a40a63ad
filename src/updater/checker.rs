use std::sync::Arc;
use std::time::Duration;

use super::error::FailureKind;
use super::platform::UpdateSource;
use super::types::UpdateManifest;

/// Bound on the remote check.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_millis(20_000);

/// Asks the update source for a newer version, racing it against a timer.
pub struct Checker {
    source: Arc<dyn UpdateSource>,
    timeout: Duration,
}

impl Checker {
    pub fn new(source: Arc<dyn UpdateSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// First settled wins. If the timer fires first the in-flight check is
    /// dropped, so a late answer can never be observed.
    pub async fn check(&self) -> Result<Option<UpdateManifest>, FailureKind> {
        match tokio::time::timeout(self.timeout, self.source.check_for_update()).await {
            Err(_) => {
                let ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(timeout_ms = ms, "Update check timed out");
                Err(FailureKind::Timeout(ms))
            }
            Ok(Err(e)) => Err(FailureKind::Network(e.to_string())),
            Ok(Ok(manifest)) => Ok(manifest),
        }
    }
}
