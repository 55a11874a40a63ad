use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::error::FailureKind;

/// Metadata of an available update, as reported by the platform updater.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateManifest {
    pub version: String,
    pub current_version: String,
}

impl UpdateManifest {
    pub fn new(version: impl Into<String>, current_version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            current_version: current_version.into(),
        }
    }
}

/// What the check phase found, as reported to `on_update_available`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionOutcome {
    Available(String),
    None,
    Error,
}

impl VersionOutcome {
    /// Front-end spelling: the version itself, `"none"` or `"error"`.
    pub fn as_wire(&self) -> &str {
        match self {
            Self::Available(version) => version,
            Self::None => "none",
            Self::Error => "error",
        }
    }
}

pub type OutcomeCallback = Arc<dyn Fn(VersionOutcome) + Send + Sync>;

/// Per-invocation options. Nothing here outlives the flow.
#[derive(Clone, Default)]
pub struct FlowOptions {
    /// Background mode: suppress `None`/`Error` notifications. `Available`
    /// is always reported.
    pub silent: bool,
    pub on_update_available: Option<OutcomeCallback>,
}

impl FlowOptions {
    /// Unattended background check.
    pub fn silent() -> Self {
        Self {
            silent: true,
            on_update_available: None,
        }
    }

    /// User-initiated check.
    pub fn interactive() -> Self {
        Self::default()
    }

    pub fn on_update_available<F>(mut self, callback: F) -> Self
    where
        F: Fn(VersionOutcome) + Send + Sync + 'static,
    {
        self.on_update_available = Some(Arc::new(callback));
        self
    }

    pub(crate) fn notify(&self, outcome: VersionOutcome) {
        if let Some(callback) = &self.on_update_available {
            callback(outcome);
        }
    }
}

impl fmt::Debug for FlowOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowOptions")
            .field("silent", &self.silent)
            .field("on_update_available", &self.on_update_available.is_some())
            .finish()
    }
}

/// Lifecycle event emitted by the platform while downloading and installing.
///
/// Serialized as `{"event": "Progress", "data": {"chunkLength": 4096}}`, the
/// shape the front-end already understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum InstallEvent {
    #[serde(rename_all = "camelCase")]
    Started { content_length: Option<u64> },
    #[serde(rename_all = "camelCase")]
    Progress { chunk_length: u64 },
    Finished,
}

/// Prompt at which the user said no.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclineStage {
    Download,
    Restart,
}

/// Terminal outcome of one flow invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FlowResult {
    NoUpdate,
    Declined { at: DeclineStage },
    Installed { restarted: bool },
    Failed { reason: FailureKind },
}

impl FlowResult {
    /// Split `Failed` off into the error channel, which is how
    /// `run_update_flow` reports it.
    pub fn into_result(self) -> Result<FlowResult, FailureKind> {
        match self {
            Self::Failed { reason } => Err(reason),
            other => Ok(other),
        }
    }
}
