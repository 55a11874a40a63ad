use serde::Serialize;

use super::error::FailureKind;
use super::types::{FlowResult, VersionOutcome};

/// What the user should be told after a check, in caller terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpdateNotice {
    UpToDate,
    Available { version: String },
    CheckFailed,
    /// Installed, restart postponed.
    RestartPending,
    UpdateFailed { reason: String },
    /// A manual check was refused because another flow is running.
    CheckInProgress,
}

impl UpdateNotice {
    pub fn from_outcome(outcome: &VersionOutcome) -> Self {
        match outcome {
            VersionOutcome::Available(version) => Self::Available {
                version: version.clone(),
            },
            VersionOutcome::None => Self::UpToDate,
            VersionOutcome::Error => Self::CheckFailed,
        }
    }

    /// Notice for how the flow ended, when the outcome callback did not
    /// already cover it.
    pub fn after_flow(result: &FlowResult) -> Option<Self> {
        match result {
            FlowResult::Installed { restarted: false } => Some(Self::RestartPending),
            FlowResult::Failed { reason } if !reason.is_check_failure() && *reason != FailureKind::Cancelled => {
                Some(Self::UpdateFailed {
                    reason: reason.to_string(),
                })
            }
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::UpToDate => "You are running the latest version".to_string(),
            Self::Available { version } => format!("Update available: {version}"),
            Self::CheckFailed => "Failed to check for updates".to_string(),
            Self::RestartPending => "Update installed. It will be applied on next restart".to_string(),
            Self::UpdateFailed { reason } => format!("Update failed: {reason}"),
            Self::CheckInProgress => "An update check is already in progress".to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::CheckFailed | Self::UpdateFailed { .. })
    }
}
