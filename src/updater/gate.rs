use async_trait::async_trait;
use serde::Serialize;

use super::types::UpdateManifest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptKind {
    Info,
    Warning,
}

/// A yes/no question put to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub title: String,
    pub message: String,
    pub ok_label: String,
    pub cancel_label: String,
    pub kind: PromptKind,
}

impl Prompt {
    /// First gate: download and install the available version?
    pub fn download(manifest: &UpdateManifest) -> Self {
        Self {
            title: "Update Available".to_string(),
            message: format!(
                "A new version {} is available.\n\nCurrent version: {}\n\nWould you like to download and install this update?",
                manifest.version, manifest.current_version
            ),
            ok_label: "Download & Install".to_string(),
            cancel_label: "Later".to_string(),
            kind: PromptKind::Info,
        }
    }

    /// Second gate: restart now to apply the installed update?
    pub fn restart() -> Self {
        Self {
            title: "Update Installed".to_string(),
            message: "Update installed successfully.\n\nThe application needs to restart to apply the update. Would you like to restart now?".to_string(),
            ok_label: "Restart Now".to_string(),
            cancel_label: "Later".to_string(),
            kind: PromptKind::Info,
        }
    }
}

/// Presentation-agnostic yes/no decision.
///
/// Suspends until the user answers; no timeout. Must not fail: a dialog the
/// host could not show, or one the user dismissed, is a "no".
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn confirm(&self, prompt: &Prompt) -> bool;
}
