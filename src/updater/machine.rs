//! States of one update flow and the transitions between them.
//!
//! ```text
//! Idle -> Checking -> {NoUpdate, CheckFailed, Available}
//! Available -> AwaitingDownloadConfirm -> {DeclinedDownload, Installing}
//! Installing -> {InstallFailed, AwaitingRestartConfirm}
//! AwaitingRestartConfirm -> {DeclinedRestart, Relaunching}
//! Relaunching -> {RelaunchFailed, Terminated}
//! ```
//!
//! `Cancelled` and `Faulted` can be entered from any non-terminal state.
//! The machine never loops back; a new check starts a fresh run at `Idle`.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    Idle,
    Checking,
    NoUpdate,
    CheckFailed,
    Available,
    AwaitingDownloadConfirm,
    DeclinedDownload,
    Installing,
    InstallFailed,
    AwaitingRestartConfirm,
    DeclinedRestart,
    Relaunching,
    RelaunchFailed,
    /// Relaunch succeeded; normally the process is gone before this is observed.
    Terminated,
    Cancelled,
    /// A panic escaped a platform service.
    Faulted,
}

impl FlowState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::NoUpdate
                | Self::CheckFailed
                | Self::DeclinedDownload
                | Self::InstallFailed
                | Self::DeclinedRestart
                | Self::RelaunchFailed
                | Self::Terminated
                | Self::Cancelled
                | Self::Faulted
        )
    }

    pub fn can_transition_to(self, next: FlowState) -> bool {
        use FlowState::*;

        if matches!(next, Cancelled | Faulted) {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Idle, Checking)
                | (Checking, NoUpdate | CheckFailed | Available)
                | (Available, AwaitingDownloadConfirm)
                | (AwaitingDownloadConfirm, DeclinedDownload | Installing)
                | (Installing, InstallFailed | AwaitingRestartConfirm)
                | (AwaitingRestartConfirm, DeclinedRestart | Relaunching)
                | (Relaunching, RelaunchFailed | Terminated)
        )
    }
}
