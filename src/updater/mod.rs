//! In-app self-update: check, confirm, install, confirm, relaunch.
//!
//! The core drives platform services through the traits in [`platform`] and
//! [`gate`]; `tauri_host` implements them for the desktop app.

pub mod checker;
pub mod error;
pub mod gate;
pub mod installer;
pub mod machine;
pub mod notice;
pub mod observer;
pub mod orchestrator;
pub mod platform;
pub mod restart;
pub mod trigger;
pub mod types;

#[cfg(feature = "desktop")]
pub mod commands;
#[cfg(feature = "desktop")]
pub mod tauri_host;

#[cfg(test)]
pub(crate) mod test_support;

pub use checker::{Checker, DEFAULT_CHECK_TIMEOUT};
pub use error::{FailureKind, PlatformError};
pub use gate::{ConfirmationGate, Prompt, PromptKind};
pub use installer::{InstallProgress, Installer, DEFAULT_EVENT_BUFFER};
pub use machine::FlowState;
pub use notice::UpdateNotice;
pub use observer::{FanOut, FlowObserver, TracingObserver};
pub use orchestrator::{FlowReport, FlowSettings, Orchestrator, UpdateServices};
pub use platform::{ProcessControl, UpdateSource, WindowControl};
pub use restart::{RestartCoordinator, DEFAULT_FOREGROUND_GRACE};
pub use trigger::{FlowGuard, ManualCheck, NoticeCallback, UpdateTrigger};
pub use types::{
    DeclineStage, FlowOptions, FlowResult, InstallEvent, OutcomeCallback, UpdateManifest, VersionOutcome,
};
