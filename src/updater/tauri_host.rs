//! Platform services backed by Tauri 2 and its updater, dialog and
//! process plugins.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tauri::{AppHandle, Emitter, Manager};
use tauri_plugin_dialog::{DialogExt, MessageDialogButtons, MessageDialogKind};
use tauri_plugin_updater::{Update, UpdaterExt};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::error::PlatformError;
use super::gate::{ConfirmationGate, Prompt, PromptKind};
use super::machine::FlowState;
use super::notice::UpdateNotice;
use super::observer::{log_install_event, FanOut, FlowObserver};
use super::orchestrator::{FlowSettings, Orchestrator, UpdateServices};
use super::platform::{ProcessControl, UpdateSource, WindowControl};
use super::types::{InstallEvent, UpdateManifest};
use crate::update_log::{LogLevel, UpdateLog};

pub const MAIN_WINDOW: &str = "main";

pub const EVENT_PROGRESS: &str = "update-progress";
pub const EVENT_STATE: &str = "update-state";
pub const EVENT_NOTICE: &str = "update-notice";

/// `tauri-plugin-updater` as the update source. The `Update` found by the
/// last check is kept for the install step.
pub struct TauriUpdateSource {
    app: AppHandle,
    pending: tokio::sync::Mutex<Option<Update>>,
}

impl TauriUpdateSource {
    pub fn new(app: AppHandle) -> Self {
        Self {
            app,
            pending: tokio::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl UpdateSource for TauriUpdateSource {
    async fn check_for_update(&self) -> Result<Option<UpdateManifest>, PlatformError> {
        let updater = self
            .app
            .updater()
            .map_err(|e| PlatformError::with_source("updater unavailable", e))?;
        let found = updater
            .check()
            .await
            .map_err(|e| PlatformError::with_source("update check failed", e))?;

        let mut pending = self.pending.lock().await;
        *pending = None;
        Ok(found.map(|update| {
            let manifest = UpdateManifest::new(update.version.clone(), update.current_version.clone());
            *pending = Some(update);
            manifest
        }))
    }

    async fn download_and_install(&self, events: mpsc::Sender<InstallEvent>) -> Result<(), PlatformError> {
        let update = self
            .pending
            .lock()
            .await
            .take()
            .ok_or_else(|| PlatformError::new("no pending update, check first"))?;

        // The plugin's callbacks are synchronous; an unbounded relay keeps
        // their order while the bounded channel applies backpressure here.
        let (relay_tx, mut relay_rx) = mpsc::unbounded_channel();
        let chunk_tx = relay_tx.clone();
        let mut started = false;

        let install = update.download_and_install(
            move |chunk_length, content_length| {
                if !started {
                    started = true;
                    let _ = chunk_tx.send(InstallEvent::Started { content_length });
                }
                let _ = chunk_tx.send(InstallEvent::Progress {
                    chunk_length: chunk_length as u64,
                });
            },
            move || {
                let _ = relay_tx.send(InstallEvent::Finished);
            },
        );
        let forward = async move {
            while let Some(event) = relay_rx.recv().await {
                if events.send(event).await.is_err() {
                    break;
                }
            }
        };

        let (result, ()) = tokio::join!(install, forward);
        result.map_err(|e| PlatformError::with_source("download and install failed", e))
    }
}

/// Native message dialog with custom button labels.
pub struct DialogGate {
    app: AppHandle,
}

impl DialogGate {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

#[async_trait]
impl ConfirmationGate for DialogGate {
    async fn confirm(&self, prompt: &Prompt) -> bool {
        let (tx, rx) = oneshot::channel();
        let kind = match prompt.kind {
            PromptKind::Info => MessageDialogKind::Info,
            PromptKind::Warning => MessageDialogKind::Warning,
        };
        self.app
            .dialog()
            .message(prompt.message.clone())
            .title(prompt.title.clone())
            .kind(kind)
            .buttons(MessageDialogButtons::OkCancelCustom(
                prompt.ok_label.clone(),
                prompt.cancel_label.clone(),
            ))
            .show(move |answer| {
                let _ = tx.send(answer);
            });
        // A dialog torn down without answering counts as "no".
        rx.await.unwrap_or(false)
    }
}

/// Show, unminimize and focus the main webview window.
pub fn show_main_window(app: &AppHandle) -> Result<(), PlatformError> {
    let window = app
        .get_webview_window(MAIN_WINDOW)
        .ok_or_else(|| PlatformError::new("main window not found"))?;
    window
        .show()
        .map_err(|e| PlatformError::with_source("failed to show main window", e))?;
    window
        .unminimize()
        .map_err(|e| PlatformError::with_source("failed to unminimize main window", e))?;
    window
        .set_focus()
        .map_err(|e| PlatformError::with_source("failed to focus main window", e))?;
    Ok(())
}

pub struct MainWindow {
    app: AppHandle,
}

impl MainWindow {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

#[async_trait]
impl WindowControl for MainWindow {
    async fn show_main_window(&self) -> Result<(), PlatformError> {
        show_main_window(&self.app)
    }
}

pub struct TauriProcess {
    app: AppHandle,
}

impl TauriProcess {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

#[async_trait]
impl ProcessControl for TauriProcess {
    async fn relaunch(&self) -> Result<(), PlatformError> {
        self.app.restart()
    }
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressPayload<'a> {
    flow_id: Uuid,
    #[serde(flatten)]
    event: &'a InstallEvent,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatePayload {
    flow_id: Uuid,
    from: FlowState,
    to: FlowState,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct NoticePayload<'a> {
    #[serde(flatten)]
    notice: &'a UpdateNotice,
    message: String,
    is_error: bool,
}

/// Forwards flow activity to the front-end as Tauri events.
pub struct EmitterObserver {
    app: AppHandle,
}

impl EmitterObserver {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl FlowObserver for EmitterObserver {
    fn install_event(&self, flow_id: Uuid, event: &InstallEvent) {
        log_install_event(flow_id, event);
        if let Err(e) = self.app.emit(EVENT_PROGRESS, ProgressPayload { flow_id, event }) {
            tracing::warn!("Failed to emit {EVENT_PROGRESS}: {e}");
        }
    }

    fn transition(&self, flow_id: Uuid, from: FlowState, to: FlowState) {
        if let Err(e) = self.app.emit(EVENT_STATE, StatePayload { flow_id, from, to }) {
            tracing::warn!("Failed to emit {EVENT_STATE}: {e}");
        }
    }
}

/// Emit a notice to the front-end and keep it in the update log.
pub fn publish_notice(app: &AppHandle, log: &UpdateLog, notice: &UpdateNotice) {
    let message = notice.message();
    let level = if notice.is_error() { LogLevel::Error } else { LogLevel::Info };
    log.push(level, None, message.clone());

    let payload = NoticePayload {
        notice,
        message,
        is_error: notice.is_error(),
    };
    if let Err(e) = app.emit(EVENT_NOTICE, payload) {
        tracing::warn!("Failed to emit {EVENT_NOTICE}: {e}");
    }
}

/// Wire an orchestrator to the running application.
pub fn build_orchestrator(app: &AppHandle, log: Arc<UpdateLog>, settings: FlowSettings) -> Orchestrator {
    let emitter: Arc<dyn FlowObserver> = Arc::new(EmitterObserver::new(app.clone()));
    let observer = FanOut(vec![emitter, log as Arc<dyn FlowObserver>]);
    let services = UpdateServices {
        source: Arc::new(TauriUpdateSource::new(app.clone())),
        gate: Arc::new(DialogGate::new(app.clone())),
        window: Arc::new(MainWindow::new(app.clone())),
        process: Arc::new(TauriProcess::new(app.clone())),
        observer: Arc::new(observer),
    };
    Orchestrator::new(services, settings)
}
