use serde::Serialize;
use std::sync::Arc;
use tauri::{AppHandle, State};

use super::orchestrator::FlowReport;
use super::tauri_host::{build_orchestrator, publish_notice};
use super::trigger::{ManualCheck, NoticeCallback};
use crate::config::UpdaterConfig;
use crate::state::AppState;
use crate::update_log::UpdateLogEntry;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSummary {
    /// Another check was running; nothing was started.
    pub busy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<FlowReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
}

pub(crate) fn notice_sink(app: &AppHandle, state: &AppState) -> NoticeCallback {
    let app = app.clone();
    let log = state.update_log.clone();
    Arc::new(move |notice| publish_notice(&app, &log, &notice))
}

/// User-initiated check, shared by the command and the menus.
pub(crate) async fn manual_check(app: &AppHandle, state: &AppState) -> ManualCheck {
    let orchestrator = state.orchestrator();
    state.trigger.check_now(&orchestrator, notice_sink(app, state)).await
}

#[tauri::command]
pub async fn check_for_updates(app: AppHandle, state: State<'_, Arc<AppState>>) -> Result<CheckSummary, String> {
    let summary = match manual_check(&app, &state).await {
        ManualCheck::Busy => CheckSummary {
            busy: true,
            report: None,
        },
        ManualCheck::Finished(report) => CheckSummary {
            busy: false,
            report: Some(*report),
        },
    };
    Ok(summary)
}

/// Returns up to `limit` most recent entries (0 or absent = all).
#[tauri::command]
pub fn get_update_log(state: State<'_, Arc<AppState>>, limit: Option<usize>) -> Vec<UpdateLogEntry> {
    state.update_log.entries(limit.unwrap_or(0))
}

#[tauri::command]
pub fn clear_update_log(state: State<'_, Arc<AppState>>) {
    state.update_log.clear();
}

#[tauri::command]
pub fn load_updater_config(state: State<'_, Arc<AppState>>) -> UpdaterConfig {
    state.config.read().clone()
}

#[tauri::command]
pub fn save_updater_config(
    app: AppHandle,
    state: State<'_, Arc<AppState>>,
    config: UpdaterConfig,
) -> Result<(), String> {
    config.save()?;
    let orchestrator = build_orchestrator(&app, state.update_log.clone(), config.flow_settings());
    state.replace_orchestrator(Arc::new(orchestrator));
    *state.config.write() = config;
    tracing::info!("Updater preferences saved");
    Ok(())
}

#[tauri::command]
pub fn get_app_info(app: AppHandle) -> AppInfo {
    let pkg = app.package_info();
    AppInfo {
        name: pkg.name.clone(),
        version: pkg.version.to_string(),
    }
}
