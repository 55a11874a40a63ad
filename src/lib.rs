pub mod config;
pub mod logging;
pub mod state;
pub mod update_log;
pub mod updater;

#[cfg(feature = "desktop")]
mod menu;

pub use config::UpdaterConfig;
pub use state::AppState;
pub use update_log::{LogLevel, UpdateLog, UpdateLogEntry};

#[cfg(feature = "desktop")]
use std::sync::Arc;
#[cfg(feature = "desktop")]
use tauri::{Manager, WebviewWindow};

/// Put the main window back on screen if the restored window state left it
/// on a monitor that is no longer attached.
#[cfg(feature = "desktop")]
fn ensure_window_visible(window: &WebviewWindow) {
    let size = window.outer_size().unwrap_or_default();
    let pos = window.outer_position().unwrap_or_default();

    let half_w = i32::try_from(size.width / 2).unwrap_or(i32::MAX);
    let half_h = i32::try_from(size.height / 2).unwrap_or(i32::MAX);
    let center_x = pos.x.saturating_add(half_w);
    let center_y = pos.y.saturating_add(half_h);
    let on_screen = window.available_monitors().unwrap_or_default().iter().any(|m| {
        let mp = m.position();
        let ms = m.size();
        center_x >= mp.x
            && center_x < mp.x.saturating_add(i32::try_from(ms.width).unwrap_or(i32::MAX))
            && center_y >= mp.y
            && center_y < mp.y.saturating_add(i32::try_from(ms.height).unwrap_or(i32::MAX))
    });

    if !on_screen {
        tracing::warn!(x = pos.x, y = pos.y, "Main window is off screen, centering");
        if let Err(e) = window.center() {
            tracing::warn!("Failed to center main window: {e}");
        }
    }
}

#[cfg(feature = "desktop")]
pub fn run() {
    use crate::updater::commands;
    use crate::updater::tauri_host::{build_orchestrator, MAIN_WINDOW};

    let _log_guard = match logging::init(logging::default_log_dir().as_deref()) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: {e}");
            None
        }
    };
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Tray Monitor starting");

    let app = tauri::Builder::default()
        .plugin(tauri_plugin_single_instance::init(|app, _args, _cwd| {
            if let Err(e) = updater::tauri_host::show_main_window(app) {
                tracing::warn!("Could not focus existing instance: {e}");
            }
        }))
        .plugin(tauri_plugin_window_state::Builder::new().build())
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_process::init())
        .setup(|app| {
            app.handle().plugin(tauri_plugin_updater::Builder::new().build())?;

            let config = UpdaterConfig::load();
            let update_log = Arc::new(UpdateLog::default());
            let orchestrator = Arc::new(build_orchestrator(
                app.handle(),
                update_log.clone(),
                config.flow_settings(),
            ));
            let state = Arc::new(AppState::new(config.clone(), update_log, orchestrator.clone()));
            app.manage(state.clone());

            let m = menu::build_menu(app)?;
            app.set_menu(m)?;
            menu::build_tray(app)?;
            app.on_menu_event(|app_handle, event| menu::handle_menu_event(app_handle, event.id().0.as_str()));

            let on_notice = commands::notice_sink(app.handle(), &state);
            if let Some(task) =
                state
                    .trigger
                    .startup_check(orchestrator, &config, cfg!(debug_assertions), Some(on_notice))
            {
                tauri::async_runtime::spawn(task);
            }
            Ok(())
        })
        .on_window_event(|window, event| {
            if let tauri::WindowEvent::Destroyed = event
                && window.label() == MAIN_WINDOW
                && let Some(state) = window.try_state::<Arc<AppState>>()
                && state.trigger.cancel_in_flight()
            {
                tracing::info!("Main window closed, cancelled running update flow");
            }
        })
        .invoke_handler(tauri::generate_handler![
            commands::check_for_updates,
            commands::get_update_log,
            commands::clear_update_log,
            commands::load_updater_config,
            commands::save_updater_config,
            commands::get_app_info,
        ])
        .build(tauri::generate_context!());

    let app = match app {
        Ok(app) => app,
        Err(e) => {
            tracing::error!("Error while building tauri application: {e}");
            return;
        }
    };

    app.run(|app_handle, event| match event {
        tauri::RunEvent::Ready => {
            if let Some(window) = app_handle.get_webview_window(MAIN_WINDOW) {
                ensure_window_visible(&window);
            }
        }
        tauri::RunEvent::Exit => {
            if let Some(state) = app_handle.try_state::<Arc<AppState>>() {
                state.trigger.shutdown();
            }
        }
        _ => {}
    });
}
