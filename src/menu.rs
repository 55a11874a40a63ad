use std::sync::Arc;
use tauri::menu::{Menu, MenuBuilder, MenuItemBuilder, PredefinedMenuItem, SubmenuBuilder};
use tauri::tray::TrayIconBuilder;
use tauri::{App, AppHandle, Manager, Wry};

use crate::state::AppState;
use crate::updater::commands::manual_check;
use crate::updater::tauri_host::show_main_window;

pub const CHECK_FOR_UPDATES: &str = "check-for-updates";
pub const SHOW_MAIN: &str = "show-main";
pub const QUIT: &str = "quit";

const TRAY_ID: &str = "traymonitor-tray";

/// Build the native menu bar.
pub fn build_menu(app: &App) -> Result<Menu<Wry>, tauri::Error> {
    let check = MenuItemBuilder::with_id(CHECK_FOR_UPDATES, "Check for Updates…").build(app)?;
    let quit = MenuItemBuilder::with_id(QUIT, "Quit")
        .accelerator("CmdOrCtrl+Q")
        .build(app)?;

    let app_menu = SubmenuBuilder::new(app, "Tray Monitor")
        .item(&PredefinedMenuItem::about(app, None, None)?)
        .separator()
        .item(&check)
        .separator()
        .item(&quit)
        .build()?;

    let window = SubmenuBuilder::new(app, "&Window")
        .item(&MenuItemBuilder::with_id(SHOW_MAIN, "Show Main Window").build(app)?)
        .item(&PredefinedMenuItem::minimize(app, None)?)
        .build()?;

    MenuBuilder::new(app).item(&app_menu).item(&window).build()
}

/// System tray icon with its own menu. Events go through the app-wide
/// menu handler.
pub fn build_tray(app: &App) -> Result<(), tauri::Error> {
    let menu = MenuBuilder::new(app)
        .item(&MenuItemBuilder::with_id(SHOW_MAIN, "Show Tray Monitor").build(app)?)
        .separator()
        .item(&MenuItemBuilder::with_id(CHECK_FOR_UPDATES, "Check for Updates…").build(app)?)
        .separator()
        .item(&MenuItemBuilder::with_id(QUIT, "Quit").build(app)?)
        .build()?;

    let mut tray = TrayIconBuilder::with_id(TRAY_ID)
        .tooltip("Tray Monitor")
        .menu(&menu);
    if let Some(icon) = app.default_window_icon() {
        tray = tray.icon(icon.clone());
    }
    tray.build(app)?;
    Ok(())
}

pub fn handle_menu_event(app: &AppHandle, id: &str) {
    match id {
        CHECK_FOR_UPDATES => {
            let Some(state) = app.try_state::<Arc<AppState>>().map(|s| s.inner().clone()) else {
                return;
            };
            let app = app.clone();
            tauri::async_runtime::spawn(async move {
                manual_check(&app, &state).await;
            });
        }
        SHOW_MAIN => {
            if let Err(e) = show_main_window(app) {
                tracing::warn!("{e}");
            }
        }
        QUIT => {
            if let Some(state) = app.try_state::<Arc<AppState>>() {
                state.trigger.shutdown();
            }
            app.exit(0);
        }
        other => tracing::debug!("Unhandled menu item: {other}"),
    }
}
