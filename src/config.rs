use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::updater::FlowSettings;

pub(crate) const UPDATER_CONFIG_FILE: &str = "updater.json";

/// Get the config directory using platform-appropriate location.
///
/// - macOS: `~/Library/Application Support/traymonitor/`
/// - Linux: `~/.config/traymonitor/` (or `$XDG_CONFIG_HOME`)
/// - Windows: `%APPDATA%/traymonitor/`
///
/// Falls back to `~/.traymonitor/` if the platform dir is unavailable.
pub(crate) fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("traymonitor"))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".traymonitor")
        })
}

/// Load a JSON config file, returning Default if missing or corrupt.
pub(crate) fn load_json_config<T: DeserializeOwned + Default>(filename: &str) -> T {
    load_json_config_in(&config_dir(), filename)
}

/// Same as [`load_json_config`] against an explicit directory.
/// Logs when the file exists but cannot be read or parsed, so a corrupt file
/// shows up in the logs instead of silently resetting preferences.
pub(crate) fn load_json_config_in<T: DeserializeOwned + Default>(dir: &Path, filename: &str) -> T {
    let path = dir.join(filename);
    if !path.exists() {
        return T::default();
    }
    let content = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("Could not read config {}: {e}", path.display());
            return T::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("Corrupt config {}: {e}. Using defaults.", path.display());
            T::default()
        }
    }
}

pub(crate) fn save_json_config<T: Serialize>(filename: &str, config: &T) -> Result<(), String> {
    save_json_config_in(&config_dir(), filename, config)
}

/// Write `config` as pretty JSON to `dir/filename`. The new contents are
/// staged next to the target and moved over it in one rename; on Unix the
/// file is readable by its owner only.
pub(crate) fn save_json_config_in<T: Serialize>(dir: &Path, filename: &str, config: &T) -> Result<(), String> {
    let bytes = serde_json::to_vec_pretty(config).map_err(|e| format!("Cannot encode {filename}: {e}"))?;
    std::fs::create_dir_all(dir).map_err(|e| format!("Cannot create {}: {e}", dir.display()))?;

    let staged = dir.join(format!(".{filename}.{}", std::process::id()));
    let target = dir.join(filename);
    write_owner_only(&staged, &bytes)
        .and_then(|()| std::fs::rename(&staged, &target))
        .map_err(|e| {
            let _ = std::fs::remove_file(&staged);
            format!("Cannot save {}: {e}", target.display())
        })?;

    tracing::debug!(path = %target.display(), "Saved config");
    Ok(())
}

fn write_owner_only(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

// ---------------------------------------------------------------------------
// UpdaterConfig
// ---------------------------------------------------------------------------

/// User preferences for the self-updater. Holds no update state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Check for updates in the background shortly after launch
    #[serde(default = "default_true")]
    pub auto_update_enabled: bool,
    #[serde(default = "default_check_timeout_ms")]
    pub check_timeout_ms: u64,
    /// Pause after raising the main window, before the first prompt
    #[serde(default = "default_foreground_grace_ms")]
    pub foreground_grace_ms: u64,
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,
    #[serde(default = "default_install_event_buffer")]
    pub install_event_buffer: usize,
}

fn default_true() -> bool {
    true
}

fn default_check_timeout_ms() -> u64 {
    20_000
}

fn default_foreground_grace_ms() -> u64 {
    400
}

fn default_startup_delay_ms() -> u64 {
    5_000
}

fn default_install_event_buffer() -> usize {
    64
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            auto_update_enabled: true,
            check_timeout_ms: default_check_timeout_ms(),
            foreground_grace_ms: default_foreground_grace_ms(),
            startup_delay_ms: default_startup_delay_ms(),
            install_event_buffer: default_install_event_buffer(),
        }
    }
}

impl UpdaterConfig {
    pub fn load() -> Self {
        load_json_config(UPDATER_CONFIG_FILE)
    }

    pub fn save(&self) -> Result<(), String> {
        save_json_config(UPDATER_CONFIG_FILE, self)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    /// Timing for the orchestrator. A zero timeout would fail every check,
    /// so it falls back to the default.
    pub fn flow_settings(&self) -> FlowSettings {
        let check_timeout_ms = if self.check_timeout_ms == 0 {
            default_check_timeout_ms()
        } else {
            self.check_timeout_ms
        };
        FlowSettings {
            check_timeout: Duration::from_millis(check_timeout_ms),
            foreground_grace: Duration::from_millis(self.foreground_grace_ms),
            event_buffer: self.install_event_buffer.max(1),
        }
    }
}
