//! In-memory history of update activity for the front-end's update panel.
//!
//! Fixed-capacity ring buffer; the oldest entries fall off once full. Fed by
//! the flow observer (state changes, download start/finish) and by the host
//! layer (notices shown to the user).

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use uuid::Uuid;

use crate::updater::{FlowObserver, FlowState, InstallEvent};

pub(crate) const UPDATE_LOG_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLogEntry {
    pub id: u64,
    pub timestamp_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_id: Option<Uuid>,
    pub level: LogLevel,
    pub message: String,
}

struct Ring {
    entries: VecDeque<UpdateLogEntry>,
    capacity: usize,
    next_id: u64,
}

pub struct UpdateLog {
    ring: Mutex<Ring>,
}

impl Default for UpdateLog {
    fn default() -> Self {
        Self::new(UPDATE_LOG_CAPACITY)
    }
}

impl UpdateLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Mutex::new(Ring {
                entries: VecDeque::with_capacity(capacity),
                capacity,
                next_id: 1,
            }),
        }
    }

    /// Append an entry, dropping the oldest when full. Returns its id.
    pub fn push(&self, level: LogLevel, flow_id: Option<Uuid>, message: impl Into<String>) -> u64 {
        let mut ring = self.ring.lock();
        let id = ring.next_id;
        ring.next_id += 1;
        if ring.entries.len() == ring.capacity {
            ring.entries.pop_front();
        }
        ring.entries.push_back(UpdateLogEntry {
            id,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            flow_id,
            level,
            message: message.into(),
        });
        id
    }

    /// Up to `limit` most recent entries, oldest first (0 = all).
    pub fn entries(&self, limit: usize) -> Vec<UpdateLogEntry> {
        let ring = self.ring.lock();
        let take = if limit == 0 { ring.entries.len() } else { limit.min(ring.entries.len()) };
        ring.entries.iter().skip(ring.entries.len() - take).cloned().collect()
    }

    /// Ids stay monotonic across clears.
    pub fn clear(&self) {
        self.ring.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.ring.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn describe(state: FlowState) -> Option<(LogLevel, &'static str)> {
    use FlowState::*;
    let entry = match state {
        Checking => (LogLevel::Info, "Checking for updates"),
        NoUpdate => (LogLevel::Info, "No update available"),
        CheckFailed => (LogLevel::Error, "Update check failed"),
        Available => (LogLevel::Info, "Update available"),
        AwaitingDownloadConfirm => (LogLevel::Debug, "Waiting for download confirmation"),
        DeclinedDownload => (LogLevel::Info, "Update postponed by user"),
        Installing => (LogLevel::Info, "Downloading and installing update"),
        InstallFailed => (LogLevel::Error, "Update install failed"),
        AwaitingRestartConfirm => (LogLevel::Debug, "Waiting for restart confirmation"),
        DeclinedRestart => (LogLevel::Info, "Restart postponed by user"),
        Relaunching => (LogLevel::Info, "Relaunching"),
        RelaunchFailed => (LogLevel::Error, "Relaunch failed"),
        Cancelled => (LogLevel::Warn, "Update flow cancelled"),
        Faulted => (LogLevel::Error, "Update flow hit an unexpected fault"),
        Idle | Terminated => return None,
    };
    Some(entry)
}

impl FlowObserver for UpdateLog {
    fn install_event(&self, flow_id: Uuid, event: &InstallEvent) {
        match event {
            InstallEvent::Started { content_length: Some(len) } => {
                self.push(LogLevel::Info, Some(flow_id), format!("Download started ({len} bytes)"));
            }
            InstallEvent::Started { content_length: None } => {
                self.push(LogLevel::Info, Some(flow_id), "Download started");
            }
            // Per-chunk progress would flush the history.
            InstallEvent::Progress { .. } => {}
            InstallEvent::Finished => {
                self.push(LogLevel::Info, Some(flow_id), "Download finished");
            }
        }
    }

    fn transition(&self, flow_id: Uuid, _from: FlowState, to: FlowState) {
        if let Some((level, message)) = describe(to) {
            self.push(level, Some(flow_id), message);
        }
    }
}
