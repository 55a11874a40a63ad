use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::error::FailureKind;
use super::observer::FlowObserver;
use super::platform::UpdateSource;
use super::types::InstallEvent;

/// Capacity of the install event channel. The platform waits when it is full.
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// Running tally of one install, fed by every event in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallProgress {
    /// Size announced by `Started`, if the server sent one.
    pub content_length: Option<u64>,
    pub bytes_received: u64,
    pub events: usize,
    pub started: bool,
    pub finished: bool,
}

impl InstallProgress {
    /// Fold one event in. Returns a description when the event breaks the
    /// ordering contract (one `Started`, `Finished` last); the event is
    /// still counted.
    pub fn record(&mut self, event: &InstallEvent) -> Option<&'static str> {
        self.events += 1;
        let anomaly = if self.finished {
            Some("event received after Finished")
        } else {
            None
        };

        match *event {
            InstallEvent::Started { content_length } => {
                let duplicate = self.started;
                self.started = true;
                self.content_length = content_length;
                if duplicate {
                    return Some("duplicate Started event");
                }
            }
            InstallEvent::Progress { chunk_length } => {
                self.bytes_received = self.bytes_received.saturating_add(chunk_length);
            }
            InstallEvent::Finished => {
                let duplicate = self.finished;
                self.finished = true;
                if duplicate {
                    return Some("duplicate Finished event");
                }
            }
        }
        anomaly
    }

    /// Percentage of the announced size received so far.
    pub fn percent(&self) -> Option<u8> {
        let total = self.content_length.filter(|&n| n > 0)?;
        let pct = self.bytes_received.saturating_mul(100) / total;
        Some(pct.min(100) as u8)
    }
}

/// Drives the platform's download-and-install and forwards its events.
pub struct Installer {
    source: Arc<dyn UpdateSource>,
    observer: Arc<dyn FlowObserver>,
    buffer: usize,
}

impl Installer {
    pub fn new(source: Arc<dyn UpdateSource>, observer: Arc<dyn FlowObserver>, buffer: usize) -> Self {
        Self {
            source,
            observer,
            buffer: buffer.max(1),
        }
    }

    /// Run the install, forwarding each event to the observer as it arrives.
    ///
    /// A missing `Finished` is left to the platform; only the install
    /// call's own result decides success.
    pub async fn run(&self, flow_id: Uuid, progress: &mut InstallProgress) -> Result<(), FailureKind> {
        let (tx, mut rx) = mpsc::channel(self.buffer);
        let mut install = std::pin::pin!(self.source.download_and_install(tx));

        let mut forward = |event: InstallEvent| {
            if let Some(anomaly) = progress.record(&event) {
                tracing::warn!(%flow_id, ?event, anomaly, "Out-of-order install event");
            }
            self.observer.install_event(flow_id, &event);
        };

        // Events win ties so nothing queued before completion is reordered
        // behind the result.
        let result = loop {
            tokio::select! {
                biased;
                Some(event) = rx.recv() => forward(event),
                result = &mut install => break result,
            }
        };

        rx.close();
        while let Ok(event) = rx.try_recv() {
            forward(event);
        }

        result.map_err(|e| FailureKind::InstallFailure(e.to_string()))
    }
}
