use uuid::Uuid;

use super::machine::FlowState;
use super::types::InstallEvent;

/// Caller-visible log/telemetry sink for a running flow.
///
/// Called inline from the flow, one event at a time and in arrival order,
/// so implementations must not block.
pub trait FlowObserver: Send + Sync {
    fn install_event(&self, flow_id: Uuid, event: &InstallEvent);

    fn transition(&self, _flow_id: Uuid, _from: FlowState, _to: FlowState) {}
}

/// Writes install events to the tracing log and nowhere else.
pub struct TracingObserver;

impl FlowObserver for TracingObserver {
    fn install_event(&self, flow_id: Uuid, event: &InstallEvent) {
        log_install_event(flow_id, event);
    }
}

pub(crate) fn log_install_event(flow_id: Uuid, event: &InstallEvent) {
    match event {
        InstallEvent::Started { content_length } => {
            tracing::debug!(%flow_id, ?content_length, "Update download started");
        }
        InstallEvent::Progress { chunk_length } => {
            tracing::debug!(%flow_id, chunk_length, "Update download progress");
        }
        InstallEvent::Finished => tracing::info!(%flow_id, "Update download finished"),
    }
}

/// Fans every callback out to several observers, in order.
pub struct FanOut(pub Vec<std::sync::Arc<dyn FlowObserver>>);

impl FlowObserver for FanOut {
    fn install_event(&self, flow_id: Uuid, event: &InstallEvent) {
        for observer in &self.0 {
            observer.install_event(flow_id, event);
        }
    }

    fn transition(&self, flow_id: Uuid, from: FlowState, to: FlowState) {
        for observer in &self.0 {
            observer.transition(flow_id, from, to);
        }
    }
}
