//! Entry points that start update flows: the delayed background check after
//! launch and the user's "Check for Updates…" action.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::notice::UpdateNotice;
use super::orchestrator::{FlowReport, Orchestrator};
use super::types::FlowOptions;
use crate::config::UpdaterConfig;

pub type NoticeCallback = Arc<dyn Fn(UpdateNotice) + Send + Sync>;

/// Outcome of a user-initiated check.
#[derive(Debug)]
pub enum ManualCheck {
    Finished(Box<FlowReport>),
    /// Another flow is already running; nothing was started.
    Busy,
}

/// Admits one flow at a time and owns the cancellation of the running one.
pub struct UpdateTrigger {
    in_flight: AtomicBool,
    shutdown: CancellationToken,
    current: Mutex<Option<CancellationToken>>,
}

/// Held for the lifetime of one admitted flow.
pub struct FlowGuard<'a> {
    trigger: &'a UpdateTrigger,
    cancel: CancellationToken,
}

impl FlowGuard<'_> {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for FlowGuard<'_> {
    fn drop(&mut self) {
        *self.trigger.current.lock() = None;
        self.trigger.in_flight.store(false, Ordering::Release);
    }
}

impl Default for UpdateTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateTrigger {
    pub fn new() -> Self {
        Self {
            in_flight: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            current: Mutex::new(None),
        }
    }

    pub fn try_begin(&self) -> Option<FlowGuard<'_>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let cancel = self.shutdown.child_token();
        *self.current.lock() = Some(cancel.clone());
        Some(FlowGuard { trigger: self, cancel })
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Cancel the running flow, if any. Later flows are unaffected.
    pub fn cancel_in_flight(&self) -> bool {
        match self.current.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel the running flow and every flow started afterwards.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Interactive check. Every notice the user should see goes to `on_notice`.
    pub async fn check_now(&self, orchestrator: &Orchestrator, on_notice: NoticeCallback) -> ManualCheck {
        let Some(guard) = self.try_begin() else {
            tracing::info!("Update check already in progress");
            on_notice(UpdateNotice::CheckInProgress);
            return ManualCheck::Busy;
        };

        let error_shown = Arc::new(AtomicBool::new(false));
        let shown = error_shown.clone();
        let notify = on_notice.clone();
        let options = FlowOptions::interactive().on_update_available(move |outcome| {
            let notice = UpdateNotice::from_outcome(&outcome);
            if notice.is_error() {
                shown.store(true, Ordering::Release);
            }
            notify(notice)
        });
        let report = orchestrator.run_reported(options, guard.cancel_token()).await;
        // Skip a second error when the outcome callback already showed one.
        if let Some(notice) = UpdateNotice::after_flow(&report.result)
            && !(notice.is_error() && error_shown.load(Ordering::Acquire))
        {
            on_notice(notice);
        }
        ManualCheck::Finished(Box::new(report))
    }

    /// Delay before the launch check, or `None` when it should not run.
    pub fn startup_check_due(config: &UpdaterConfig, is_dev: bool) -> Option<Duration> {
        if is_dev {
            tracing::debug!("Skipping startup update check in development build");
            return None;
        }
        if !config.auto_update_enabled {
            tracing::debug!("Automatic update checks disabled");
            return None;
        }
        Some(config.startup_delay())
    }

    /// Wait `delay`, then run a silent flow unless another one is running.
    /// Only `Available` and failures after it reach `on_notice`.
    pub async fn run_startup_check(
        &self,
        orchestrator: &Orchestrator,
        delay: Duration,
        on_notice: Option<NoticeCallback>,
    ) -> Option<FlowReport> {
        tokio::select! {
            _ = self.shutdown.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        let Some(guard) = self.try_begin() else {
            tracing::debug!("Startup update check skipped, a check is already running");
            return None;
        };

        let mut options = FlowOptions::silent();
        if let Some(notify) = on_notice.clone() {
            options = options.on_update_available(move |outcome| notify(UpdateNotice::from_outcome(&outcome)));
        }
        let report = orchestrator.run_reported(options, guard.cancel_token()).await;
        if let Err(e) = report.result.clone().into_result() {
            tracing::warn!("Background update check failed: {e}");
        }
        if let Some(notify) = on_notice
            && let Some(notice) = UpdateNotice::after_flow(&report.result)
        {
            notify(notice);
        }
        Some(report)
    }

    /// The launch check as a future for the host runtime to spawn.
    pub fn startup_check(
        self: &Arc<Self>,
        orchestrator: Arc<Orchestrator>,
        config: &UpdaterConfig,
        is_dev: bool,
        on_notice: Option<NoticeCallback>,
    ) -> Option<impl Future<Output = Option<FlowReport>> + Send + 'static> {
        let delay = Self::startup_check_due(config, is_dev)?;
        let trigger = self.clone();
        Some(async move { trigger.run_startup_check(&orchestrator, delay, on_notice).await })
    }

    pub fn spawn_startup_check(
        self: &Arc<Self>,
        orchestrator: Arc<Orchestrator>,
        config: &UpdaterConfig,
        is_dev: bool,
        on_notice: Option<NoticeCallback>,
    ) -> Option<JoinHandle<Option<FlowReport>>> {
        self.startup_check(orchestrator, config, is_dev, on_notice)
            .map(tokio::spawn)
    }
}
