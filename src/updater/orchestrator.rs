//! The update flow: check, confirm, install, confirm, relaunch.

use futures_util::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::checker::{Checker, DEFAULT_CHECK_TIMEOUT};
use super::error::FailureKind;
use super::gate::{ConfirmationGate, Prompt};
use super::installer::{DEFAULT_EVENT_BUFFER, InstallProgress, Installer};
use super::machine::FlowState;
use super::observer::FlowObserver;
use super::platform::{ProcessControl, UpdateSource, WindowControl};
use super::restart::{DEFAULT_FOREGROUND_GRACE, RestartCoordinator};
use super::types::{DeclineStage, FlowOptions, FlowResult, UpdateManifest, VersionOutcome};

/// Platform services one orchestrator drives.
#[derive(Clone)]
pub struct UpdateServices {
    pub source: Arc<dyn UpdateSource>,
    pub gate: Arc<dyn ConfirmationGate>,
    pub window: Arc<dyn WindowControl>,
    pub process: Arc<dyn ProcessControl>,
    pub observer: Arc<dyn FlowObserver>,
}

/// Timing knobs; see `UpdaterConfig` for the persisted form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowSettings {
    pub check_timeout: Duration,
    pub foreground_grace: Duration,
    pub event_buffer: usize,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            check_timeout: DEFAULT_CHECK_TIMEOUT,
            foreground_grace: DEFAULT_FOREGROUND_GRACE,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// Everything one invocation produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowReport {
    pub flow_id: Uuid,
    pub silent: bool,
    pub result: FlowResult,
    /// States visited, starting at `Idle`.
    pub trail: Vec<FlowState>,
    pub progress: InstallProgress,
}

impl FlowReport {
    pub fn final_state(&self) -> FlowState {
        self.trail.last().copied().unwrap_or(FlowState::Idle)
    }
}

/// Per-invocation bookkeeping. Owned by one call, never shared.
struct FlowRun<'a> {
    flow_id: Uuid,
    observer: &'a dyn FlowObserver,
    trail: Vec<FlowState>,
    progress: InstallProgress,
}

impl<'a> FlowRun<'a> {
    fn new(flow_id: Uuid, observer: &'a dyn FlowObserver) -> Self {
        Self {
            flow_id,
            observer,
            trail: vec![FlowState::Idle],
            progress: InstallProgress::default(),
        }
    }

    fn state(&self) -> FlowState {
        self.trail.last().copied().unwrap_or(FlowState::Idle)
    }

    fn enter(&mut self, next: FlowState) {
        let from = self.state();
        if !from.can_transition_to(next) {
            tracing::error!(?from, to = ?next, "Illegal update flow transition");
        }
        tracing::debug!(?from, to = ?next, "Update flow state");
        self.observer.transition(self.flow_id, from, next);
        self.trail.push(next);
    }

    fn fail(&mut self, state: FlowState, reason: FailureKind) -> FlowResult {
        self.enter(state);
        FlowResult::Failed { reason }
    }
}

/// Race `fut` against the flow's cancellation token.
async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output, FailureKind> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FailureKind::Cancelled),
        out = fut => Ok(out),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Runs update flows against one set of platform services.
///
/// Holds no per-flow state, so concurrent calls cannot corrupt each other;
/// overlapping prompts are the caller's concern (see `UpdateTrigger`).
pub struct Orchestrator {
    checker: Checker,
    gate: Arc<dyn ConfirmationGate>,
    installer: Installer,
    restart: RestartCoordinator,
    observer: Arc<dyn FlowObserver>,
}

impl Orchestrator {
    pub fn new(services: UpdateServices, settings: FlowSettings) -> Self {
        Self {
            checker: Checker::new(services.source.clone(), settings.check_timeout),
            gate: services.gate,
            installer: Installer::new(services.source, services.observer.clone(), settings.event_buffer),
            restart: RestartCoordinator::new(services.window, services.process, settings.foreground_grace),
            observer: services.observer,
        }
    }

    /// Check for an update and, if the user agrees, install it and restart.
    pub async fn run_update_flow(&self, options: FlowOptions) -> Result<FlowResult, FailureKind> {
        self.run_update_flow_with_cancel(options, CancellationToken::new()).await
    }

    /// Same as [`run_update_flow`](Self::run_update_flow), abandoning the
    /// flow with `Cancelled` at the next suspension point once `cancel` fires.
    pub async fn run_update_flow_with_cancel(
        &self,
        options: FlowOptions,
        cancel: CancellationToken,
    ) -> Result<FlowResult, FailureKind> {
        self.run_reported(options, cancel).await.result.into_result()
    }

    pub async fn run_reported(&self, options: FlowOptions, cancel: CancellationToken) -> FlowReport {
        let flow_id = Uuid::new_v4();
        let span = tracing::info_span!("update_flow", %flow_id, silent = options.silent);

        async move {
            let mut run = FlowRun::new(flow_id, self.observer.as_ref());
            let result = self.drive(&options, &cancel, &mut run).await;
            match &result {
                FlowResult::Failed { reason } => {
                    tracing::error!(kind = reason.kind(), "Update check or install failed: {reason}");
                }
                other => tracing::info!(result = ?other, "Update flow finished"),
            }
            FlowReport {
                flow_id,
                silent: options.silent,
                result,
                trail: run.trail,
                progress: run.progress,
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, options: &FlowOptions, cancel: &CancellationToken, run: &mut FlowRun<'_>) -> FlowResult {
        tracing::info!("Checking for updates...");
        run.enter(FlowState::Checking);

        let checked = match until_cancelled(cancel, AssertUnwindSafe(self.checker.check()).catch_unwind()).await {
            Ok(Ok(checked)) => checked,
            Ok(Err(payload)) => {
                let message = panic_message(payload.as_ref());
                tracing::error!("Update check panicked: {message}");
                let result = run.fail(FlowState::Faulted, FailureKind::Unexpected(message));
                if !options.silent {
                    options.notify(VersionOutcome::Error);
                }
                return result;
            }
            Err(reason) => return run.fail(FlowState::Cancelled, reason),
        };

        let manifest = match checked {
            Ok(Some(manifest)) => manifest,
            Ok(None) => {
                tracing::info!("No updates available");
                run.enter(FlowState::NoUpdate);
                if !options.silent {
                    options.notify(VersionOutcome::None);
                }
                return FlowResult::NoUpdate;
            }
            Err(reason) => {
                let result = run.fail(FlowState::CheckFailed, reason);
                if !options.silent {
                    options.notify(VersionOutcome::Error);
                }
                return result;
            }
        };

        tracing::info!(
            version = %manifest.version,
            current_version = %manifest.current_version,
            "Update available"
        );
        run.enter(FlowState::Available);
        options.notify(VersionOutcome::Available(manifest.version.clone()));

        let outcome = AssertUnwindSafe(self.install_and_restart(&manifest, cancel, run))
            .catch_unwind()
            .await;
        match outcome {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!("Update flow panicked: {message}");
                run.fail(FlowState::Faulted, FailureKind::Unexpected(message))
            }
        }
    }

    async fn install_and_restart(
        &self,
        manifest: &UpdateManifest,
        cancel: &CancellationToken,
        run: &mut FlowRun<'_>,
    ) -> FlowResult {
        if let Err(reason) = until_cancelled(cancel, self.restart.prepare_for_prompt()).await {
            return run.fail(FlowState::Cancelled, reason);
        }

        run.enter(FlowState::AwaitingDownloadConfirm);
        let accepted = match until_cancelled(cancel, self.gate.confirm(&Prompt::download(manifest))).await {
            Ok(accepted) => accepted,
            Err(reason) => return run.fail(FlowState::Cancelled, reason),
        };
        if !accepted {
            tracing::debug!("User declined update");
            run.enter(FlowState::DeclinedDownload);
            return FlowResult::Declined { at: DeclineStage::Download };
        }

        tracing::info!("User accepted update, downloading...");
        run.enter(FlowState::Installing);
        let flow_id = run.flow_id;
        let installed = until_cancelled(cancel, self.installer.run(flow_id, &mut run.progress)).await;
        match installed {
            Ok(Ok(())) => tracing::info!("Update installed successfully"),
            Ok(Err(reason)) => return run.fail(FlowState::InstallFailed, reason),
            Err(reason) => return run.fail(FlowState::Cancelled, reason),
        }

        run.enter(FlowState::AwaitingRestartConfirm);
        let restart = match until_cancelled(cancel, self.gate.confirm(&Prompt::restart())).await {
            Ok(restart) => restart,
            Err(reason) => return run.fail(FlowState::Cancelled, reason),
        };
        if !restart {
            tracing::debug!("User postponed restart");
            run.enter(FlowState::DeclinedRestart);
            return FlowResult::Installed { restarted: false };
        }

        run.enter(FlowState::Relaunching);
        match until_cancelled(cancel, self.restart.relaunch()).await {
            Ok(Ok(())) => {
                run.enter(FlowState::Terminated);
                FlowResult::Installed { restarted: true }
            }
            Ok(Err(reason)) => run.fail(FlowState::RelaunchFailed, reason),
            Err(reason) => run.fail(FlowState::Cancelled, reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::updater::test_support::{CheckScript, InstallScript, RecordingObserver, ScriptedPlatform};
    use crate::updater::types::InstallEvent;
    use parking_lot::Mutex;
    use FlowState::*;

    fn happy_events() -> Vec<InstallEvent> {
        vec![
            InstallEvent::Started { content_length: Some(2048) },
            InstallEvent::Progress { chunk_length: 1024 },
            InstallEvent::Progress { chunk_length: 1024 },
            InstallEvent::Finished,
        ]
    }

    fn available() -> CheckScript {
        CheckScript::Available(UpdateManifest::new("2.0.0", "1.5.0"))
    }

    fn orchestrator(platform: &Arc<ScriptedPlatform>, observer: &Arc<RecordingObserver>) -> Orchestrator {
        Orchestrator::new(platform.services(observer.clone()), FlowSettings::default())
    }

    fn recording_options(options: FlowOptions) -> (FlowOptions, Arc<Mutex<Vec<VersionOutcome>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (options.on_update_available(move |o| sink.lock().push(o)), seen)
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_installs_and_relaunches() {
        let platform = ScriptedPlatform::builder()
            .check(available())
            .answers([true, true])
            .install(InstallScript::Succeed(happy_events()))
            .build();
        let observer = RecordingObserver::new();
        let (options, seen) = recording_options(FlowOptions::interactive());

        let report = orchestrator(&platform, &observer)
            .run_reported(options, CancellationToken::new())
            .await;

        assert_eq!(report.result, FlowResult::Installed { restarted: true });
        assert_eq!(
            report.trail,
            vec![
                Idle,
                Checking,
                Available,
                AwaitingDownloadConfirm,
                Installing,
                AwaitingRestartConfirm,
                Relaunching,
                Terminated
            ]
        );
        assert_eq!(*seen.lock(), vec![VersionOutcome::Available("2.0.0".into())]);
        assert_eq!(observer.events(), happy_events());
        assert_eq!(report.progress.bytes_received, 2048);
        assert_eq!(platform.prompts().len(), 2);
        assert_eq!(platform.prompts()[0].title, "Update Available");
        assert_eq!(platform.prompts()[1].title, "Update Installed");
        assert_eq!(platform.relaunches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_update_interactive_notifies_none() {
        let platform = ScriptedPlatform::builder().check(CheckScript::UpToDate).build();
        let observer = RecordingObserver::new();
        let (options, seen) = recording_options(FlowOptions::interactive());

        let result = orchestrator(&platform, &observer).run_update_flow(options).await;

        assert_eq!(result, Ok(FlowResult::NoUpdate));
        assert_eq!(*seen.lock(), vec![VersionOutcome::None]);
        assert_eq!(platform.window_requests(), 0);
        assert!(platform.prompts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn no_update_silent_stays_quiet() {
        let platform = ScriptedPlatform::builder().check(CheckScript::UpToDate).build();
        let observer = RecordingObserver::new();
        let (options, seen) = recording_options(FlowOptions::silent());

        let result = orchestrator(&platform, &observer).run_update_flow(options).await;

        assert_eq!(result, Ok(FlowResult::NoUpdate));
        assert!(seen.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn check_error_silent_is_returned_but_not_notified() {
        let platform = ScriptedPlatform::builder()
            .check(CheckScript::Fail("dns lookup failed".into()))
            .build();
        let observer = RecordingObserver::new();
        let (options, seen) = recording_options(FlowOptions::silent());

        let result = orchestrator(&platform, &observer).run_update_flow(options).await;

        assert_eq!(result, Err(FailureKind::Network("dns lookup failed".into())));
        assert!(seen.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn check_error_interactive_notifies_error() {
        let platform = ScriptedPlatform::builder()
            .check(CheckScript::Fail("dns lookup failed".into()))
            .build();
        let observer = RecordingObserver::new();
        let (options, seen) = recording_options(FlowOptions::interactive());

        let report = orchestrator(&platform, &observer)
            .run_reported(options, CancellationToken::new())
            .await;

        assert!(matches!(report.result, FlowResult::Failed { reason: FailureKind::Network(_) }));
        assert_eq!(report.trail, vec![Idle, Checking, CheckFailed]);
        assert_eq!(*seen.lock(), vec![VersionOutcome::Error]);
    }

    #[tokio::test(start_paused = true)]
    async fn available_is_notified_even_when_silent() {
        let platform = ScriptedPlatform::builder().check(available()).answers([false]).build();
        let observer = RecordingObserver::new();
        let (options, seen) = recording_options(FlowOptions::silent());

        orchestrator(&platform, &observer).run_update_flow(options).await.unwrap();

        assert_eq!(*seen.lock(), vec![VersionOutcome::Available("2.0.0".into())]);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fails_within_bound() {
        let platform = ScriptedPlatform::builder().check(CheckScript::Hang).build();
        let observer = RecordingObserver::new();
        let started = tokio::time::Instant::now();

        let result = orchestrator(&platform, &observer)
            .run_update_flow(FlowOptions::silent())
            .await;

        assert_eq!(result, Err(FailureKind::Timeout(20_000)));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(20_000));
        assert!(elapsed <= Duration::from_millis(20_050), "took {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn declined_download_never_installs() {
        let platform = ScriptedPlatform::builder()
            .check(available())
            .answers([false])
            .install(InstallScript::Succeed(happy_events()))
            .build();
        let observer = RecordingObserver::new();

        let report = orchestrator(&platform, &observer)
            .run_reported(FlowOptions::interactive(), CancellationToken::new())
            .await;

        assert_eq!(report.result, FlowResult::Declined { at: DeclineStage::Download });
        assert_eq!(report.final_state(), DeclinedDownload);
        assert_eq!(platform.installs(), 0);
        assert!(observer.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn declined_restart_keeps_running() {
        let platform = ScriptedPlatform::builder()
            .check(available())
            .answers([true, false])
            .install(InstallScript::Succeed(happy_events()))
            .build();
        let observer = RecordingObserver::new();

        let report = orchestrator(&platform, &observer)
            .run_reported(FlowOptions::interactive(), CancellationToken::new())
            .await;

        assert_eq!(report.result, FlowResult::Installed { restarted: false });
        assert_eq!(report.final_state(), DeclinedRestart);
        assert_eq!(platform.installs(), 1);
        assert_eq!(platform.relaunches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn install_failure_skips_restart_prompt() {
        let platform = ScriptedPlatform::builder()
            .check(available())
            .answers([true, true])
            .install(InstallScript::Fail {
                events: vec![InstallEvent::Started { content_length: None }],
                message: "disk full".into(),
            })
            .build();
        let observer = RecordingObserver::new();

        let report = orchestrator(&platform, &observer)
            .run_reported(FlowOptions::interactive(), CancellationToken::new())
            .await;

        assert_eq!(
            report.result,
            FlowResult::Failed { reason: FailureKind::InstallFailure("disk full".into()) }
        );
        assert_eq!(report.final_state(), InstallFailed);
        assert_eq!(platform.prompts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn relaunch_failure_is_reported() {
        let platform = ScriptedPlatform::builder()
            .check(available())
            .answers([true, true])
            .install(InstallScript::Succeed(happy_events()))
            .relaunch_fails("exec failed")
            .build();
        let observer = RecordingObserver::new();

        let result = orchestrator(&platform, &observer)
            .run_update_flow(FlowOptions::interactive())
            .await;

        assert_eq!(result, Err(FailureKind::RelaunchFailed("exec failed".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn window_failure_does_not_abort() {
        let platform = ScriptedPlatform::builder()
            .check(available())
            .answers([false])
            .window_fails()
            .build();
        let observer = RecordingObserver::new();

        let result = orchestrator(&platform, &observer)
            .run_update_flow(FlowOptions::interactive())
            .await;

        assert_eq!(result, Ok(FlowResult::Declined { at: DeclineStage::Download }));
        assert_eq!(platform.window_requests(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn panic_in_install_is_unexpected() {
        let platform = ScriptedPlatform::builder()
            .check(available())
            .answers([true, true])
            .install(InstallScript::Panic("installer exploded"))
            .build();
        let observer = RecordingObserver::new();

        let report = orchestrator(&platform, &observer)
            .run_reported(FlowOptions::interactive(), CancellationToken::new())
            .await;

        assert_eq!(
            report.result,
            FlowResult::Failed { reason: FailureKind::Unexpected("installer exploded".into()) }
        );
        assert_eq!(report.final_state(), Faulted);
        assert_eq!(platform.relaunches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn panic_in_check_is_unexpected_and_notified() {
        let platform = ScriptedPlatform::builder()
            .check(CheckScript::Panic("manifest parser exploded"))
            .build();
        let observer = RecordingObserver::new();
        let (options, seen) = recording_options(FlowOptions::interactive());

        let report = orchestrator(&platform, &observer)
            .run_reported(options, CancellationToken::new())
            .await;

        assert_eq!(
            report.result,
            FlowResult::Failed { reason: FailureKind::Unexpected("manifest parser exploded".into()) }
        );
        assert_eq!(report.trail, vec![Idle, Checking, Faulted]);
        assert_eq!(*seen.lock(), vec![VersionOutcome::Error]);
        assert!(platform.prompts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn panic_in_check_does_not_kill_the_caller_task() {
        let platform = ScriptedPlatform::builder()
            .check(CheckScript::Panic("manifest parser exploded"))
            .build();
        let orchestrator = Arc::new(orchestrator(&platform, &RecordingObserver::new()));
        let (options, seen) = recording_options(FlowOptions::silent());

        let task = tokio::spawn(async move { orchestrator.run_update_flow(options).await });

        assert_eq!(
            task.await.unwrap(),
            Err(FailureKind::Unexpected("manifest parser exploded".into()))
        );
        assert!(seen.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_while_waiting_for_confirmation() {
        let platform = ScriptedPlatform::builder()
            .check(available())
            .hold_answers()
            .install(InstallScript::Succeed(happy_events()))
            .build();
        let observer = RecordingObserver::new();
        let orchestrator = orchestrator(&platform, &observer);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });

        let report = orchestrator.run_reported(FlowOptions::interactive(), cancel).await;

        assert_eq!(report.result, FlowResult::Failed { reason: FailureKind::Cancelled });
        assert_eq!(report.trail.last(), Some(&Cancelled));
        assert!(report.trail.contains(&AwaitingDownloadConfirm));
        assert_eq!(platform.installs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_token_stops_at_check() {
        let platform = ScriptedPlatform::builder().check(available()).build();
        let observer = RecordingObserver::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = orchestrator(&platform, &observer)
            .run_update_flow_with_cancel(FlowOptions::interactive(), cancel)
            .await;

        assert_eq!(result, Err(FailureKind::Cancelled));
        assert!(platform.prompts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn every_transition_is_observed_and_legal() {
        let platform = ScriptedPlatform::builder()
            .check(available())
            .answers([true, false])
            .install(InstallScript::Succeed(happy_events()))
            .build();
        let observer = RecordingObserver::new();

        let report = orchestrator(&platform, &observer)
            .run_reported(FlowOptions::interactive(), CancellationToken::new())
            .await;

        let transitions = observer.transitions();
        assert_eq!(transitions.len(), report.trail.len() - 1);
        for (i, (from, to)) in transitions.iter().enumerate() {
            assert_eq!(*from, report.trail[i]);
            assert_eq!(*to, report.trail[i + 1]);
            assert!(from.can_transition_to(*to));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn each_flow_gets_its_own_id() {
        let platform = ScriptedPlatform::builder().check(CheckScript::UpToDate).build();
        let observer = RecordingObserver::new();
        let orchestrator = orchestrator(&platform, &observer);

        let a = orchestrator.run_reported(FlowOptions::silent(), CancellationToken::new()).await;
        let b = orchestrator.run_reported(FlowOptions::silent(), CancellationToken::new()).await;
        assert_ne!(a.flow_id, b.flow_id);
        assert_eq!(platform.checks_started(), 2);
    }
}
