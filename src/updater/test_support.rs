//! Scripted platform fakes shared by the updater unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::error::PlatformError;
use super::gate::{ConfirmationGate, Prompt};
use super::machine::FlowState;
use super::observer::FlowObserver;
use super::orchestrator::UpdateServices;
use super::platform::{ProcessControl, UpdateSource, WindowControl};
use super::types::{InstallEvent, UpdateManifest};

#[derive(Debug, Clone)]
pub enum CheckScript {
    Available(UpdateManifest),
    UpToDate,
    Fail(String),
    /// Never settles.
    Hang,
    Panic(&'static str),
}

#[derive(Debug, Clone)]
pub enum InstallScript {
    Succeed(Vec<InstallEvent>),
    Fail { events: Vec<InstallEvent>, message: String },
    Panic(&'static str),
}

#[derive(Default)]
enum Answers {
    /// Unscripted prompts are declined.
    #[default]
    Decline,
    Queue(VecDeque<bool>),
    Hold,
}

pub struct ScriptedPlatformBuilder {
    check: CheckScript,
    check_delay: Duration,
    install: InstallScript,
    answers: Answers,
    window_fails: bool,
    relaunch_error: Option<String>,
}

impl ScriptedPlatformBuilder {
    pub fn check(mut self, script: CheckScript) -> Self {
        self.check = script;
        self
    }

    pub fn check_delay(mut self, delay: Duration) -> Self {
        self.check_delay = delay;
        self
    }

    pub fn install(mut self, script: InstallScript) -> Self {
        self.install = script;
        self
    }

    /// Answers for successive prompts, in order.
    pub fn answers(mut self, answers: impl IntoIterator<Item = bool>) -> Self {
        self.answers = Answers::Queue(answers.into_iter().collect());
        self
    }

    /// Every prompt waits forever.
    pub fn hold_answers(mut self) -> Self {
        self.answers = Answers::Hold;
        self
    }

    pub fn window_fails(mut self) -> Self {
        self.window_fails = true;
        self
    }

    pub fn relaunch_fails(mut self, message: &str) -> Self {
        self.relaunch_error = Some(message.to_string());
        self
    }

    pub fn build(self) -> Arc<ScriptedPlatform> {
        Arc::new(ScriptedPlatform {
            check: self.check,
            check_delay: self.check_delay,
            install: self.install,
            answers: Mutex::new(self.answers),
            window_fails: self.window_fails,
            relaunch_error: self.relaunch_error,
            checks_started: AtomicUsize::new(0),
            checks_completed: AtomicUsize::new(0),
            installs: AtomicUsize::new(0),
            window_requests: AtomicUsize::new(0),
            relaunches: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

/// One object playing every platform role, driven by a script.
pub struct ScriptedPlatform {
    check: CheckScript,
    check_delay: Duration,
    install: InstallScript,
    answers: Mutex<Answers>,
    window_fails: bool,
    relaunch_error: Option<String>,
    checks_started: AtomicUsize,
    checks_completed: AtomicUsize,
    installs: AtomicUsize,
    window_requests: AtomicUsize,
    relaunches: AtomicUsize,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedPlatform {
    pub fn builder() -> ScriptedPlatformBuilder {
        ScriptedPlatformBuilder {
            check: CheckScript::UpToDate,
            check_delay: Duration::ZERO,
            install: InstallScript::Succeed(vec![InstallEvent::Finished]),
            answers: Answers::default(),
            window_fails: false,
            relaunch_error: None,
        }
    }

    pub fn services(self: &Arc<Self>, observer: Arc<dyn FlowObserver>) -> UpdateServices {
        UpdateServices {
            source: self.clone(),
            gate: self.clone(),
            window: self.clone(),
            process: self.clone(),
            observer,
        }
    }

    pub fn checks_started(&self) -> usize {
        self.checks_started.load(Ordering::SeqCst)
    }

    pub fn checks_completed(&self) -> usize {
        self.checks_completed.load(Ordering::SeqCst)
    }

    pub fn installs(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }

    pub fn window_requests(&self) -> usize {
        self.window_requests.load(Ordering::SeqCst)
    }

    pub fn relaunches(&self) -> usize {
        self.relaunches.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().clone()
    }
}

async fn send_all(events: &mpsc::Sender<InstallEvent>, script: &[InstallEvent]) {
    for event in script {
        if events.send(*event).await.is_err() {
            return;
        }
    }
}

#[async_trait]
impl UpdateSource for ScriptedPlatform {
    async fn check_for_update(&self) -> Result<Option<UpdateManifest>, PlatformError> {
        self.checks_started.fetch_add(1, Ordering::SeqCst);
        if !self.check_delay.is_zero() {
            tokio::time::sleep(self.check_delay).await;
        }
        let result = match &self.check {
            CheckScript::Available(manifest) => Ok(Some(manifest.clone())),
            CheckScript::UpToDate => Ok(None),
            CheckScript::Fail(message) => Err(PlatformError::new(message.clone())),
            CheckScript::Hang => std::future::pending().await,
            CheckScript::Panic(message) => panic!("{message}"),
        };
        self.checks_completed.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn download_and_install(&self, events: mpsc::Sender<InstallEvent>) -> Result<(), PlatformError> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        match &self.install {
            InstallScript::Succeed(script) => {
                send_all(&events, script).await;
                Ok(())
            }
            InstallScript::Fail { events: script, message } => {
                send_all(&events, script).await;
                Err(PlatformError::new(message.clone()))
            }
            InstallScript::Panic(message) => panic!("{message}"),
        }
    }
}

#[async_trait]
impl ConfirmationGate for ScriptedPlatform {
    async fn confirm(&self, prompt: &Prompt) -> bool {
        self.prompts.lock().push(prompt.clone());
        let answer = match &mut *self.answers.lock() {
            Answers::Decline => Some(false),
            Answers::Queue(queue) => Some(queue.pop_front().unwrap_or(false)),
            Answers::Hold => None,
        };
        match answer {
            Some(answer) => answer,
            None => std::future::pending().await,
        }
    }
}

#[async_trait]
impl WindowControl for ScriptedPlatform {
    async fn show_main_window(&self) -> Result<(), PlatformError> {
        self.window_requests.fetch_add(1, Ordering::SeqCst);
        if self.window_fails {
            return Err(PlatformError::new("main window not found"));
        }
        Ok(())
    }
}

#[async_trait]
impl ProcessControl for ScriptedPlatform {
    async fn relaunch(&self) -> Result<(), PlatformError> {
        self.relaunches.fetch_add(1, Ordering::SeqCst);
        match &self.relaunch_error {
            Some(message) => Err(PlatformError::new(message.clone())),
            None => Ok(()),
        }
    }
}

/// Records everything it observes.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<InstallEvent>>,
    transitions: Mutex<Vec<(FlowState, FlowState)>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<InstallEvent> {
        self.events.lock().clone()
    }

    pub fn transitions(&self) -> Vec<(FlowState, FlowState)> {
        self.transitions.lock().clone()
    }
}

impl FlowObserver for RecordingObserver {
    fn install_event(&self, _flow_id: Uuid, event: &InstallEvent) {
        self.events.lock().push(*event);
    }

    fn transition(&self, _flow_id: Uuid, from: FlowState, to: FlowState) {
        self.transitions.lock().push((from, to));
    }
}
