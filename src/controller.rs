//! Async runtime around [`Workflow`].
//!
//! One tokio task owns the workflow. Commands from the handle and completions
//! from timers, the camera and the remote calls all arrive on the same
//! channel, so state changes are serialized. Each spawned job holds a child
//! of the controller's cancellation token and is cancelled when the state
//! that asked for it is left.

use log::{debug, info, warn};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::camera::SelfieCamera;
use crate::config::SalonConfig;
use crate::credentials::CredentialStore;
use crate::error::{AnalysisError, CaptureError, TransformError};
use crate::progress::ProgressMeter;
use crate::remote::{FaceAnalyzer, HairTransformer};
use crate::workflow::{Effect, Event, Workflow, WorkflowSnapshot};

type SharedCamera = Arc<Mutex<SelfieCamera>>;

#[derive(Debug, Clone)]
enum Command {
    StartScan,
    Select { style: Option<String>, color: Option<String> },
    Reset,
    RetryCamera,
    SelectCredentials,
}

#[derive(Debug)]
enum Message {
    Command(Command),
    Event(Event),
    Tick,
}

/// Front door to a running controller. Dropping it stops the controller.
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<Message>,
    snapshots: watch::Receiver<WorkflowSnapshot>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ControllerHandle {
    pub fn start_scan(&self) {
        self.send(Command::StartScan);
    }

    pub fn select_style(&self, style_id: &str) {
        self.select(Some(style_id), None);
    }

    pub fn select_color(&self, color_id: &str) {
        self.select(None, Some(color_id));
    }

    pub fn select(&self, style_id: Option<&str>, color_id: Option<&str>) {
        self.send(Command::Select {
            style: style_id.map(str::to_string),
            color: color_id.map(str::to_string),
        });
    }

    pub fn reset(&self) {
        self.send(Command::Reset);
    }

    pub fn retry_camera(&self) {
        self.send(Command::RetryCamera);
    }

    pub fn select_credentials(&self) {
        self.send(Command::SelectCredentials);
    }

    pub fn snapshots(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Stops every pending job, releases the camera and waits for the
    /// controller task to finish.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Controller task ended abnormally: {}", e);
            }
        }
    }

    fn send(&self, command: Command) {
        if self.tx.send(Message::Command(command)).is_err() {
            warn!("Controller is no longer running");
        }
    }
}

impl Drop for ControllerHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub struct Controller {
    workflow: Workflow,
    progress: ProgressMeter,
    config: SalonConfig,
    camera: SharedCamera,
    analyzer: Arc<dyn FaceAnalyzer>,
    transformer: Arc<dyn HairTransformer>,
    credentials: Arc<dyn CredentialStore>,
    tx: mpsc::UnboundedSender<Message>,
    snapshots: watch::Sender<WorkflowSnapshot>,
    shutdown: CancellationToken,
    capture_job: Option<CancellationToken>,
    progress_job: Option<CancellationToken>,
    call_job: Option<CancellationToken>,
}

impl Controller {
    /// Starts the controller on the current tokio runtime.
    pub fn spawn(
        config: SalonConfig,
        camera: SelfieCamera,
        analyzer: Arc<dyn FaceAnalyzer>,
        transformer: Arc<dyn HairTransformer>,
        credentials: Arc<dyn CredentialStore>,
    ) -> ControllerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let workflow = Workflow::new();
        let progress = ProgressMeter::new(config.progress.clone());
        let (snapshot_tx, snapshot_rx) = watch::channel(workflow.snapshot(progress.value()));
        let shutdown = CancellationToken::new();

        let controller = Controller {
            workflow,
            progress,
            config,
            camera: Arc::new(Mutex::new(camera)),
            analyzer,
            transformer,
            credentials,
            tx: tx.clone(),
            snapshots: snapshot_tx,
            shutdown: shutdown.clone(),
            capture_job: None,
            progress_job: None,
            call_job: None,
        };
        let task = tokio::spawn(controller.run(rx));

        ControllerHandle {
            tx,
            snapshots: snapshot_rx,
            shutdown,
            task: Some(task),
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Message>) {
        let credentials = self.credentials.clone();
        let has_key = tokio::task::spawn_blocking(move || credentials.has_selected_key())
            .await
            .unwrap_or(false);
        if !has_key {
            info!("No API credential selected");
        }
        self.dispatch(Event::CredentialsChecked(has_key));

        let effects = self.workflow.start();
        self.execute(effects);
        self.publish();

        loop {
            let message = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            match message {
                Message::Command(command) => self.on_command(command),
                Message::Event(event) => self.dispatch(event),
                Message::Tick => {
                    if self.workflow.state().is_busy() {
                        self.progress.tick();
                    }
                }
            }
            self.publish();
        }

        self.stop().await;
    }

    fn on_command(&mut self, command: Command) {
        debug!("Command {:?} in {}", command, self.workflow.state());
        match command {
            Command::StartScan => self.dispatch(Event::StartScan),
            Command::Select { style, color } => self.dispatch(Event::Select { style, color }),
            Command::Reset => self.dispatch(Event::Reset),
            Command::RetryCamera => self.dispatch(Event::RetryCamera),
            Command::SelectCredentials => {
                let credentials = self.credentials.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    if tokio::task::spawn_blocking(move || credentials.open_selector()).await.is_ok() {
                        let _ = tx.send(Message::Event(Event::CredentialsSelected));
                    }
                });
            }
        }
    }

    fn dispatch(&mut self, event: Event) {
        let effects = self.workflow.handle(event);
        self.execute(effects);
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::AcquireCamera { ticket } => {
                    let camera = self.camera.clone();
                    let tx = self.tx.clone();
                    tokio::spawn(async move {
                        let outcome = tokio::task::spawn_blocking(move || {
                            lock(&camera).acquire().map(|_| ())
                        })
                        .await
                        .unwrap_or_else(|e| Err(CaptureError::Unknown(e.to_string())));
                        let _ = tx.send(Message::Event(Event::CameraSettled { ticket, outcome }));
                    });
                }
                Effect::ScheduleCapture { ticket } => {
                    let token = self.replace_job(JobSlot::Capture);
                    let camera = self.camera.clone();
                    let tx = self.tx.clone();
                    let delay = self.config.camera.capture_delay();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = token.cancelled() => return,
                            _ = sleep(delay) => {}
                        }
                        let outcome = tokio::task::spawn_blocking(move || lock(&camera).capture_frame())
                            .await
                            .unwrap_or_else(|e| Err(CaptureError::Unknown(e.to_string())));
                        if !token.is_cancelled() {
                            let _ = tx.send(Message::Event(Event::FrameCaptured { ticket, outcome }));
                        }
                    });
                }
                Effect::CancelCapture => self.cancel_job(JobSlot::Capture),
                Effect::StartProgress => {
                    self.progress.start();
                    let token = self.replace_job(JobSlot::Progress);
                    let tx = self.tx.clone();
                    let period = self.config.progress.tick();
                    let first = Instant::now() + period;
                    tokio::spawn(async move {
                        let mut ticks = interval_at(first, period);
                        loop {
                            tokio::select! {
                                _ = token.cancelled() => break,
                                _ = ticks.tick() => {
                                    if tx.send(Message::Tick).is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                    });
                }
                Effect::StopProgress => {
                    self.cancel_job(JobSlot::Progress);
                    self.progress.reset();
                }
                Effect::Analyze { ticket, image } => {
                    let token = self.replace_job(JobSlot::Call);
                    let analyzer = self.analyzer.clone();
                    let tx = self.tx.clone();
                    tokio::spawn(async move {
                        let call = tokio::task::spawn_blocking(move || analyzer.analyze(&image));
                        let outcome = tokio::select! {
                            _ = token.cancelled() => return,
                            joined = call => joined
                                .unwrap_or_else(|e| Err(AnalysisError::ServiceError(e.to_string()))),
                        };
                        let _ = tx.send(Message::Event(Event::AnalysisFinished { ticket, outcome }));
                    });
                }
                Effect::Transform { ticket, image, style, color } => {
                    let token = self.replace_job(JobSlot::Call);
                    let transformer = self.transformer.clone();
                    let tx = self.tx.clone();
                    tokio::spawn(async move {
                        let call = tokio::task::spawn_blocking(move || {
                            transformer.transform(&image, style.prompt, color.prompt)
                        });
                        let outcome = tokio::select! {
                            _ = token.cancelled() => return,
                            joined = call => joined
                                .unwrap_or_else(|e| Err(TransformError::ServiceError(e.to_string()))),
                        };
                        let _ = tx.send(Message::Event(Event::TransformFinished { ticket, outcome }));
                    });
                }
                Effect::CancelCall => self.cancel_job(JobSlot::Call),
            }
        }
    }

    fn publish(&self) {
        self.snapshots
            .send_replace(self.workflow.snapshot(self.progress.value()));
    }

    fn slot(&mut self, slot: JobSlot) -> &mut Option<CancellationToken> {
        match slot {
            JobSlot::Capture => &mut self.capture_job,
            JobSlot::Progress => &mut self.progress_job,
            JobSlot::Call => &mut self.call_job,
        }
    }

    fn replace_job(&mut self, slot: JobSlot) -> CancellationToken {
        let token = self.shutdown.child_token();
        if let Some(previous) = self.slot(slot).replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    fn cancel_job(&mut self, slot: JobSlot) {
        if let Some(token) = self.slot(slot).take() {
            token.cancel();
        }
    }

    async fn stop(mut self) {
        info!("Stopping controller");
        for slot in [JobSlot::Capture, JobSlot::Progress, JobSlot::Call] {
            self.cancel_job(slot);
        }
        self.progress.reset();
        self.publish();

        let camera = self.camera.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || lock(&camera).release()).await {
            warn!("Failed to release camera: {}", e);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum JobSlot {
    Capture,
    Progress,
    Call,
}

// A panic inside a camera call leaves the device state as the backend left it.
fn lock(camera: &SharedCamera) -> std::sync::MutexGuard<'_, SelfieCamera> {
    camera.lock().unwrap_or_else(|e| e.into_inner())
}
