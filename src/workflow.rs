//! The capture → analysis → transformation state machine.
//!
//! [`Workflow`] is pure: it consumes [`Event`]s and answers with the
//! [`Effect`]s the runtime must carry out. Every asynchronous job it asks for
//! carries a [`Ticket`]; completions whose ticket is no longer the one the
//! machine is waiting on are dropped, which makes late callbacks after a
//! reset or a state change harmless.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::camera::CapturedImage;
use crate::catalog::{default_color, find_color, find_style, ColorPreset, StylePreset};
use crate::error::{AnalysisError, CaptureError, TransformError};
use crate::remote::{FaceAnalysis, RenderedImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkflowState {
    Idle,
    Scanning,
    Analyzing,
    Ready,
    Transforming,
    Result,
}

impl WorkflowState {
    /// States during which a remote call is outstanding.
    pub fn is_busy(self) -> bool {
        matches!(self, WorkflowState::Analyzing | WorkflowState::Transforming)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowState::Idle => "IDLE",
            WorkflowState::Scanning => "SCANNING",
            WorkflowState::Analyzing => "ANALYZING",
            WorkflowState::Ready => "READY",
            WorkflowState::Transforming => "TRANSFORMING",
            WorkflowState::Result => "RESULT",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraStatus {
    Acquiring,
    Active,
    Failed(CaptureError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

#[derive(Debug, Clone, PartialEq)]
pub struct TransformationResult {
    pub original: Arc<CapturedImage>,
    pub transformed: RenderedImage,
    pub style: &'static StylePreset,
    pub color: &'static ColorPreset,
    pub rendered_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum Event {
    CredentialsChecked(bool),
    CredentialsSelected,
    CameraSettled { ticket: Ticket, outcome: Result<(), CaptureError> },
    RetryCamera,
    StartScan,
    FrameCaptured { ticket: Ticket, outcome: Result<CapturedImage, CaptureError> },
    AnalysisFinished { ticket: Ticket, outcome: Result<FaceAnalysis, AnalysisError> },
    Select { style: Option<String>, color: Option<String> },
    TransformFinished { ticket: Ticket, outcome: Result<RenderedImage, TransformError> },
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Open the camera from scratch, dropping any device already held.
    AcquireCamera { ticket: Ticket },
    ScheduleCapture { ticket: Ticket },
    CancelCapture,
    StartProgress,
    StopProgress,
    Analyze { ticket: Ticket, image: Arc<CapturedImage> },
    Transform {
        ticket: Ticket,
        image: Arc<CapturedImage>,
        style: &'static StylePreset,
        color: &'static ColorPreset,
    },
    CancelCall,
}

/// What the UI renders: a copy of the machine's observable state.
#[derive(Debug, Clone)]
pub struct WorkflowSnapshot {
    pub state: WorkflowState,
    pub camera: CameraStatus,
    pub credential_valid: bool,
    pub captured: Option<Arc<CapturedImage>>,
    pub analysis: Option<FaceAnalysis>,
    pub selected_style: Option<&'static StylePreset>,
    pub selected_color: &'static ColorPreset,
    pub result: Option<TransformationResult>,
    pub error: Option<String>,
    pub status_message: String,
    pub progress: f32,
}

pub struct Workflow {
    state: WorkflowState,
    camera: CameraStatus,
    credential_valid: bool,
    captured: Option<Arc<CapturedImage>>,
    analysis: Option<FaceAnalysis>,
    selected_style: Option<&'static StylePreset>,
    selected_color: &'static ColorPreset,
    result: Option<TransformationResult>,
    error: Option<String>,
    status_message: String,
    next_ticket: u64,
    camera_ticket: Option<Ticket>,
    capture_ticket: Option<Ticket>,
    call_ticket: Option<Ticket>,
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

impl Workflow {
    pub fn new() -> Self {
        Self {
            state: WorkflowState::Idle,
            camera: CameraStatus::Acquiring,
            credential_valid: true,
            captured: None,
            analysis: None,
            selected_style: None,
            selected_color: default_color(),
            result: None,
            error: None,
            status_message: String::new(),
            next_ticket: 0,
            camera_ticket: None,
            capture_ticket: None,
            call_ticket: None,
        }
    }

    /// Effects to run once at startup: open the camera.
    pub fn start(&mut self) -> Vec<Effect> {
        self.camera = CameraStatus::Acquiring;
        let ticket = self.issue();
        self.camera_ticket = Some(ticket);
        vec![Effect::AcquireCamera { ticket }]
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn credential_valid(&self) -> bool {
        self.credential_valid
    }

    pub fn analysis(&self) -> Option<&FaceAnalysis> {
        self.analysis.as_ref()
    }

    pub fn result(&self) -> Option<&TransformationResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn snapshot(&self, progress: f32) -> WorkflowSnapshot {
        WorkflowSnapshot {
            state: self.state,
            camera: self.camera.clone(),
            credential_valid: self.credential_valid,
            captured: self.captured.clone(),
            analysis: self.analysis.clone(),
            selected_style: self.selected_style,
            selected_color: self.selected_color,
            result: self.result.clone(),
            error: self.error.clone(),
            status_message: self.status_message.clone(),
            progress,
        }
    }

    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        let was_busy = self.state.is_busy();
        let mut effects = self.apply(event);

        match (was_busy, self.state.is_busy()) {
            (false, true) => effects.push(Effect::StartProgress),
            (true, false) => effects.push(Effect::StopProgress),
            _ => {}
        }

        let wants_capture = self.state == WorkflowState::Scanning && self.camera == CameraStatus::Active;
        if wants_capture && self.capture_ticket.is_none() {
            let ticket = self.issue();
            self.capture_ticket = Some(ticket);
            effects.push(Effect::ScheduleCapture { ticket });
        } else if !wants_capture && self.capture_ticket.take().is_some() {
            effects.push(Effect::CancelCapture);
        }

        effects
    }

    fn issue(&mut self) -> Ticket {
        self.next_ticket += 1;
        Ticket(self.next_ticket)
    }

    fn apply(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::CredentialsChecked(valid) => {
                self.credential_valid = valid;
                Vec::new()
            }
            Event::CredentialsSelected => {
                info!("API credential selected");
                self.credential_valid = true;
                Vec::new()
            }
            Event::CameraSettled { ticket, outcome } => {
                if self.camera_ticket != Some(ticket) {
                    debug!("Dropping stale camera result");
                    return Vec::new();
                }
                self.camera_ticket = None;
                self.camera = match outcome {
                    Ok(()) => CameraStatus::Active,
                    Err(e) => {
                        warn!("Camera unavailable: {}", e);
                        CameraStatus::Failed(e)
                    }
                };
                Vec::new()
            }
            Event::RetryCamera => {
                if self.camera == CameraStatus::Acquiring {
                    return Vec::new();
                }
                self.start()
            }
            Event::StartScan => {
                if self.state != WorkflowState::Idle || !self.credential_valid {
                    debug!("Ignoring scan request in {}", self.state);
                    return Vec::new();
                }
                self.error = None;
                self.state = WorkflowState::Scanning;
                Vec::new()
            }
            Event::FrameCaptured { ticket, outcome } => self.on_frame(ticket, outcome),
            Event::AnalysisFinished { ticket, outcome } => self.on_analysis(ticket, outcome),
            Event::Select { style, color } => self.on_select(style.as_deref(), color.as_deref()),
            Event::TransformFinished { ticket, outcome } => self.on_transform(ticket, outcome),
            Event::Reset => self.reset(),
        }
    }

    fn on_frame(&mut self, ticket: Ticket, outcome: Result<CapturedImage, CaptureError>) -> Vec<Effect> {
        if self.state != WorkflowState::Scanning || self.capture_ticket != Some(ticket) {
            debug!("Dropping stale frame");
            return Vec::new();
        }
        self.capture_ticket = None;

        match outcome {
            Ok(image) => {
                let image = Arc::new(image);
                self.captured = Some(image.clone());
                self.state = WorkflowState::Analyzing;
                self.status_message = "Scanning Face Geometry...".to_string();
                let ticket = self.issue();
                self.call_ticket = Some(ticket);
                vec![Effect::Analyze { ticket, image }]
            }
            Err(e) => {
                warn!("Frame capture failed: {}", e);
                self.error = Some(e.to_string());
                self.state = WorkflowState::Idle;
                Vec::new()
            }
        }
    }

    fn on_analysis(&mut self, ticket: Ticket, outcome: Result<FaceAnalysis, AnalysisError>) -> Vec<Effect> {
        if self.state != WorkflowState::Analyzing || self.call_ticket != Some(ticket) {
            debug!("Dropping stale analysis");
            return Vec::new();
        }
        self.call_ticket = None;

        match outcome {
            Ok(analysis) => {
                info!("Analysis ready: {} face", analysis.face_shape);
                self.analysis = Some(analysis);
                self.state = WorkflowState::Ready;
            }
            Err(e) => {
                warn!("Analysis error: {}", e);
                if e.is_auth() {
                    self.credential_valid = false;
                }
                self.error = Some(e.to_string());
                self.captured = None;
                self.state = WorkflowState::Idle;
            }
        }
        Vec::new()
    }

    fn on_select(&mut self, style_id: Option<&str>, color_id: Option<&str>) -> Vec<Effect> {
        if !matches!(self.state, WorkflowState::Ready | WorkflowState::Result)
            || !self.credential_valid
            || self.analysis.is_none()
        {
            debug!("Ignoring selection in {}", self.state);
            return Vec::new();
        }
        let Some(image) = self.captured.clone() else {
            return Vec::new();
        };

        let style = match style_id {
            Some(id) => match find_style(id) {
                Some(style) => Some(style),
                None => {
                    warn!("Unknown style '{}'", id);
                    return Vec::new();
                }
            },
            None => None,
        };
        let color = match color_id {
            Some(id) => match find_color(id) {
                Some(color) => Some(color),
                None => {
                    warn!("Unknown color '{}'", id);
                    return Vec::new();
                }
            },
            None => None,
        };

        if let Some(color) = color {
            self.selected_color = color;
        }
        if let Some(style) = style {
            self.selected_style = Some(style);
        }

        // A color on its own only re-renders once a style has been picked.
        let Some(style) = self.selected_style else {
            return Vec::new();
        };
        if style_id.is_none() && color_id.is_none() {
            return Vec::new();
        }

        let color = self.selected_color;
        self.error = None;
        self.state = WorkflowState::Transforming;
        self.status_message = format!("Rendering {}...", style.name);
        let ticket = self.issue();
        self.call_ticket = Some(ticket);
        info!("Rendering {} in {}", style.id, color.id);
        vec![Effect::Transform { ticket, image, style, color }]
    }

    fn on_transform(&mut self, ticket: Ticket, outcome: Result<RenderedImage, TransformError>) -> Vec<Effect> {
        if self.state != WorkflowState::Transforming || self.call_ticket != Some(ticket) {
            debug!("Dropping stale rendering");
            return Vec::new();
        }
        self.call_ticket = None;

        match outcome {
            Ok(transformed) => {
                let (Some(original), Some(style)) = (self.captured.clone(), self.selected_style) else {
                    self.state = WorkflowState::Ready;
                    return Vec::new();
                };
                self.result = Some(TransformationResult {
                    original,
                    transformed,
                    style,
                    color: self.selected_color,
                    rendered_at: Utc::now(),
                });
                self.state = WorkflowState::Result;
            }
            Err(e) => {
                warn!("Transformation error: {}", e);
                if e.is_auth() {
                    self.credential_valid = false;
                }
                self.error = Some(e.to_string());
                self.state = WorkflowState::Ready;
            }
        }
        Vec::new()
    }

    fn reset(&mut self) -> Vec<Effect> {
        info!("Resetting workflow from {}", self.state);
        let mut effects = Vec::new();
        if self.call_ticket.take().is_some() {
            effects.push(Effect::CancelCall);
        }

        self.state = WorkflowState::Idle;
        self.captured = None;
        self.analysis = None;
        self.selected_style = None;
        self.selected_color = default_color();
        self.result = None;
        self.error = None;
        self.status_message.clear();

        effects.extend(self.start());
        effects
    }
}
