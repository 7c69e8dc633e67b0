//! Selfie capture, face analysis and hairstyle try-on.
//!
//! [`controller::Controller`] drives the [`workflow::Workflow`] state machine
//! with a [`camera::SelfieCamera`] and the two remote clients in [`gemini`].

pub mod camera;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod error;
pub mod gemini;
pub mod progress;
pub mod prompt;
pub mod remote;
pub mod workflow;

#[cfg(feature = "opencv")]
pub mod opencv_camera;

pub use camera::{CameraBackend, CapturedImage, SelfieCamera};
pub use config::SalonConfig;
pub use controller::{Controller, ControllerHandle};
pub use error::{AnalysisError, CaptureError, TransformError};
pub use remote::{FaceAnalysis, FaceAnalyzer, HairTransformer, RenderedImage};
pub use workflow::{WorkflowSnapshot, WorkflowState};

/// Installs the env_logger backend. `RUST_LOG` overrides the default `info`
/// filter. Calling it twice is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).try_init();
}
