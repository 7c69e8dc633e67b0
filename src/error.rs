use thiserror::Error;

/// Failures while acquiring or reading the camera.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("No camera device found. Please connect a camera and try again.")]
    NoDevice,

    #[error("Camera permission denied. Please enable camera access.")]
    PermissionDenied,

    #[error("Camera is already in use by another application.")]
    DeviceBusy,

    #[error("Camera capture is not supported in this environment.")]
    Unsupported,

    #[error("Camera error: {0}")]
    Unknown(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Unable to read face geometry. Ensure lighting is clear. ({0})")]
    MalformedResponse(String),

    #[error("Face analysis failed: {0}")]
    ServiceError(String),

    #[error("API credential rejected: {0}")]
    AuthError(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("The AI rendering was blocked or failed. This can happen with very dark photos or safety filters. ({0})")]
    Blocked(String),

    #[error("AI rendering failed: {0}")]
    ServiceError(String),

    #[error("API credential rejected: {0}")]
    AuthError(String),
}

/// Failures below the model API: connection, TLS, timeouts, unreadable bodies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("could not read response body: {0}")]
    Body(String),
}

impl AnalysisError {
    pub fn is_auth(&self) -> bool {
        matches!(self, AnalysisError::AuthError(_))
    }
}

impl TransformError {
    pub fn is_auth(&self) -> bool {
        matches!(self, TransformError::AuthError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_variants_are_flagged() {
        assert!(AnalysisError::AuthError("x".into()).is_auth());
        assert!(!AnalysisError::ServiceError("x".into()).is_auth());
        assert!(TransformError::AuthError("x".into()).is_auth());
        assert!(!TransformError::Blocked("x".into()).is_auth());
    }

    #[test]
    fn messages_are_user_facing() {
        let msg = CaptureError::DeviceBusy.to_string();
        assert!(msg.contains("already in use"));
        let msg = TransformError::Blocked("SAFETY".into()).to_string();
        assert!(msg.contains("safety filters"));
        assert!(msg.contains("SAFETY"));
    }
}
