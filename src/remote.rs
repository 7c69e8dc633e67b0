//! Contracts for the two remote model calls.
//!
//! Both calls block until the service answers; the controller runs them on
//! tokio's blocking pool.

use serde::{Deserialize, Serialize};

use crate::camera::CapturedImage;
use crate::error::{AnalysisError, TransformError};

/// Face geometry as reported by the analysis model. All four fields are
/// required when deserializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceAnalysis {
    pub face_shape: String,
    pub jawline: String,
    pub hair_density: String,
    pub recommendations: Vec<String>,
}

/// The edited photo returned by the rendering model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

pub trait FaceAnalyzer: Send + Sync {
    fn analyze(&self, image: &CapturedImage) -> Result<FaceAnalysis, AnalysisError>;
}

pub trait HairTransformer: Send + Sync {
    fn transform(
        &self,
        image: &CapturedImage,
        style_prompt: &str,
        color_prompt: &str,
    ) -> Result<RenderedImage, TransformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_uses_camel_case_on_the_wire() {
        let analysis = FaceAnalysis {
            face_shape: "Oval".into(),
            jawline: "Soft".into(),
            hair_density: "Medium".into(),
            recommendations: vec!["Classic".into()],
        };
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["faceShape"], "Oval");
        assert_eq!(json["hairDensity"], "Medium");
    }

    #[test]
    fn missing_field_is_an_error() {
        let text = r#"{"faceShape":"Oval","jawline":"Soft","recommendations":[]}"#;
        assert!(serde_json::from_str::<FaceAnalysis>(text).is_err());
    }
}
