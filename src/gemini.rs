//! Gemini `generateContent` client for face analysis and hair rendering.

use base64::{engine::general_purpose, Engine as _};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use crate::camera::CapturedImage;
use crate::config::RemoteConfig;
use crate::credentials::CredentialStore;
use crate::error::{AnalysisError, TransformError, TransportError};
use crate::prompt::{transformation_instruction, ANALYSIS_INSTRUCTION};
use crate::remote::{FaceAnalysis, FaceAnalyzer, HairTransformer, RenderedImage};

/// Raw HTTP answer; non-2xx statuses are replies, not transport errors.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

pub trait Transport: Send + Sync {
    fn post_json(&self, url: &str, api_key: &str, body: &str) -> Result<HttpReply, TransportError>;
}

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl Transport for UreqTransport {
    fn post_json(&self, url: &str, api_key: &str, body: &str) -> Result<HttpReply, TransportError> {
        let result = self.agent
            .post(url)
            .set("Content-Type", "application/json")
            .set("x-goog-api-key", api_key)
            .send_string(body);

        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(e)) => return Err(TransportError::Request(e.to_string())),
        };

        let status = response.status();
        // Rendered images can exceed ureq's into_string limit.
        let mut body = String::new();
        response.into_reader()
            .read_to_string(&mut body)
            .map_err(|e| TransportError::Body(e.to_string()))?;

        Ok(HttpReply { status, body })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
    #[serde(default, skip_serializing)]
    thought: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    data: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<ImageConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfig {
    aspect_ratio: String,
    image_size: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

impl GenerateContentResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter())
            .into_iter()
            .flatten()
    }

    fn text(&self) -> String {
        self.parts()
            .filter(|p| !p.thought)
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }

    fn block_reason(&self) -> String {
        if let Some(reason) = self.prompt_feedback.as_ref().and_then(|f| f.block_reason.clone()) {
            return reason;
        }
        self.candidates
            .first()
            .and_then(|c| c.finish_reason.clone())
            .unwrap_or_else(|| "no image returned".to_string())
    }
}

/// Why a call failed before its payload could be inspected.
#[derive(Debug)]
enum CallFailure {
    Auth(String),
    Service(String),
}

impl From<CallFailure> for AnalysisError {
    fn from(failure: CallFailure) -> Self {
        match failure {
            CallFailure::Auth(msg) => AnalysisError::AuthError(msg),
            CallFailure::Service(msg) => AnalysisError::ServiceError(msg),
        }
    }
}

impl From<CallFailure> for TransformError {
    fn from(failure: CallFailure) -> Self {
        match failure {
            CallFailure::Auth(msg) => TransformError::AuthError(msg),
            CallFailure::Service(msg) => TransformError::ServiceError(msg),
        }
    }
}

const AUTH_MARKERS: [&str; 2] = ["Requested entity was not found", "API key not valid"];

fn classify_failure(reply: &HttpReply) -> CallFailure {
    let (message, status) = match serde_json::from_str::<ErrorEnvelope>(&reply.body) {
        Ok(envelope) => (envelope.error.message, envelope.error.status),
        Err(_) => (reply.body.trim().to_string(), String::new()),
    };

    let is_auth = matches!(reply.status, 401 | 403)
        || matches!(status.as_str(), "UNAUTHENTICATED" | "PERMISSION_DENIED")
        || AUTH_MARKERS.iter().any(|marker| message.contains(marker));

    if is_auth {
        CallFailure::Auth(message)
    } else {
        CallFailure::Service(format!("HTTP {}: {}", reply.status, message))
    }
}

fn analysis_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "faceShape": { "type": "STRING" },
            "jawline": { "type": "STRING" },
            "hairDensity": { "type": "STRING" },
            "recommendations": { "type": "ARRAY", "items": { "type": "STRING" } }
        },
        "required": ["faceShape", "jawline", "hairDensity", "recommendations"]
    })
}

fn image_part(image: &CapturedImage) -> Part {
    Part {
        inline_data: Some(InlineData {
            mime_type: image.mime_type().to_string(),
            data: image.to_base64(),
        }),
        ..Part::default()
    }
}

fn text_part(text: String) -> Part {
    Part {
        text: Some(text),
        ..Part::default()
    }
}

/// Strict parse of the analysis text: all four fields must be present and
/// well-typed, otherwise nothing is returned.
pub fn parse_analysis(text: &str) -> Result<FaceAnalysis, AnalysisError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AnalysisError::MalformedResponse("AI failed to return analysis.".to_string()));
    }
    serde_json::from_str::<FaceAnalysis>(text)
        .map_err(|e| AnalysisError::MalformedResponse(e.to_string()))
}

pub struct GeminiClient {
    config: RemoteConfig,
    credentials: Arc<dyn CredentialStore>,
    transport: Box<dyn Transport>,
}

impl GeminiClient {
    pub fn new(config: RemoteConfig, credentials: Arc<dyn CredentialStore>) -> Self {
        let transport = Box::new(UreqTransport::new(config.timeout()));
        Self::with_transport(config, credentials, transport)
    }

    pub fn with_transport(
        config: RemoteConfig,
        credentials: Arc<dyn CredentialStore>,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            config,
            credentials,
            transport,
        }
    }

    fn url(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.config.endpoint.trim_end_matches('/'), model)
    }

    fn generate(&self, model: &str, request: &GenerateContentRequest) -> Result<GenerateContentResponse, CallFailure> {
        // Fetched per call so a freshly selected key is picked up.
        let api_key = self.credentials
            .api_key()
            .ok_or_else(|| CallFailure::Auth("No API key selected".to_string()))?;

        let body = serde_json::to_string(request)
            .map_err(|e| CallFailure::Service(format!("Failed to encode request: {}", e)))?;

        debug!("POST {} ({} bytes)", self.url(model), body.len());
        let reply = self.transport
            .post_json(&self.url(model), &api_key, &body)
            .map_err(|e| CallFailure::Service(e.to_string()))?;

        if !(200..300).contains(&reply.status) {
            let failure = classify_failure(&reply);
            error!("{} call failed: {:?}", model, failure);
            return Err(failure);
        }

        serde_json::from_str(&reply.body)
            .map_err(|e| CallFailure::Service(format!("Unreadable response: {}", e)))
    }
}

impl FaceAnalyzer for GeminiClient {
    fn analyze(&self, image: &CapturedImage) -> Result<FaceAnalysis, AnalysisError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![image_part(image), text_part(ANALYSIS_INSTRUCTION.to_string())],
            }],
            generation_config: Some(GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(analysis_schema()),
                ..GenerationConfig::default()
            }),
        };

        let response = self.generate(&self.config.analysis_model, &request)?;
        let analysis = parse_analysis(&response.text()).inspect_err(|e| {
            warn!("Analysis failure: {}", e);
        })?;

        info!("Face analysis: {} face, {} jawline, {} hair", analysis.face_shape, analysis.jawline, analysis.hair_density);
        Ok(analysis)
    }
}

impl HairTransformer for GeminiClient {
    fn transform(
        &self,
        image: &CapturedImage,
        style_prompt: &str,
        color_prompt: &str,
    ) -> Result<RenderedImage, TransformError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![image_part(image), text_part(transformation_instruction(style_prompt, color_prompt))],
            }],
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec!["TEXT".to_string(), "IMAGE".to_string()]),
                image_config: Some(ImageConfig {
                    aspect_ratio: self.config.aspect_ratio.clone(),
                    image_size: self.config.image_size.clone(),
                }),
                ..GenerationConfig::default()
            }),
        };

        let response = self.generate(&self.config.render_model, &request)?;

        let payload = response.parts()
            .filter_map(|p| p.inline_data.as_ref())
            .find_map(|data| {
                let bytes = general_purpose::STANDARD.decode(data.data.trim()).ok()?;
                (!bytes.is_empty()).then(|| (data.mime_type.clone(), bytes))
            });

        match payload {
            Some((mime_type, bytes)) => {
                let mime_type = if mime_type.is_empty() { "image/png".to_string() } else { mime_type };
                info!("Rendered {} bytes of {}", bytes.len(), mime_type);
                Ok(RenderedImage { mime_type, bytes })
            }
            None => {
                let reason = response.block_reason();
                warn!("Rendering returned no image ({})", reason);
                Err(TransformError::Blocked(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{find_color, find_style};
    use chrono::Utc;
    use std::sync::Mutex;

    struct FixedKey(Option<&'static str>);

    impl CredentialStore for FixedKey {
        fn api_key(&self) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    #[derive(Clone, Default)]
    struct Recorded(Arc<Mutex<Vec<(String, String, Value)>>>);

    struct CannedTransport {
        reply: HttpReply,
        recorded: Recorded,
    }

    impl Transport for CannedTransport {
        fn post_json(&self, url: &str, api_key: &str, body: &str) -> Result<HttpReply, TransportError> {
            let body: Value = serde_json::from_str(body).unwrap();
            self.recorded.0.lock().unwrap().push((url.to_string(), api_key.to_string(), body));
            Ok(self.reply.clone())
        }
    }

    struct FailingTransport;

    impl Transport for FailingTransport {
        fn post_json(&self, _: &str, _: &str, _: &str) -> Result<HttpReply, TransportError> {
            Err(TransportError::Request("connection refused".to_string()))
        }
    }

    fn canned(status: u16, body: Value) -> (GeminiClient, Recorded) {
        let recorded = Recorded::default();
        let transport = CannedTransport {
            reply: HttpReply { status, body: body.to_string() },
            recorded: recorded.clone(),
        };
        let client = GeminiClient::with_transport(
            RemoteConfig::default(),
            Arc::new(FixedKey(Some("test-key"))),
            Box::new(transport),
        );
        (client, recorded)
    }

    fn still() -> CapturedImage {
        CapturedImage {
            jpeg: vec![0xFF, 0xD8, 0xFF, 0xD9],
            quality: 80,
            width: 1,
            height: 1,
            captured_at: Utc::now(),
        }
    }

    fn text_reply(text: &str) -> Value {
        json!({ "candidates": [{ "content": { "parts": [{ "text": text }] }, "finishReason": "STOP" }] })
    }

    #[test]
    fn analysis_request_shape() {
        let analysis = r#"{"faceShape":"Oval","jawline":"Soft","hairDensity":"Medium","recommendations":["Classic","Wolf Cut"]}"#;
        let (client, recorded) = canned(200, text_reply(analysis));

        let result = client.analyze(&still()).unwrap();
        assert_eq!(result.face_shape, "Oval");
        assert_eq!(result.recommendations, vec!["Classic", "Wolf Cut"]);

        let calls = recorded.0.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (url, key, body) = &calls[0];
        assert!(url.ends_with("/models/gemini-3-flash-preview:generateContent"));
        assert_eq!(key, "test-key");
        assert_eq!(body["contents"][0]["parts"][0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(body["contents"][0]["parts"][0]["inlineData"]["data"], "/9j/2Q==");
        assert_eq!(body["contents"][0]["parts"][1]["text"], ANALYSIS_INSTRUCTION);
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["responseSchema"]["required"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn missing_hair_density_is_malformed() {
        let (client, _) = canned(200, text_reply(r#"{"faceShape":"Oval","jawline":"Soft","recommendations":[]}"#));
        assert!(matches!(client.analyze(&still()), Err(AnalysisError::MalformedResponse(_))));
    }

    #[test]
    fn non_json_and_empty_text_are_malformed() {
        let (client, _) = canned(200, text_reply("I think the face is oval."));
        assert!(matches!(client.analyze(&still()), Err(AnalysisError::MalformedResponse(_))));

        let (client, _) = canned(200, json!({ "candidates": [] }));
        assert!(matches!(client.analyze(&still()), Err(AnalysisError::MalformedResponse(_))));
    }

    #[test]
    fn wrong_type_is_malformed() {
        let text = r#"{"faceShape":"Oval","jawline":"Soft","hairDensity":"Medium","recommendations":"Classic"}"#;
        assert!(matches!(parse_analysis(text), Err(AnalysisError::MalformedResponse(_))));
    }

    #[test]
    fn entity_not_found_is_auth() {
        let body = json!({ "error": { "code": 404, "message": "Requested entity was not found.", "status": "NOT_FOUND" } });
        let (client, _) = canned(404, body);
        assert!(matches!(client.analyze(&still()), Err(AnalysisError::AuthError(_))));
    }

    #[test]
    fn forbidden_is_auth_and_server_error_is_service() {
        let (client, _) = canned(403, json!({ "error": { "message": "denied", "status": "PERMISSION_DENIED" } }));
        assert!(matches!(client.transform(&still(), "bob", "red"), Err(TransformError::AuthError(_))));

        let (client, _) = canned(500, json!({ "error": { "message": "internal", "status": "INTERNAL" } }));
        match client.transform(&still(), "bob", "red") {
            Err(TransformError::ServiceError(msg)) => assert!(msg.contains("500")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_key_is_auth() {
        let client = GeminiClient::with_transport(
            RemoteConfig::default(),
            Arc::new(FixedKey(None)),
            Box::new(FailingTransport),
        );
        assert!(matches!(client.analyze(&still()), Err(AnalysisError::AuthError(_))));
    }

    #[test]
    fn transport_failure_is_service_error() {
        let client = GeminiClient::with_transport(
            RemoteConfig::default(),
            Arc::new(FixedKey(Some("k"))),
            Box::new(FailingTransport),
        );
        assert!(matches!(client.analyze(&still()), Err(AnalysisError::ServiceError(_))));
    }

    #[test]
    fn transform_returns_inline_image() {
        let png = general_purpose::STANDARD.encode([0x89, b'P', b'N', b'G']);
        let body = json!({ "candidates": [{ "content": { "parts": [
            { "text": "Here you go" },
            { "inlineData": { "mimeType": "image/png", "data": png } }
        ] } }] });
        let (client, recorded) = canned(200, body);

        let style = find_style("wolf-cut").unwrap();
        let color = find_color("platinum").unwrap();
        let rendered = client.transform(&still(), style.prompt, color.prompt).unwrap();
        assert_eq!(rendered.mime_type, "image/png");
        assert_eq!(rendered.bytes, vec![0x89, b'P', b'N', b'G']);

        let calls = recorded.0.lock().unwrap();
        let (url, _, body) = &calls[0];
        assert!(url.ends_with("/models/gemini-3-pro-image-preview:generateContent"));
        let instruction = body["contents"][0]["parts"][1]["text"].as_str().unwrap();
        assert!(instruction.contains("platinum blonde"));
        assert!(instruction.contains(style.prompt));
        assert_eq!(body["generationConfig"]["imageConfig"]["aspectRatio"], "9:16");
        assert_eq!(body["generationConfig"]["imageConfig"]["imageSize"], "1K");
    }

    #[test]
    fn no_image_payload_is_blocked() {
        let body = json!({ "candidates": [{ "content": { "parts": [{ "text": "I can't help with that." }] }, "finishReason": "IMAGE_SAFETY" }] });
        let (client, _) = canned(200, body);
        assert_eq!(
            client.transform(&still(), "bob", "red"),
            Err(TransformError::Blocked("IMAGE_SAFETY".to_string()))
        );

        let (client, _) = canned(200, json!({ "promptFeedback": { "blockReason": "SAFETY" } }));
        assert_eq!(
            client.transform(&still(), "bob", "red"),
            Err(TransformError::Blocked("SAFETY".to_string()))
        );
    }
}
