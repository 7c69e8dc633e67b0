use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, RgbImage};
use log::{debug, info, warn};

use crate::config::CameraConfig;
use crate::error::CaptureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    User,
    Any,
}

/// One acquisition attempt: which camera and, optionally, the preferred size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraints {
    pub facing: Facing,
    pub ideal_size: Option<(u32, u32)>,
}

/// Attempts in order of preference: front camera at the configured size,
/// front camera at any size, then whatever video device is available.
pub fn fallback_chain(config: &CameraConfig) -> [Constraints; 3] {
    [
        Constraints {
            facing: Facing::User,
            ideal_size: Some((config.ideal_width, config.ideal_height)),
        },
        Constraints { facing: Facing::User, ideal_size: None },
        Constraints { facing: Facing::Any, ideal_size: None },
    ]
}

/// A raw RGB frame as delivered by a backend.
#[derive(Debug, Clone)]
pub struct Frame {
    pub rgb_data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Device access the capture provider drives. Implementations own the
/// platform handle; `close` must be safe to call when nothing is open.
pub trait CameraBackend: Send {
    fn name(&self) -> String;

    fn is_supported(&self) -> bool {
        true
    }

    fn video_device_count(&mut self) -> Result<usize, CaptureError>;

    fn open(&mut self, constraints: &Constraints) -> Result<(), CaptureError>;

    fn read_frame(&mut self) -> Result<Frame, CaptureError>;

    fn close(&mut self);
}

/// A mirrored, JPEG-encoded still ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedImage {
    pub jpeg: Vec<u8>,
    pub quality: u8,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
}

impl CapturedImage {
    pub fn mime_type(&self) -> &'static str {
        "image/jpeg"
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.jpeg)
    }
}

/// The capture provider. Holds at most one open device and releases it on drop.
pub struct SelfieCamera {
    backend: Box<dyn CameraBackend>,
    config: CameraConfig,
    active: Option<Constraints>,
}

impl SelfieCamera {
    pub fn new(backend: Box<dyn CameraBackend>, config: CameraConfig) -> Self {
        Self {
            backend,
            config,
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_constraints(&self) -> Option<Constraints> {
        self.active
    }

    /// Runs the whole fallback chain from scratch. Any device already held
    /// is released first.
    pub fn acquire(&mut self) -> Result<Constraints, CaptureError> {
        self.release();

        if !self.backend.is_supported() {
            return Err(CaptureError::Unsupported);
        }

        let devices = self.backend.video_device_count()?;
        if devices == 0 {
            return Err(CaptureError::NoDevice);
        }
        debug!("{} video device(s) on {}", devices, self.backend.name());

        let mut last_error = None;
        for constraints in fallback_chain(&self.config) {
            match self.backend.open(&constraints) {
                Ok(()) => {
                    info!("Opened camera {} with {:?}", self.backend.name(), constraints);
                    self.active = Some(constraints);
                    return Ok(constraints);
                }
                Err(e) => {
                    warn!("Camera attempt failed with {:?}: {}", constraints, e);
                    self.backend.close();
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            CaptureError::Unknown("All attempts to access camera failed.".to_string())
        }))
    }

    /// Grabs the live frame, mirrors it to match the self-view and encodes
    /// it at the configured JPEG quality.
    pub fn capture_frame(&mut self) -> Result<CapturedImage, CaptureError> {
        if self.active.is_none() {
            return Err(CaptureError::Unsupported);
        }
        let frame = self.backend.read_frame()?;
        let image = encode_mirrored_jpeg(frame, &self.config)?;
        debug!("Captured {}x{} still ({} bytes)", image.width, image.height, image.jpeg.len());
        Ok(image)
    }

    pub fn release(&mut self) {
        if self.active.take().is_some() {
            info!("Releasing camera {}", self.backend.name());
        }
        self.backend.close();
    }
}

impl Drop for SelfieCamera {
    fn drop(&mut self) {
        self.release();
    }
}

/// Frames without reported dimensions are assumed to be the ideal size.
pub fn encode_mirrored_jpeg(frame: Frame, config: &CameraConfig) -> Result<CapturedImage, CaptureError> {
    let (width, height) = if frame.width == 0 || frame.height == 0 {
        (config.ideal_width, config.ideal_height)
    } else {
        (frame.width, frame.height)
    };

    let expected = width as usize * height as usize * 3;
    if frame.rgb_data.len() != expected {
        return Err(CaptureError::Unknown(format!(
            "Invalid frame data size: {} (expected {})",
            frame.rgb_data.len(),
            expected
        )));
    }

    let rgb = RgbImage::from_raw(width, height, frame.rgb_data)
        .ok_or_else(|| CaptureError::Unknown("Frame buffer does not match its size".to_string()))?;
    let mirrored = imageops::flip_horizontal(&rgb);

    let mut jpeg = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, config.jpeg_quality);
        encoder
            .encode_image(&mirrored)
            .map_err(|e| CaptureError::Unknown(format!("JPEG encoding failed: {}", e)))?;
    }

    Ok(CapturedImage {
        jpeg,
        quality: config.jpeg_quality,
        width,
        height,
        captured_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Script {
        opens: Vec<Constraints>,
        closes: usize,
    }

    struct ScriptedBackend {
        devices: usize,
        supported: bool,
        results: VecDeque<Result<(), CaptureError>>,
        frame: Frame,
        log: Arc<Mutex<Script>>,
    }

    impl ScriptedBackend {
        fn new(results: Vec<Result<(), CaptureError>>) -> (Self, Arc<Mutex<Script>>) {
            let log = Arc::new(Mutex::new(Script::default()));
            let backend = Self {
                devices: 1,
                supported: true,
                results: results.into(),
                frame: half_red_half_blue(16, 8),
                log: log.clone(),
            };
            (backend, log)
        }
    }

    impl CameraBackend for ScriptedBackend {
        fn name(&self) -> String {
            "scripted".to_string()
        }

        fn is_supported(&self) -> bool {
            self.supported
        }

        fn video_device_count(&mut self) -> Result<usize, CaptureError> {
            Ok(self.devices)
        }

        fn open(&mut self, constraints: &Constraints) -> Result<(), CaptureError> {
            self.log.lock().unwrap().opens.push(*constraints);
            self.results.pop_front().unwrap_or(Ok(()))
        }

        fn read_frame(&mut self) -> Result<Frame, CaptureError> {
            Ok(self.frame.clone())
        }

        fn close(&mut self) {
            self.log.lock().unwrap().closes += 1;
        }
    }

    fn half_red_half_blue(width: u32, height: u32) -> Frame {
        let mut rgb_data = Vec::new();
        for _y in 0..height {
            for x in 0..width {
                if x < width / 2 {
                    rgb_data.extend_from_slice(&[255, 0, 0]);
                } else {
                    rgb_data.extend_from_slice(&[0, 0, 255]);
                }
            }
        }
        Frame { rgb_data, width, height }
    }

    #[test]
    fn first_granted_attempt_wins() {
        let (backend, log) = ScriptedBackend::new(vec![Err(CaptureError::DeviceBusy), Ok(())]);
        let mut camera = SelfieCamera::new(Box::new(backend), CameraConfig::default());

        let granted = camera.acquire().unwrap();
        assert_eq!(granted, Constraints { facing: Facing::User, ideal_size: None });
        assert!(camera.is_active());

        let opens = log.lock().unwrap().opens.clone();
        assert_eq!(opens.len(), 2);
        assert_eq!(opens[0].ideal_size, Some((720, 1280)));
    }

    #[test]
    fn all_attempts_failing_reports_last_error() {
        let (backend, log) = ScriptedBackend::new(vec![
            Err(CaptureError::DeviceBusy),
            Err(CaptureError::DeviceBusy),
            Err(CaptureError::PermissionDenied),
        ]);
        let mut camera = SelfieCamera::new(Box::new(backend), CameraConfig::default());

        assert_eq!(camera.acquire(), Err(CaptureError::PermissionDenied));
        assert!(!camera.is_active());
        assert_eq!(log.lock().unwrap().opens.len(), 3);
    }

    #[test]
    fn no_devices_short_circuits() {
        let (mut backend, log) = ScriptedBackend::new(vec![]);
        backend.devices = 0;
        let mut camera = SelfieCamera::new(Box::new(backend), CameraConfig::default());

        assert_eq!(camera.acquire(), Err(CaptureError::NoDevice));
        assert!(log.lock().unwrap().opens.is_empty());
    }

    #[test]
    fn unsupported_environment() {
        let (mut backend, _log) = ScriptedBackend::new(vec![]);
        backend.supported = false;
        let mut camera = SelfieCamera::new(Box::new(backend), CameraConfig::default());
        assert_eq!(camera.acquire(), Err(CaptureError::Unsupported));
    }

    #[test]
    fn capture_requires_acquire() {
        let (backend, _log) = ScriptedBackend::new(vec![]);
        let mut camera = SelfieCamera::new(Box::new(backend), CameraConfig::default());
        assert_eq!(camera.capture_frame(), Err(CaptureError::Unsupported));
    }

    #[test]
    fn capture_is_mirrored_jpeg() {
        let (backend, _log) = ScriptedBackend::new(vec![Ok(())]);
        let mut camera = SelfieCamera::new(Box::new(backend), CameraConfig::default());
        camera.acquire().unwrap();

        let still = camera.capture_frame().unwrap();
        assert_eq!((still.width, still.height), (16, 8));
        assert_eq!(still.quality, 80);
        assert_eq!(still.mime_type(), "image/jpeg");

        let decoded = image::load_from_memory(&still.jpeg).unwrap().to_rgb8();
        let left = decoded.get_pixel(2, 4);
        let right = decoded.get_pixel(13, 4);
        assert!(left[2] > left[0], "left side should now be blue: {:?}", left);
        assert!(right[0] > right[2], "right side should now be red: {:?}", right);
    }

    #[test]
    fn release_happens_on_drop_and_reacquire() {
        let (backend, log) = ScriptedBackend::new(vec![Ok(()), Ok(())]);
        let mut camera = SelfieCamera::new(Box::new(backend), CameraConfig::default());
        camera.acquire().unwrap();
        let closes_before = log.lock().unwrap().closes;

        camera.acquire().unwrap();
        assert!(log.lock().unwrap().closes > closes_before);

        let closes_before = log.lock().unwrap().closes;
        drop(camera);
        assert_eq!(log.lock().unwrap().closes, closes_before + 1);
    }

    #[test]
    fn zero_sized_frame_uses_ideal_size() {
        let config = CameraConfig { ideal_width: 4, ideal_height: 2, ..CameraConfig::default() };
        let frame = Frame { rgb_data: vec![128; 4 * 2 * 3], width: 0, height: 0 };
        let still = encode_mirrored_jpeg(frame, &config).unwrap();
        assert_eq!((still.width, still.height), (4, 2));
    }

    #[test]
    fn short_frame_is_rejected() {
        let frame = Frame { rgb_data: vec![0; 5], width: 2, height: 2 };
        assert!(matches!(
            encode_mirrored_jpeg(frame, &CameraConfig::default()),
            Err(CaptureError::Unknown(_))
        ));
    }
}
