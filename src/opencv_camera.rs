//! V4L2 camera access through OpenCV.

use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture, CAP_V4L2};
use log::{debug, info, warn};
use std::io::ErrorKind;
use std::path::Path;

use crate::camera::{CameraBackend, Constraints, Facing, Frame};
use crate::error::CaptureError;

#[derive(Debug, Clone)]
pub struct VideoDevice {
    pub device_id: i32,
    pub name: String,
    pub is_ir: bool,
}

pub struct OpenCvBackend {
    preferred_index: i32,
    devices: Vec<VideoDevice>,
    capture: Option<VideoCapture>,
}

impl OpenCvBackend {
    pub fn new(preferred_index: i32) -> Self {
        Self {
            preferred_index,
            devices: Vec::new(),
            capture: None,
        }
    }

    /// Front-facing attempts skip infrared sensors; the last resort takes anything.
    fn candidates(&self, facing: Facing) -> Vec<&VideoDevice> {
        let mut list: Vec<&VideoDevice> = self.devices.iter()
            .filter(|d| facing == Facing::Any || !d.is_ir)
            .collect();
        list.sort_by_key(|d| (d.device_id != self.preferred_index, d.device_id));
        list
    }
}

impl CameraBackend for OpenCvBackend {
    fn name(&self) -> String {
        "opencv-v4l2".to_string()
    }

    fn is_supported(&self) -> bool {
        Path::new("/sys/class/video4linux").exists()
    }

    fn video_device_count(&mut self) -> Result<usize, CaptureError> {
        self.devices = detect_devices();
        Ok(self.devices.len())
    }

    fn open(&mut self, constraints: &Constraints) -> Result<(), CaptureError> {
        let candidates: Vec<VideoDevice> = self.candidates(constraints.facing)
            .into_iter()
            .cloned()
            .collect();
        if candidates.is_empty() {
            return Err(CaptureError::NoDevice);
        }

        let mut last_error = CaptureError::NoDevice;
        for device in candidates {
            match open_device(&device, constraints.ideal_size) {
                Ok(capture) => {
                    info!("Opened video{} ({})", device.device_id, device.name);
                    self.capture = Some(capture);
                    return Ok(());
                }
                Err(e) => {
                    warn!("video{} unavailable: {}", device.device_id, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        let capture = self.capture.as_mut().ok_or(CaptureError::Unsupported)?;

        let mut mat = Mat::default();
        capture.read(&mut mat)
            .map_err(|e| CaptureError::Unknown(format!("Failed to read frame: {}", e)))?;
        if mat.empty() {
            return Err(CaptureError::Unknown("Empty frame".to_string()));
        }

        let mut rgb_mat = Mat::default();
        opencv::imgproc::cvt_color(&mat, &mut rgb_mat, opencv::imgproc::COLOR_BGR2RGB, 0)
            .map_err(|e| CaptureError::Unknown(format!("Color conversion failed: {}", e)))?;

        let width = rgb_mat.cols() as u32;
        let height = rgb_mat.rows() as u32;
        let rgb_data = rgb_mat.data_bytes()
            .map_err(|e| CaptureError::Unknown(format!("Failed to get frame data: {}", e)))?
            .to_vec();

        Ok(Frame { rgb_data, width, height })
    }

    fn close(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            let _ = capture.release();
        }
    }
}

impl Drop for OpenCvBackend {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_device(device: &VideoDevice, ideal_size: Option<(u32, u32)>) -> Result<VideoCapture, CaptureError> {
    let path = format!("/dev/video{}", device.device_id);
    if let Err(e) = std::fs::File::open(&path) {
        return Err(match e.kind() {
            ErrorKind::PermissionDenied => CaptureError::PermissionDenied,
            ErrorKind::NotFound => CaptureError::NoDevice,
            _ => CaptureError::Unknown(e.to_string()),
        });
    }

    let mut capture = VideoCapture::new(device.device_id, CAP_V4L2)
        .map_err(|e| CaptureError::Unknown(format!("Failed to open camera: {}", e)))?;
    if !capture.is_opened().unwrap_or(false) {
        return Err(CaptureError::DeviceBusy);
    }

    if let Some((width, height)) = ideal_size {
        capture.set(videoio::CAP_PROP_FRAME_WIDTH, width as f64).ok();
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, height as f64).ok();
    }

    // A device that opens but never yields frames is held by someone else.
    let mut test_frame = Mat::default();
    if capture.read(&mut test_frame).is_err() || test_frame.empty() {
        let _ = capture.release();
        return Err(CaptureError::DeviceBusy);
    }

    Ok(capture)
}

/// Lists V4L2 capture nodes, skipping metadata nodes.
pub fn detect_devices() -> Vec<VideoDevice> {
    let mut devices = Vec::new();

    let Ok(entries) = std::fs::read_dir("/sys/class/video4linux") else {
        return devices;
    };

    for entry in entries.flatten() {
        let node = entry.file_name().to_string_lossy().to_string();
        let Some(device_id) = node.strip_prefix("video").and_then(|s| s.parse::<i32>().ok()) else {
            continue;
        };

        // Index 0 is the capture node; higher indices are metadata nodes.
        let index = std::fs::read_to_string(entry.path().join("index"))
            .ok()
            .and_then(|s| s.trim().parse::<i32>().ok())
            .unwrap_or(0);
        if index != 0 {
            debug!("Skipping video{} (index {})", device_id, index);
            continue;
        }

        let name = std::fs::read_to_string(entry.path().join("name"))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| format!("video{}", device_id));
        let is_ir = is_ir_camera(&name);

        devices.push(VideoDevice { device_id, name, is_ir });
    }

    devices.sort_by_key(|d| d.device_id);
    info!("Detected {} camera(s)", devices.len());
    devices
}

fn is_ir_camera(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("infrared")
        || lower.contains("ir camera")
        || lower.contains("ir sensor")
        || lower.ends_with(" i")
        || lower.ends_with(": i")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ir_names() {
        assert!(is_ir_camera("Integrated Camera: Integrated I"));
        assert!(is_ir_camera("USB Infrared Sensor"));
        assert!(!is_ir_camera("HD Webcam"));
    }

    #[test]
    fn front_facing_skips_ir() {
        let mut backend = OpenCvBackend::new(2);
        backend.devices = vec![
            VideoDevice { device_id: 0, name: "HD Webcam".into(), is_ir: false },
            VideoDevice { device_id: 2, name: "IR Camera".into(), is_ir: true },
            VideoDevice { device_id: 4, name: "USB Camera".into(), is_ir: false },
        ];

        let user: Vec<i32> = backend.candidates(Facing::User).iter().map(|d| d.device_id).collect();
        assert_eq!(user, vec![0, 4]);

        let any: Vec<i32> = backend.candidates(Facing::Any).iter().map(|d| d.device_id).collect();
        assert_eq!(any, vec![2, 0, 4]);
    }
}
