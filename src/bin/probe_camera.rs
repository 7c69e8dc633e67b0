use std::env;
use std::fs;

use raza_salon::camera::SelfieCamera;
use raza_salon::config::SalonConfig;
use raza_salon::opencv_camera::{detect_devices, OpenCvBackend};

fn main() -> anyhow::Result<()> {
    raza_salon::init_logging();
    let config = SalonConfig::discover();

    let devices = detect_devices();
    if devices.is_empty() {
        println!("✗ No video devices found");
    }
    for device in &devices {
        let kind = if device.is_ir { "IR" } else { "RGB" };
        println!("✓ /dev/video{}: {} ({})", device.device_id, device.name, kind);
    }

    let backend = OpenCvBackend::new(config.camera.device_index);
    let mut camera = SelfieCamera::new(Box::new(backend), config.camera.clone());

    let constraints = camera.acquire()?;
    println!("Opened with {:?}", constraints);

    let still = camera.capture_frame()?;
    println!(
        "Captured {}x{} JPEG, {} bytes at quality {}",
        still.width,
        still.height,
        still.jpeg.len(),
        still.quality
    );

    if let Some(path) = env::args().nth(1) {
        fs::write(&path, &still.jpeg)?;
        println!("Saved to {}", path);
    }

    camera.release();
    Ok(())
}
