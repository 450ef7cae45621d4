use crate::{Camera, HalError};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::info;

/// 最小合法 JPEG（SOI + EOI）
const PLACEHOLDER_JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xD9];

/// 写入占位图片的相机
#[derive(Debug, Clone, Default)]
pub struct SimulatedCamera {
    /// 模拟曝光 / 编码耗时
    exposure: Duration,
}

impl SimulatedCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exposure(exposure: Duration) -> Self {
        Self { exposure }
    }
}

impl Camera for SimulatedCamera {
    fn capture_image(&mut self, path: &Path) -> Result<(), HalError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        if !self.exposure.is_zero() {
            thread::sleep(self.exposure);
        }
        fs::write(path, PLACEHOLDER_JPEG)?;
        info!("[SIM] image captured: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_camera_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("manual_20260101_000000.jpg");

        let mut camera = SimulatedCamera::new();
        camera.capture_image(&path).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes, PLACEHOLDER_JPEG);
    }
}
