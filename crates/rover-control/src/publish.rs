//! 出站发布接口及其 [`TransportClient`] 实现

use crate::capture::ImageNotifier;
use crate::error::ControlError;
use rover_link::TransportClient;
use rover_protocol::{ImageNotice, TelemetryPayload};
use tracing::warn;

/// 遥测发布
pub trait TelemetryPublisher: Send + Sync {
    fn send_telemetry(&self, payload: &TelemetryPayload) -> Result<(), ControlError>;
}

impl TelemetryPublisher for TransportClient {
    fn send_telemetry(&self, payload: &TelemetryPayload) -> Result<(), ControlError> {
        self.publish_telemetry(payload)?;
        Ok(())
    }
}

impl ImageNotifier for TransportClient {
    fn notify(&self, notice: &ImageNotice) {
        if let Err(e) = self.publish_image(notice) {
            warn!("Image notice not published ({}): {}", notice.path, e);
        }
    }
}
