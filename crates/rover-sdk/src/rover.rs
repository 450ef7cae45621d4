//! 组装：本地缓冲 + 同步线程 + 拍照线程 + 传输客户端 + 控制循环

use crate::config::RoverConfig;
use crate::error::RoverError;
use rover_control::{CaptureService, ControlLoop, ImageNotifier, LoopStats, command_inbox};
use rover_hal::{ActuatorSink, Camera, SensorSource};
use rover_link::{LinkConnector, TransportClient};
use rover_store::{PostgresStore, SyncWorker, TelemetryBuffer};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::{info, warn};

/// 完整的车载控制器
pub struct Rover<S, A> {
    control: ControlLoop<S, A>,
    transport: Arc<TransportClient>,
    sync: Option<SyncWorker>,
    buffer: Arc<TelemetryBuffer>,
}

impl<S: SensorSource, A: ActuatorSink> Rover<S, A> {
    /// 使用 MQTT 传输组装并启动后台线程
    pub fn build(
        config: &RoverConfig,
        sensors: S,
        actuators: A,
        camera: Box<dyn Camera>,
    ) -> Result<Self, RoverError> {
        Self::assemble(config, sensors, actuators, camera, None)
    }

    /// 使用自定义传输后端组装
    pub fn with_connector(
        config: &RoverConfig,
        sensors: S,
        actuators: A,
        camera: Box<dyn Camera>,
        connector: Box<dyn LinkConnector>,
    ) -> Result<Self, RoverError> {
        Self::assemble(config, sensors, actuators, camera, Some(connector))
    }

    fn assemble(
        config: &RoverConfig,
        sensors: S,
        actuators: A,
        camera: Box<dyn Camera>,
        connector: Option<Box<dyn LinkConnector>>,
    ) -> Result<Self, RoverError> {
        config.validate()?;

        let buffer = Arc::new(TelemetryBuffer::open(&config.storage.path)?);
        info!(
            "Telemetry buffer at {} ({} unsynced)",
            config.storage.path.display(),
            buffer.count_unsynced()?
        );

        let sync = match &config.sync.remote_url {
            Some(url) => {
                let store = PostgresStore::new(url, config.sync.connect_timeout())?;
                let mut worker =
                    SyncWorker::new(buffer.clone(), Arc::new(store), config.sync.to_sync_config());
                worker.start()?;
                Some(worker)
            },
            None => {
                warn!("No remote store configured, telemetry stays in the local buffer");
                None
            },
        };

        let control_config = config.control.to_control_config();
        let (inbox, receiver) = command_inbox(control_config.inbox_capacity);
        let link_config = config.link.to_link_config();
        let transport = Arc::new(match connector {
            Some(connector) => TransportClient::with_connector(link_config, connector, Arc::new(inbox)),
            None => TransportClient::new(link_config, Arc::new(inbox)),
        });

        let notifier: Arc<dyn ImageNotifier> = transport.clone();
        let capture =
            CaptureService::start(config.capture.to_capture_config(), camera, Some(notifier))?;

        let control = ControlLoop::new(control_config, sensors, actuators, capture, receiver, buffer.clone())
            .with_publisher(transport.clone());

        transport.connect()?;

        Ok(Self {
            control,
            transport,
            sync,
            buffer,
        })
    }

    pub fn buffer(&self) -> &Arc<TelemetryBuffer> {
        &self.buffer
    }

    pub fn transport(&self) -> &Arc<TransportClient> {
        &self.transport
    }

    /// 在当前线程运行控制循环，`shutdown` 置位后执行关闭流程
    ///
    /// 关闭顺序：控制循环完成当前 tick 并停车 → 停止同步线程（限时等待）→ 断开传输。
    /// 进行中的拍照不会被强制取消。
    pub fn run(mut self, shutdown: &AtomicBool) -> LoopStats {
        self.control.run(shutdown);

        if let Some(mut sync) = self.sync.take() {
            sync.stop();
            let stats = sync.stats();
            info!(
                "Sync worker stopped ({} cycles, {} rows synced, {} failed)",
                stats.cycles, stats.synced_rows, stats.failed_cycles
            );
        }
        self.transport.disconnect();

        match self.buffer.count_unsynced() {
            Ok(pending) => info!("Shutdown complete, {} samples awaiting sync", pending),
            Err(e) => warn!("Shutdown complete, buffer unreadable: {}", e),
        }
        self.control.stats()
    }
}
