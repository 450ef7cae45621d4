//! # Rover Control
//!
//! 车载控制核心：控制循环、指令路由、传感器融合与拍照守卫。
//!
//! ## 线程模型
//!
//! - 控制循环（调用方线程）：独占 [`ControlState`](rover_protocol::ControlState) 与执行器
//! - 传输线程：通过 [`CommandInbox`] 投递指令，从不直接驱动执行器
//! - 拍照线程：由 [`CaptureService`] 管理，同一时刻最多一个拍照任务
//!
//! ## 示例
//!
//! ```no_run
//! use rover_control::{CaptureConfig, CaptureService, ControlConfig, ControlLoop, command_inbox};
//! use rover_hal::{SimulatedActuators, SimulatedCamera, SimulatedSensors};
//! use rover_store::TelemetryBuffer;
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ControlConfig::default();
//! let (inbox, receiver) = command_inbox(config.inbox_capacity);
//! let capture = CaptureService::start(CaptureConfig::default(), Box::new(SimulatedCamera::new()), None)?;
//! let buffer = Arc::new(TelemetryBuffer::open("data/telemetry.db")?);
//!
//! let mut control = ControlLoop::new(
//!     config,
//!     SimulatedSensors::new(),
//!     SimulatedActuators::new(),
//!     capture,
//!     receiver,
//!     buffer,
//! );
//! # drop(inbox);
//! let shutdown = AtomicBool::new(false);
//! control.run(&shutdown);
//! # Ok(())
//! # }
//! ```

pub mod capture;
mod control_loop;
mod error;
pub mod fusion;
mod inbox;
mod publish;
mod router;

pub use capture::{CaptureConfig, CaptureGuard, CaptureService, ImageNotifier};
pub use control_loop::{ControlConfig, ControlLoop, LoopStats, ObstacleConfig};
pub use error::ControlError;
pub use fusion::{FusionConfig, FusionDecision};
pub use inbox::{CommandInbox, DEFAULT_INBOX_CAPACITY, InboxReceiver, InboxStats, command_inbox};
pub use publish::TelemetryPublisher;
pub use router::{CommandRouter, ManualDuties};
