//! # Rover SDK
//!
//! 车载控制器的入口层：配置文件、日志初始化与组件组装。
//!
//! ```no_run
//! use rover_hal::{SimulatedActuators, SimulatedCamera, SimulatedSensors};
//! use rover_sdk::{Rover, RoverConfig, init_logging};
//! use std::sync::atomic::AtomicBool;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! init_logging(None);
//! let config = RoverConfig::load("rover.toml")?;
//! let rover = Rover::build(
//!     &config,
//!     SimulatedSensors::new(),
//!     SimulatedActuators::new(),
//!     Box::new(SimulatedCamera::new()),
//! )?;
//! let shutdown = AtomicBool::new(false);
//! rover.run(&shutdown);
//! # Ok(())
//! # }
//! ```

pub mod config;
mod error;
mod logging;
mod rover;

pub use config::RoverConfig;
pub use error::{ConfigError, RoverError};
pub use logging::{DEFAULT_LOG_DIRECTIVE, init_logging};
pub use rover::Rover;
