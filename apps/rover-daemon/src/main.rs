//! Rover 车载控制守护进程
//!
//! 加载配置 → 初始化日志 → 组装控制器（模拟硬件后端）→ 运行到 Ctrl+C / SIGTERM。

use anyhow::{Context, Result};
use clap::Parser;
use rover_hal::{SimulatedActuators, SimulatedCamera, SimulatedSensors};
use rover_sdk::{Rover, RoverConfig, init_logging};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Rover 车载控制守护进程
#[derive(Parser, Debug)]
#[command(name = "rover-daemon")]
#[command(about = "Rover onboard controller - line following, remote commands, telemetry sync", long_about = None)]
struct Args {
    /// TOML 配置文件
    ///
    /// 不指定时使用内置默认值（仍读取 ROVER_* 环境变量）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 日志级别（RUST_LOG 优先）
    ///
    /// 例如: info, debug, trace
    #[arg(long)]
    log_level: Option<String>,

    /// 模拟传感器的随机种子（便于复现）
    #[arg(long)]
    seed: Option<u64>,
}

fn load_config(path: Option<&PathBuf>) -> Result<RoverConfig> {
    match path {
        Some(path) => RoverConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => {
            let mut config = RoverConfig::default();
            config.apply_overrides(|key| std::env::var(key).ok());
            config.validate().context("Invalid default config")?;
            Ok(config)
        },
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    let config = load_config(args.config.as_ref())?;
    if config.link.username.is_none() || config.link.key.is_none() {
        warn!("MQTT credentials not set, the broker will likely reject the connection");
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("Received termination signal, shutting down...");
        flag.store(true, Ordering::Release);
    })
    .context("Failed to set signal handler")?;

    let sensors = match args.seed {
        Some(seed) => SimulatedSensors::with_seed(seed),
        None => SimulatedSensors::new(),
    };
    let rover = Rover::build(
        &config,
        sensors,
        SimulatedActuators::new(),
        Box::new(SimulatedCamera::new()),
    )
    .context("Failed to start rover")?;

    info!("Rover running (simulated hardware). Press Ctrl+C to stop.");
    let stats = rover.run(&shutdown);
    info!(
        "Rover stopped: {} ticks, {} obstacles, {} telemetry samples",
        stats.ticks, stats.obstacles, stats.telemetry_samples
    );
    Ok(())
}
