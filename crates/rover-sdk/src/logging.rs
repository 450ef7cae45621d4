//! 日志初始化

use tracing_subscriber::EnvFilter;

/// `RUST_LOG` 未设置时使用的过滤指令
pub const DEFAULT_LOG_DIRECTIVE: &str = "rover=info";

/// 安装全局 `tracing` 订阅者
///
/// `RUST_LOG` 优先；否则使用 `level`（如 `debug`，作用于所有 `rover*` target），
/// 再否则使用 [`DEFAULT_LOG_DIRECTIVE`]。重复调用是安全的，后续调用不生效。
pub fn init_logging(level: Option<&str>) {
    let fallback = level
        .map(|level| format!("rover={level}"))
        .unwrap_or_else(|| DEFAULT_LOG_DIRECTIVE.to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}
