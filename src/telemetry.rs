// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 日志初始化
///
/// `RUST_LOG` 优先, 否则使用 `default_filter`; 输出线程名以区分 ingest / archive / detect
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing(default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = fmt()
        .with_env_filter(env_filter)
        .with_thread_names(true)
        .with_target(false)
        .try_init();
}
