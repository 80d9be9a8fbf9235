//! 可观测性：tracing 日志初始化
//!
//! 默认 info，可通过 RUST_LOG 覆盖；日志写到 stderr，stdout 只留给分诊结果。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化全局日志；重复调用（如测试中）时静默忽略
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
