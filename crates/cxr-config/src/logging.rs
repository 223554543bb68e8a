//! 日志初始化
//!
//! 只由可执行程序调用一次；库代码只使用 `tracing` 宏，从不安装订阅者。

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// 解析日志过滤指令：设置了 `RUST_LOG` 时以其为准，否则使用给定级别
pub fn build_filter(level: &str) -> Result<EnvFilter> {
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        return EnvFilter::try_from_default_env().context("Invalid RUST_LOG directive");
    }
    EnvFilter::try_new(level).with_context(|| format!("Invalid log level: {}", level))
}

/// 初始化全局日志订阅者
///
/// `level_override` 一般来自命令行参数，优先于配置文件。
pub fn init_logging(config: &LoggingConfig, level_override: Option<&str>) -> Result<()> {
    let level = level_override.unwrap_or(&config.level);
    let filter = build_filter(level)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    tracing::debug!("Logging initialised at level {}", level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_accepts_directives() {
        if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
            return;
        }
        assert!(build_filter("debug").is_ok());
        assert!(build_filter("cxr_client=trace,info").is_ok());
        assert!(build_filter("cxr_client=notalevel").is_err());
    }
}
