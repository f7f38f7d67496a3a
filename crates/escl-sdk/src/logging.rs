//! 日志初始化
//!
//! 安装 `tracing-subscriber` 的 fmt 层（输出到 stderr），过滤规则取自 `RUST_LOG`，未设置时使用给定默认值。
//! 同时桥接 `log` crate 的记录（部分依赖仍使用 `log`）。

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// 默认过滤规则
pub const DEFAULT_FILTER: &str = "escl_cli=info,escl_client=info,escl_driver=warn";

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("A global subscriber is already installed: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("A log bridge is already installed: {0}")]
    LogBridge(#[from] tracing_log::log::SetLoggerError),
}

/// 使用 [`DEFAULT_FILTER`] 初始化
pub fn init() -> Result<(), LoggingError> {
    init_with_filter(DEFAULT_FILTER)
}

/// 使用给定的默认过滤规则初始化（`RUST_LOG` 优先）
pub fn init_with_filter(default: &str) -> Result<(), LoggingError> {
    let filter = filter_from_env(default)?;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

fn filter_from_env(default: &str) -> Result<EnvFilter, LoggingError> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => Ok(EnvFilter::try_new(directives)?),
        _ => Ok(EnvFilter::try_new(default)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn test_invalid_filter_rejected() {
        assert!(matches!(
            EnvFilter::try_new("escl_client=loud").map_err(LoggingError::from),
            Err(LoggingError::Filter(_))
        ));
    }
}
