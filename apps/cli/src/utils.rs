//! 工具函数
//!
//! 驱动器操作都是阻塞调用（每次交换最长等待一个超时），在 tokio 运行时中
//! 通过 `spawn_blocking` 执行。

use anyhow::{Context, Result};

/// 在阻塞线程池中执行闭包
pub async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("Worker task panicked")?
}

/// 解析命令行中的转速（允许负值与 `rpm` 后缀）
pub fn parse_rpm(text: &str) -> Result<f64> {
    let trimmed = text.trim();
    let number = trimmed
        .strip_suffix("rpm")
        .or_else(|| trimmed.strip_suffix("RPM"))
        .unwrap_or(trimmed)
        .trim();
    let value: f64 = number
        .parse()
        .with_context(|| format!("Invalid speed {:?}, expected RPM such as -100", text))?;
    if !value.is_finite() {
        anyhow::bail!("Invalid speed {:?}", text);
    }
    Ok(value)
}
