//! CLI 配置文件
//!
//! 默认位置 `~/.config/escl/config.toml`，可用 `--config` 或环境变量 `ESCL_CONFIG` 覆盖。
//!
//! ```toml
//! [connection]
//! drive_ip = "192.168.1.10"
//! command_gap_ms = 50
//!
//! [motor]
//! run_current = 3.0
//! max_rpm = 600.0
//!
//! [profile]
//! unsupported = ["VM"]
//! ```

use anyhow::{Context, Result};
use escl_sdk::driver::{RetryPolicy, SessionOptions};
use escl_sdk::{FirmwareProfile, MotorConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 环境变量：配置文件路径
pub const CONFIG_ENV: &str = "ESCL_CONFIG";

/// 连接参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// 驱动器 IP（未设置时必须在命令行给出 `--ip`）
    pub drive_ip: Option<IpAddr>,
    pub drive_port: u16,
    pub local_port: u16,
    pub timeout_ms: u64,
    /// 指令间隔（驱动器处理较慢，CLI 默认 50 ms）
    pub command_gap_ms: u64,
    pub retries: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            drive_ip: None,
            drive_port: escl_sdk::protocol::frame::DRIVE_PORT,
            local_port: escl_sdk::protocol::frame::LOCAL_PORT,
            timeout_ms: 3000,
            command_gap_ms: 50,
            retries: 2,
        }
    }
}

impl ConnectionConfig {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            timeout: Duration::from_millis(self.timeout_ms),
            command_gap: Duration::from_millis(self.command_gap_ms),
            retry: RetryPolicy {
                max_retries: self.retries,
                delay: Duration::ZERO,
            },
        }
    }
}

/// 完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub connection: ConnectionConfig,
    pub motor: MotorConfig,
    pub profile: FirmwareProfile,
}

impl CliConfig {
    /// 配置文件路径（命令行 > 环境变量 > 默认位置）
    pub fn path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        let mut path = dirs::config_dir().context("Cannot determine the configuration directory")?;
        path.push("escl");
        path.push("config.toml");
        Ok(path)
    }

    /// 读取配置（文件不存在时返回默认值）
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        config.motor.validate().context("Invalid [motor] section")?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        fs::write(path, format!("# eSCL CLI configuration\n\n{}", content))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escl_sdk::protocol::Mnemonic;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::load(&dir.path().join("none.toml")).unwrap();
        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = CliConfig::default();
        config.connection.drive_ip = Some("192.168.1.10".parse().unwrap());
        config.motor.max_rpm = 300.0;
        config.save(&path).unwrap();

        let loaded = CliConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[connection]\ndrive_ip = \"10.10.10.10\"\n\n[profile]\nunsupported = []\n",
        )
        .unwrap();
        let config = CliConfig::load(&path).unwrap();
        assert_eq!(config.connection.drive_port, 7775);
        assert_eq!(config.connection.command_gap_ms, 50);
        assert!(!config.profile.is_unsupported(Mnemonic::MaxVelocity));
    }

    #[test]
    fn test_invalid_motor_section_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[motor]\nrun_current = 1.0\nidle_current = 2.0\n").unwrap();
        assert!(CliConfig::load(&path).is_err());
    }
}
